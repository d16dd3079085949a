//! Batch fan-out/fan-in over one agent.
//!
//! All runs are created first, then all are polled. Results always come back
//! in input order, regardless of which run finishes first.

use std::{future::Future, sync::Arc};

use futures::future::{join_all, try_join_all};
use serde::Serialize;
use tokio::sync::Semaphore;

use super::{
    agents::{Agent, WaitOptions},
    error::{Error, Result},
    types::Run,
};

/// Options for [`Agent::run_batch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOptions {
    /// Polling behavior for every member.
    pub wait: WaitOptions,
    /// Maximum creations/polls in flight at once. `None` is unbounded.
    pub concurrency: Option<usize>,
}

impl BatchOptions {
    #[must_use]
    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.concurrency = (limit > 0).then_some(limit);
        self
    }
}

/// One input paired with its finished run.
#[derive(Debug, Clone)]
pub struct BatchItem<T> {
    pub input: T,
    pub run: Run,
}

/// One input paired with its own outcome, for [`Agent::run_batch_settled`].
#[derive(Debug)]
pub struct BatchOutcome<T> {
    pub input: T,
    pub result: Result<Run>,
}

/// Optional in-flight limit shared by both phases of a batch.
#[derive(Debug, Clone)]
struct Limiter(Option<Arc<Semaphore>>);

impl Limiter {
    fn new(limit: Option<usize>) -> Self {
        Self(limit.map(|n| Arc::new(Semaphore::new(n))))
    }

    async fn run<F: Future>(&self, fut: F) -> F::Output {
        let _permit = match &self.0 {
            Some(sem) => sem.acquire().await.ok(),
            None => None,
        };
        fut.await
    }
}

impl Agent {
    /// Run every input and return the finished runs in input order.
    ///
    /// The batch is all-or-nothing: the first creation or wait that fails
    /// fails the whole call with [`Error::Batch`], and no partial results are
    /// returned. Use [`Self::run_batch_settled`] to keep successful members.
    #[tracing::instrument(skip_all, fields(agent_id = %self.id(), size = inputs.len()))]
    pub async fn run_batch<T: Serialize + Sync>(
        &self,
        inputs: Vec<T>,
        options: BatchOptions,
    ) -> Result<Vec<BatchItem<T>>> {
        let limiter = Limiter::new(options.concurrency);

        let run_ids = try_join_all(inputs.iter().enumerate().map(|(index, input)| {
            let limiter = &limiter;
            async move {
                limiter
                    .run(self.start_run(input))
                    .await
                    .map_err(|source| batch_error(index, source))
            }
        }))
        .await?;
        tracing::info!(name: "agdev.batch.created", runs = run_ids.len(), "Batch runs created");

        let runs = try_join_all(run_ids.iter().enumerate().map(|(index, run_id)| {
            let limiter = &limiter;
            async move {
                limiter
                    .run(self.wait_for_run(run_id, options.wait))
                    .await
                    .map_err(|source| batch_error(index, source))
            }
        }))
        .await?;
        tracing::info!(name: "agdev.batch.finished", runs = runs.len(), "Batch finished");

        Ok(inputs
            .into_iter()
            .zip(runs)
            .map(|(input, run)| BatchItem { input, run })
            .collect())
    }

    /// Like [`Self::run_batch`], but each member succeeds or fails on its own.
    #[tracing::instrument(skip_all, fields(agent_id = %self.id(), size = inputs.len()))]
    pub async fn run_batch_settled<T: Serialize + Sync>(
        &self,
        inputs: Vec<T>,
        options: BatchOptions,
    ) -> Vec<BatchOutcome<T>> {
        let limiter = Limiter::new(options.concurrency);

        let created = join_all(
            inputs
                .iter()
                .map(|input| limiter.run(self.start_run(input))),
        )
        .await;

        let results = join_all(created.into_iter().map(|created| {
            let limiter = &limiter;
            async move {
                let run_id = created?;
                limiter.run(self.wait_for_run(&run_id, options.wait)).await
            }
        }))
        .await;

        let failed = results.iter().filter(|r| r.is_err()).count();
        if failed > 0 {
            tracing::warn!(name: "agdev.batch.partial", failed, "Some batch members failed");
        }

        inputs
            .into_iter()
            .zip(results)
            .map(|(input, result)| BatchOutcome { input, result })
            .collect()
    }
}

fn batch_error(index: usize, source: Error) -> Error {
    tracing::warn!(name: "agdev.batch.failed", index, error = %source, "Batch member failed");
    Error::Batch {
        index,
        source: Box::new(source),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agdev::{
        agents::{
            AgentsApi,
            tests::{ScriptedTransport, run_value},
        },
        client::Transport,
        types::RunStatus,
    };
    use async_trait::async_trait;
    use reqwest::Method;
    use serde_json::{Value, json};
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    fn agent(transport: &Arc<ScriptedTransport>) -> Agent {
        AgentsApi::new(Arc::clone(transport) as Arc<dyn Transport>).agent("agent_1")
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_follow_input_order() {
        let transport = Arc::new(
            ScriptedTransport::default()
                .script("a", &["pending", "pending", "pending", "done"])
                .script("b", &["pending", "done"])
                .script("c", &["done"]),
        );
        let inputs = vec![json!({ "id": "a" }), json!({ "id": "b" }), json!({ "id": "c" })];

        let items = agent(&transport)
            .run_batch(inputs, BatchOptions::default())
            .await
            .unwrap();

        let ids: Vec<_> = items.iter().map(|i| i.run.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert_eq!(items[2].input, json!({ "id": "c" }));
        assert!(items.iter().all(|i| i.run.status == RunStatus::Done));
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_failed_create_fails_batch() {
        let transport = Arc::new(ScriptedTransport {
            fail_create_for: Some("b".to_string()),
            ..ScriptedTransport::default()
        }
        .script("a", &["done"])
        .script("c", &["done"]));
        let inputs = vec![json!({ "id": "a" }), json!({ "id": "b" }), json!({ "id": "c" })];

        let err = agent(&transport)
            .run_batch(inputs, BatchOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Batch { index: 1, .. }));
        // Nothing is polled once a creation fails.
        assert_eq!(transport.count(&Method::GET, "/runs/a"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_wait_fails_batch() {
        let transport = Arc::new(ScriptedTransport::default().script("a", &["done"]));
        let inputs = vec![json!({ "id": "a" }), json!({ "id": "gone" })];

        let err = agent(&transport)
            .run_batch(inputs, BatchOptions::default())
            .await
            .unwrap_err();

        match err {
            Error::Batch { index, source } => {
                assert_eq!(index, 1);
                assert!(source.is_not_found());
            }
            other => panic!("expected batch error, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_settled_keeps_successes() {
        let transport = Arc::new(ScriptedTransport {
            fail_create_for: Some("b".to_string()),
            ..ScriptedTransport::default()
        }
        .script("a", &["running", "done"])
        .script("c", &["error"]));
        let inputs = vec![json!({ "id": "a" }), json!({ "id": "b" }), json!({ "id": "c" })];

        let outcomes = agent(&transport)
            .run_batch_settled(inputs, BatchOptions::default())
            .await;

        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].result.as_ref().unwrap().status, RunStatus::Done);
        assert!(matches!(outcomes[1].result, Err(Error::Api { status: 500, .. })));
        assert_eq!(outcomes[2].result.as_ref().unwrap().status, RunStatus::Error);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let transport = Arc::new(ScriptedTransport::default());
        let items = agent(&transport)
            .run_batch(Vec::<Value>::new(), BatchOptions::default())
            .await
            .unwrap();
        assert!(items.is_empty());
    }

    /// Transport that tracks how many requests are in flight at once.
    #[derive(Debug, Default)]
    struct GaugeTransport {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl Transport for GaugeTransport {
        async fn request(
            &self,
            method: Method,
            endpoint: &str,
            body: Option<Value>,
        ) -> crate::agdev::Result<Value> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let id = if method == Method::POST {
                body.as_ref()
                    .and_then(|b| b.get("id"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            } else {
                endpoint.rsplit('/').next().unwrap_or_default().to_string()
            };
            let status = if method == Method::POST { "pending" } else { "done" };
            Ok(run_value(&id, status))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_limit_is_respected() {
        let transport = Arc::new(GaugeTransport::default());
        let agent = AgentsApi::new(Arc::clone(&transport) as Arc<dyn Transport>).agent("agent_1");
        let inputs: Vec<_> = (0..10).map(|i| json!({ "id": format!("r{i}") })).collect();

        let items = agent
            .run_batch(inputs, BatchOptions::default().with_concurrency(3))
            .await
            .unwrap();

        assert_eq!(items.len(), 10);
        assert_eq!(items[9].run.id, "r9");
        assert_eq!(transport.peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_by_default() {
        let transport = Arc::new(GaugeTransport::default());
        let agent = AgentsApi::new(Arc::clone(&transport) as Arc<dyn Transport>).agent("agent_1");
        let inputs: Vec<_> = (0..10).map(|i| json!({ "id": format!("r{i}") })).collect();

        agent.run_batch(inputs, BatchOptions::default()).await.unwrap();

        assert_eq!(transport.peak.load(Ordering::SeqCst), 10);
    }
}
