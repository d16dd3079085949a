//! Agent and run operations against the ag.dev API.
//!
//! [`AgentsApi`] is the raw endpoint surface. [`Agent`] binds it to a single
//! agent id and adds the create-then-wait conveniences the pipeline uses.

use std::{future::Future, sync::Arc, time::Duration};

use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use super::{
    client::{Transport, TransportExt, encode_segment},
    error::{Error, Result},
    types::{
        AgentDefinition, AgentList, AgentPatch, EventList, ListRunsParams, NewAgent, Run,
        RunEvent, RunList, RunResult,
    },
};

const API_PREFIX: &str = "/v0.1/agents";

fn agent_path(agent_id: &str) -> String {
    format!("{API_PREFIX}/{}", encode_segment(agent_id))
}

fn run_path(agent_id: &str, run_id: &str) -> String {
    format!("{}/runs/{}", agent_path(agent_id), encode_segment(run_id))
}

/// Polling behavior for [`AgentsApi::wait_for_run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    /// Fixed delay between status polls.
    pub poll_interval: Duration,
    /// Give up after this long. [`Duration::ZERO`] waits forever.
    ///
    /// The deadline is checked before each poll, so the wait can overrun the
    /// timeout by up to one `poll_interval`.
    pub timeout: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1000),
            timeout: Duration::ZERO,
        }
    }
}

impl WaitOptions {
    /// Build options from millisecond values, `timeout_ms = 0` meaning no timeout.
    pub fn from_millis(poll_interval_ms: u64, timeout_ms: u64) -> Self {
        Self {
            poll_interval: Duration::from_millis(poll_interval_ms),
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    fn deadline(&self) -> Option<Duration> {
        (!self.timeout.is_zero()).then_some(self.timeout)
    }

    pub(crate) fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }

    /// Call `poll` until `is_settled` accepts its value or the timeout passes.
    ///
    /// `poll` receives the 1-based attempt number. Returns `Ok(None)` on
    /// timeout; a failed poll ends the wait with its error.
    pub(crate) async fn poll_until<T, F, Fut>(
        self,
        mut poll: F,
        is_settled: impl Fn(&T) -> bool,
    ) -> Result<Option<T>>
    where
        F: FnMut(u64) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let mut attempt = 0_u64;
        loop {
            if self.deadline().is_some_and(|timeout| started.elapsed() > timeout) {
                return Ok(None);
            }

            attempt += 1;
            let value = poll(attempt).await?;
            if is_settled(&value) {
                return Ok(Some(value));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

/// Endpoint surface for agents and their runs.
#[derive(Debug, Clone)]
pub struct AgentsApi {
    transport: Arc<dyn Transport>,
}

impl AgentsApi {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Bind this API to one agent id.
    pub fn agent(&self, agent_id: impl Into<String>) -> Agent {
        Agent {
            id: agent_id.into(),
            api: self.clone(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Agent definitions
    // ─────────────────────────────────────────────────────────────────────────

    #[instrument(skip(self, agent), fields(stack_id = %agent.stack_id))]
    pub async fn create_agent(&self, agent: &NewAgent) -> Result<AgentDefinition> {
        let value = self
            .transport
            .post(API_PREFIX, serde_json::to_value(agent)?)
            .await?;
        let created: AgentDefinition = serde_json::from_value(value)?;
        tracing::info!(name: "agdev.agent.created", agent_id = %created.id, "Agent created");
        Ok(created)
    }

    pub async fn get_agent(&self, agent_id: &str) -> Result<AgentDefinition> {
        let value = self.transport.get(&agent_path(agent_id)).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn list_agents(&self) -> Result<Vec<AgentDefinition>> {
        let value = self.transport.get(API_PREFIX).await?;
        Ok(serde_json::from_value::<AgentList>(value)?.into())
    }

    #[instrument(skip(self, patch))]
    pub async fn update_agent(&self, agent_id: &str, patch: &AgentPatch) -> Result<AgentDefinition> {
        let value = self
            .transport
            .patch(&agent_path(agent_id), serde_json::to_value(patch)?)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    #[instrument(skip(self))]
    pub async fn delete_agent(&self, agent_id: &str) -> Result<()> {
        self.transport
            .delete(&agent_path(agent_id))
            .await?;
        tracing::info!(name: "agdev.agent.deleted", "Agent deleted");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Runs
    // ─────────────────────────────────────────────────────────────────────────

    /// Start a run. The input is sent as-is; the remote owns schema checks.
    #[instrument(skip(self, input), fields(run_id = tracing::field::Empty))]
    pub async fn create_run<I: Serialize + ?Sized + Sync>(
        &self,
        agent_id: &str,
        input: &I,
    ) -> Result<Run> {
        let value = self
            .transport
            .post(
                &format!("{}/runs", agent_path(agent_id)),
                serde_json::to_value(input)?,
            )
            .await?;
        let run: Run = serde_json::from_value(value)?;
        tracing::Span::current().record("run_id", run.id.as_str());
        tracing::info!(name: "agdev.run.created", status = %run.status, "Run created");
        Ok(run)
    }

    pub async fn get_run(&self, agent_id: &str, run_id: &str) -> Result<Run> {
        let value = self
            .transport
            .get(&run_path(agent_id, run_id))
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn list_runs(&self, agent_id: &str, params: ListRunsParams) -> Result<RunList> {
        let value = self
            .transport
            .get(&format!("{}/runs/{}", agent_path(agent_id), params.query()))
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn get_run_events(&self, agent_id: &str, run_id: &str) -> Result<Vec<RunEvent>> {
        let value = self
            .transport
            .get(&format!("{}/events", run_path(agent_id, run_id)))
            .await?;
        Ok(serde_json::from_value::<EventList>(value)?.into())
    }

    /// Poll a run until it is done or errored.
    ///
    /// Failed polls are returned immediately, never retried.
    #[instrument(skip(self, options))]
    pub async fn wait_for_run(
        &self,
        agent_id: &str,
        run_id: &str,
        options: WaitOptions,
    ) -> Result<Run> {
        let run = options
            .poll_until(
                move |polls| async move {
                    let run = self.get_run(agent_id, run_id).await?;
                    tracing::debug!(name: "agdev.run.polled", status = %run.status, polls, "Run polled");
                    Ok(run)
                },
                Run::is_terminal,
            )
            .await?;

        match run {
            Some(run) => {
                tracing::info!(name: "agdev.run.finished", status = %run.status, "Run finished");
                Ok(run)
            }
            None => {
                tracing::warn!(name: "agdev.run.timeout", "Gave up waiting for run");
                Err(Error::Timeout {
                    run_id: run_id.to_string(),
                    timeout_ms: options.timeout_ms(),
                })
            }
        }
    }

    /// [`Self::wait_for_run`] that also stops when `cancel` fires.
    ///
    /// Cancelling only stops the local wait; the remote run keeps executing.
    pub async fn wait_for_run_cancellable(
        &self,
        agent_id: &str,
        run_id: &str,
        options: WaitOptions,
        cancel: &CancellationToken,
    ) -> Result<Run> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::info!(name: "agdev.run.wait_cancelled", run_id, "Stopped waiting for run");
                Err(Error::Cancelled { run_id: run_id.to_string() })
            }
            result = self.wait_for_run(agent_id, run_id, options) => result,
        }
    }
}

/// Handle to one remote agent.
///
/// Cloning is cheap; clones share the underlying transport.
#[derive(Debug, Clone)]
pub struct Agent {
    id: String,
    api: AgentsApi,
}

impl Agent {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn api(&self) -> &AgentsApi {
        &self.api
    }

    /// Create a run and wait for it to finish.
    pub async fn run<I: Serialize + ?Sized + Sync>(
        &self,
        input: &I,
        options: WaitOptions,
    ) -> Result<RunResult> {
        let created = self.api.create_run(&self.id, input).await?;
        let run = self.api.wait_for_run(&self.id, &created.id, options).await?;
        Ok(run.into())
    }

    /// Create a run without waiting. Returns the run id.
    pub async fn start_run<I: Serialize + ?Sized + Sync>(&self, input: &I) -> Result<String> {
        Ok(self.api.create_run(&self.id, input).await?.id)
    }

    pub async fn get_run(&self, run_id: &str) -> Result<Run> {
        self.api.get_run(&self.id, run_id).await
    }

    pub async fn list_runs(&self, params: ListRunsParams) -> Result<RunList> {
        self.api.list_runs(&self.id, params).await
    }

    pub async fn events(&self, run_id: &str) -> Result<Vec<RunEvent>> {
        self.api.get_run_events(&self.id, run_id).await
    }

    pub async fn wait_for_run(&self, run_id: &str, options: WaitOptions) -> Result<Run> {
        self.api.wait_for_run(&self.id, run_id, options).await
    }

    pub async fn definition(&self) -> Result<AgentDefinition> {
        self.api.get_agent(&self.id).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::agdev::types::RunStatus;
    use async_trait::async_trait;
    use reqwest::Method;
    use serde_json::{Value, json};
    use std::{
        collections::{HashMap, VecDeque},
        sync::Mutex,
    };

    pub(crate) fn run_value(id: &str, status: &str) -> Value {
        let mut run = json!({
            "id": id,
            "agentId": "agent_1",
            "status": status,
            "input": {},
            "createdAt": "2025-01-01T00:00:00Z",
            "updatedAt": "2025-01-01T00:00:00Z"
        });
        if status == "done" || status == "error" {
            run["completedAt"] = json!("2025-01-01T00:00:10Z");
        }
        if status == "done" {
            run["resultData"] = json!({ "run": id });
        }
        run
    }

    /// Transport that replays scripted `get_run` statuses and counts calls.
    #[derive(Debug, Default)]
    pub(crate) struct ScriptedTransport {
        pub(crate) statuses: Mutex<HashMap<String, VecDeque<&'static str>>>,
        pub(crate) calls: Mutex<Vec<(Method, String)>>,
        pub(crate) fail_create_for: Option<String>,
    }

    impl ScriptedTransport {
        pub(crate) fn script(self, run_id: &str, statuses: &[&'static str]) -> Self {
            self.statuses
                .lock()
                .unwrap()
                .insert(run_id.to_string(), statuses.iter().copied().collect());
            self
        }

        pub(crate) fn count(&self, method: &Method, suffix: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(m, e)| m == method && e.ends_with(suffix))
                .count()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn request(&self, method: Method, endpoint: &str, body: Option<Value>) -> Result<Value> {
            self.calls
                .lock()
                .unwrap()
                .push((method.clone(), endpoint.to_string()));

            if method == Method::POST && endpoint.ends_with("/runs") {
                // Inputs carry the run id the test wants back.
                let id = body
                    .as_ref()
                    .and_then(|b| b.get("id"))
                    .and_then(Value::as_str)
                    .unwrap_or("run_1")
                    .to_string();
                if self.fail_create_for.as_deref() == Some(id.as_str()) {
                    return Err(Error::Api {
                        status: 500,
                        code: "INTERNAL".to_string(),
                        message: "create failed".to_string(),
                    });
                }
                return Ok(run_value(&id, "pending"));
            }

            let run_id = endpoint.rsplit('/').next().unwrap_or_default().to_string();
            let mut statuses = self.statuses.lock().unwrap();
            let Some(queue) = statuses.get_mut(&run_id) else {
                return Err(Error::NotFound {
                    message: "no such run".to_string(),
                });
            };
            // The last scripted status repeats forever.
            let status = if queue.len() > 1 {
                queue.pop_front().unwrap_or("pending")
            } else {
                queue.front().copied().unwrap_or("pending")
            };
            Ok(run_value(&run_id, status))
        }
    }

    fn api(transport: &Arc<ScriptedTransport>) -> AgentsApi {
        AgentsApi::new(Arc::clone(transport) as Arc<dyn Transport>)
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_polls_until_done() {
        let transport = Arc::new(
            ScriptedTransport::default().script("r1", &["pending", "running", "running", "done"]),
        );
        let started = Instant::now();

        let run = api(&transport)
            .wait_for_run("agent_1", "r1", WaitOptions::default())
            .await
            .unwrap();

        assert_eq!(run.status, RunStatus::Done);
        assert_eq!(transport.count(&Method::GET, "/runs/r1"), 4);
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_returns_on_error_status() {
        let transport = Arc::new(ScriptedTransport::default().script("r1", &["running", "error"]));

        let run = api(&transport)
            .wait_for_run("agent_1", "r1", WaitOptions::default())
            .await
            .unwrap();

        assert_eq!(run.status, RunStatus::Error);
        assert!(run.completed_at.is_some());
        assert_eq!(transport.count(&Method::GET, "/runs/r1"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out_within_one_interval() {
        let transport = Arc::new(ScriptedTransport::default().script("r1", &["pending"]));
        let started = Instant::now();

        let err = api(&transport)
            .wait_for_run("agent_1", "r1", WaitOptions::from_millis(1000, 5000))
            .await
            .unwrap_err();

        match err {
            Error::Timeout { run_id, timeout_ms } => {
                assert_eq!(run_id, "r1");
                assert_eq!(timeout_ms, 5000);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert!(started.elapsed() <= Duration::from_millis(6000));
        assert!(started.elapsed() > Duration::from_millis(5000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_timeout_never_expires() {
        let mut statuses = vec!["pending"; 50];
        statuses.push("done");
        let transport = Arc::new(ScriptedTransport::default().script("r1", &statuses));

        let run = api(&transport)
            .wait_for_run("agent_1", "r1", WaitOptions::from_millis(1000, 0))
            .await
            .unwrap();

        assert!(run.is_terminal());
        assert_eq!(transport.count(&Method::GET, "/runs/r1"), 51);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_propagates_not_found() {
        let transport = Arc::new(ScriptedTransport::default());

        let err = api(&transport)
            .wait_for_run("agent_1", "missing", WaitOptions::default())
            .await
            .unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(transport.count(&Method::GET, "/runs/missing"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_local_wait() {
        let transport = Arc::new(ScriptedTransport::default().script("r1", &["running"]));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2500)).await;
            trigger.cancel();
        });

        let err = api(&transport)
            .wait_for_run_cancellable("agent_1", "r1", WaitOptions::default(), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled { ref run_id } if run_id == "r1"));
        assert_eq!(transport.count(&Method::GET, "/runs/r1"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_agent_run_normalizes_result() {
        let transport = Arc::new(ScriptedTransport::default().script("r7", &["running", "done"]));
        let agent = api(&transport).agent("agent_1");

        let result = agent
            .run(&json!({ "id": "r7" }), WaitOptions::default())
            .await
            .unwrap();

        assert_eq!(result.id, "r7");
        assert_eq!(result.result_data, Some(json!({ "run": "r7" })));
        assert_eq!(transport.count(&Method::POST, "/agents/agent_1/runs"), 1);
    }

    #[tokio::test]
    async fn test_ids_are_percent_encoded() {
        let transport = Arc::new(ScriptedTransport::default());

        let err = api(&transport).get_run("team/a b", "r?1").await.unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(
            transport.calls.lock().unwrap()[0].1,
            "/v0.1/agents/team%2Fa%20b/runs/r%3F1"
        );
    }

    #[tokio::test]
    async fn test_start_run_does_not_poll() {
        let transport = Arc::new(ScriptedTransport::default());
        let agent = api(&transport).agent("agent_1");

        let id = agent.start_run(&json!({ "id": "r9" })).await.unwrap();

        assert_eq!(id, "r9");
        assert_eq!(transport.calls.lock().unwrap().len(), 1);
    }
}
