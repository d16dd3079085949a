//! Wire types for the agent API.
//!
//! Run inputs and results are free-form JSON documents owned by the remote
//! agents. They are kept as [`serde_json::Value`] so nothing here pretends to
//! validate them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A free-form JSON object.
pub type Document = serde_json::Map<String, Value>;

// =============================================================================
// Runs
// =============================================================================

/// Lifecycle status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Done,
    Error,
    /// A status this client does not know. Treated as still in progress.
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    /// Whether no further transition can occur.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Done => "done",
            Self::Error => "error",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one execution of an agent.
///
/// `completed_at` is set exactly when the status is terminal, and
/// `result_data` only carries meaning once the status is [`RunStatus::Done`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    pub id: String,
    pub agent_id: String,
    pub status: RunStatus,
    #[serde(default)]
    pub input: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_data: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Run {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// The result payload, only when the run finished successfully.
    pub fn result(&self) -> Option<&Value> {
        match self.status {
            RunStatus::Done => self.result_data.as_ref(),
            _ => None,
        }
    }
}

/// Normalized record returned by [`crate::agdev::Agent::run`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub id: String,
    pub status: RunStatus,
    pub input: Value,
    pub result_data: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<Run> for RunResult {
    fn from(run: Run) -> Self {
        let result_data = match run.status {
            RunStatus::Done => run.result_data,
            _ => None,
        };
        Self {
            id: run.id,
            status: run.status,
            input: run.input,
            result_data,
            created_at: run.created_at,
            updated_at: run.updated_at,
            completed_at: run.completed_at,
        }
    }
}

/// One page of runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunList {
    pub items: Vec<Run>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub page_size: Option<u32>,
}

/// Paging parameters passed through to the list endpoint untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListRunsParams {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl ListRunsParams {
    pub(crate) fn query(self) -> String {
        let mut parts = Vec::new();
        if let Some(page) = self.page {
            parts.push(format!("page={page}"));
        }
        if let Some(size) = self.page_size {
            parts.push(format!("pageSize={size}"));
        }
        if parts.is_empty() {
            String::new()
        } else {
            format!("?{}", parts.join("&"))
        }
    }
}

/// Timestamped observability record emitted while a run executes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEvent {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum EventList {
    Bare(Vec<RunEvent>),
    Wrapped { items: Vec<RunEvent> },
}

impl From<EventList> for Vec<RunEvent> {
    fn from(list: EventList) -> Self {
        match list {
            EventList::Bare(items) | EventList::Wrapped { items } => items,
        }
    }
}

// =============================================================================
// Agents
// =============================================================================

/// A remote computation definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDefinition {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub stack_id: Option<String>,
    #[serde(default)]
    pub goal: Option<String>,
    #[serde(default)]
    pub input_schema: Value,
    #[serde(default)]
    pub tools: Vec<Value>,
    #[serde(default)]
    pub result_type: Option<String>,
    #[serde(default)]
    pub planning_instructions: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Body for creating an agent.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAgent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub stack_id: String,
    pub goal: String,
    pub input_schema: Value,
    pub tools: Vec<Value>,
    pub result_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub planning_instructions: Option<String>,
}

/// Partial update of an agent. Unset fields are left untouched remotely.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub planning_instructions: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum AgentList {
    Bare(Vec<AgentDefinition>),
    Wrapped { items: Vec<AgentDefinition> },
}

impl From<AgentList> for Vec<AgentDefinition> {
    fn from(list: AgentList) -> Self {
        match list {
            AgentList::Bare(items) | AgentList::Wrapped { items } => items,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run_json(status: &str) -> Value {
        json!({
            "id": "run_1",
            "agentId": "agent_1",
            "status": status,
            "input": { "company_name": "Acme" },
            "resultData": { "summary": "ok" },
            "createdAt": "2025-01-01T00:00:00Z",
            "updatedAt": "2025-01-01T00:00:05Z",
            "completedAt": "2025-01-01T00:00:05Z"
        })
    }

    #[test]
    fn test_run_decodes_camel_case() {
        let run: Run = serde_json::from_value(run_json("done")).unwrap();
        assert_eq!(run.agent_id, "agent_1");
        assert_eq!(run.status, RunStatus::Done);
        assert!(run.is_terminal());
        assert_eq!(run.result(), Some(&json!({ "summary": "ok" })));
    }

    #[test]
    fn test_result_hidden_unless_done() {
        let run: Run = serde_json::from_value(run_json("error")).unwrap();
        assert!(run.is_terminal());
        assert!(run.result().is_none());
        assert!(RunResult::from(run).result_data.is_none());
    }

    #[test]
    fn test_unknown_status_is_not_terminal() {
        let run: Run = serde_json::from_value(run_json("queued")).unwrap();
        assert_eq!(run.status, RunStatus::Unknown);
        assert!(!run.is_terminal());
    }

    #[test]
    fn test_list_params_query() {
        assert_eq!(ListRunsParams::default().query(), "");
        let params = ListRunsParams {
            page: Some(2),
            page_size: Some(50),
        };
        assert_eq!(params.query(), "?page=2&pageSize=50");
    }

    #[test]
    fn test_event_list_accepts_both_shapes() {
        let event = json!({ "timestamp": "2025-01-01T00:00:00Z", "type": "step", "data": {} });
        let bare: EventList = serde_json::from_value(json!([event.clone()])).unwrap();
        let wrapped: EventList = serde_json::from_value(json!({ "items": [event] })).unwrap();
        assert_eq!(Vec::<RunEvent>::from(bare).len(), 1);
        assert_eq!(Vec::<RunEvent>::from(wrapped)[0].kind, "step");
    }

    #[test]
    fn test_patch_omits_unset_fields() {
        let patch = AgentPatch {
            goal: Some("Find contacts".to_string()),
            ..Default::default()
        };
        assert_eq!(serde_json::to_value(patch).unwrap(), json!({ "goal": "Find contacts" }));
    }
}
