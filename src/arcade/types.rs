use serde::{Deserialize, Serialize};
use serde_json::Value;

/// State of a tool authorization request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationStatus {
    NotStarted,
    Pending,
    Completed,
    Failed,
    #[serde(other)]
    Unknown,
}

impl AuthorizationStatus {
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for AuthorizationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotStarted => "not_started",
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthorizeToolRequest {
    pub tool_name: String,
    pub user_id: String,
}

/// Response from the authorize and status endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizationResponse {
    #[serde(default)]
    pub id: Option<String>,
    pub status: AuthorizationStatus,
    /// Where the user has to go to grant access, while pending.
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecuteToolRequest {
    pub tool_name: String,
    pub input: Value,
    pub user_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolError {
    pub message: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolOutput {
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub error: Option<ToolError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecuteToolResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub output: Option<ToolOutput>,
}

/// An email to save as a draft in the user's mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailDraft {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}
