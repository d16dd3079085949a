//! Client for the Arcade action API.
//!
//! Used to authorize and execute hosted tools on behalf of a user, most
//! notably writing Gmail drafts for the generated outreach emails.

pub mod types;

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::instrument;

use crate::agdev::{Error, Result, Transport, TransportExt, WaitOptions, encode_query};

pub use types::*;

/// Tool that saves an email draft in Gmail.
pub const GMAIL_WRITE_DRAFT: &str = "Gmail.WriteDraftEmail";

#[derive(Debug, Clone)]
pub struct ArcadeClient {
    transport: Arc<dyn Transport>,
}

impl ArcadeClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Ask for `user_id`'s permission to run `tool_name`.
    #[instrument(skip(self))]
    pub async fn authorize_tool(&self, tool_name: &str, user_id: &str) -> Result<AuthorizationResponse> {
        let req = AuthorizeToolRequest {
            tool_name: tool_name.to_string(),
            user_id: user_id.to_string(),
        };
        let value = self
            .transport
            .post("/v1/tools/authorize", serde_json::to_value(req)?)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn authorization_status(&self, authorization_id: &str) -> Result<AuthorizationResponse> {
        let value = self
            .transport
            .get(&format!(
                "/v1/auth/status{}",
                encode_query([("id", authorization_id)])
            ))
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Poll an authorization until it completes or fails.
    ///
    /// Same deadline rules as [`crate::agdev::AgentsApi::wait_for_run`].
    #[instrument(skip(self, options))]
    pub async fn wait_for_authorization(
        &self,
        authorization_id: &str,
        options: WaitOptions,
    ) -> Result<AuthorizationResponse> {
        options
            .poll_until(
                move |_| self.authorization_status(authorization_id),
                |response: &AuthorizationResponse| response.status.is_settled(),
            )
            .await?
            .ok_or_else(|| Error::AuthorizationTimeout {
                authorization_id: authorization_id.to_string(),
                timeout_ms: options.timeout_ms(),
            })
    }

    /// Run a tool and return its output value.
    #[instrument(skip(self, input))]
    pub async fn execute_tool(&self, tool_name: &str, input: Value, user_id: &str) -> Result<Value> {
        let req = ExecuteToolRequest {
            tool_name: tool_name.to_string(),
            input,
            user_id: user_id.to_string(),
        };
        let value = self
            .transport
            .post("/v1/tools/execute", serde_json::to_value(req)?)
            .await?;
        let response: ExecuteToolResponse = serde_json::from_value(value)?;
        let output = response.output.unwrap_or_default();

        if let Some(err) = output.error {
            return Err(Error::Tool {
                tool: tool_name.to_string(),
                message: err.message,
            });
        }
        if response.success == Some(false) {
            return Err(Error::Tool {
                tool: tool_name.to_string(),
                message: "execution reported failure".to_string(),
            });
        }
        Ok(output.value.unwrap_or(Value::Null))
    }

    /// Authorize (waiting for the user if needed), then run `tool_name`.
    pub async fn authorize_and_execute(
        &self,
        tool_name: &str,
        input: Value,
        user_id: &str,
        options: WaitOptions,
    ) -> Result<Value> {
        let mut auth = self.authorize_tool(tool_name, user_id).await?;

        if auth.status != AuthorizationStatus::Completed {
            if let Some(url) = &auth.url {
                tracing::info!(
                    name: "arcade.authorization.required",
                    tool = tool_name,
                    %url,
                    "Authorization required, open the URL to grant access"
                );
            }
            let id = auth.id.clone().ok_or_else(|| Error::Authorization {
                tool: tool_name.to_string(),
                status: auth.status.to_string(),
            })?;
            auth = self.wait_for_authorization(&id, options).await?;
        }

        if auth.status != AuthorizationStatus::Completed {
            return Err(Error::Authorization {
                tool: tool_name.to_string(),
                status: auth.status.to_string(),
            });
        }

        self.execute_tool(tool_name, input, user_id).await
    }

    /// Save `draft` in the user's Gmail drafts.
    pub async fn write_draft_email(
        &self,
        user_id: &str,
        draft: &EmailDraft,
        options: WaitOptions,
    ) -> Result<Value> {
        let input = json!({
            "recipient": draft.recipient,
            "subject": draft.subject,
            "body": draft.body,
        });
        let output = self
            .authorize_and_execute(GMAIL_WRITE_DRAFT, input, user_id, options)
            .await?;
        tracing::info!(name: "arcade.draft.created", recipient = %draft.recipient, "Email draft created");
        Ok(output)
    }
}
