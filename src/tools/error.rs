//! Tool dispatch error taxonomy.

use thiserror::Error;

use crate::auth::AuthError;
use crate::calendar::CalendarError;

/// Errors produced while dispatching a tool call.
///
/// Everything except [`ToolError::Auth`] is reported back to the model as a
/// failed tool result so it can correct itself.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Malformed arguments for {tool}: {reason}")]
    MalformedArguments { tool: String, reason: String },

    #[error("{tool} failed: {message}")]
    Execution { tool: String, message: String },

    #[error("{tool} timed out after {secs}s")]
    Timeout { tool: String, secs: u64 },

    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),
}

impl ToolError {
    pub fn malformed(tool: &str, reason: impl Into<String>) -> Self {
        Self::MalformedArguments {
            tool: tool.to_string(),
            reason: reason.into(),
        }
    }

    pub fn execution(tool: &str, message: impl Into<String>) -> Self {
        Self::Execution {
            tool: tool.to_string(),
            message: message.into(),
        }
    }

    /// Map a calendar collaborator failure. Rejected credentials cannot be
    /// fixed by the model and become [`ToolError::Auth`].
    pub fn from_calendar(tool: &str, err: CalendarError) -> Self {
        match err {
            CalendarError::Unauthorized(message) => Self::Auth(AuthError::Rejected(message)),
            other => Self::execution(tool, other.to_string()),
        }
    }

    /// Split into the text fed back to the model, or the credential
    /// failure that ends the run.
    pub fn into_feedback(self) -> Result<String, AuthError> {
        match self {
            Self::Auth(e) => Err(e),
            other => Ok(other.to_string()),
        }
    }
}
