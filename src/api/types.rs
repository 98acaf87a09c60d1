//! API request and response types.

use serde::{Deserialize, Serialize};

use crate::agent::AgentRun;
use crate::llm::ConversationHistory;

/// Request to run the agent on one prompt.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    /// The user prompt
    pub prompt: String,

    /// Optional model override (uses default if not specified)
    #[serde(default)]
    pub model: Option<String>,

    /// Prior turns of the conversation, oldest first
    #[serde(default)]
    pub history: ConversationHistory,
}

/// Result of a chat request, whatever the outcome.
#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    /// `final_answer`, `step_limit_exceeded`, `failure` or `cancelled`
    pub status: String,

    /// Final answer text, present only for `final_answer`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,

    /// Error description for every other status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Full history including this request's turns
    pub history: ConversationHistory,

    /// Number of model calls made
    pub model_calls: usize,
}

impl From<AgentRun> for ChatResponse {
    fn from(run: AgentRun) -> Self {
        let error = run.outcome.error_message();
        let status = run.outcome.status().to_string();
        let answer = match run.outcome {
            crate::agent::LoopOutcome::FinalAnswer(text) => Some(text),
            _ => None,
        };
        Self {
            status,
            answer,
            error,
            history: run.history,
            model_calls: run.model_calls,
        }
    }
}

/// Query string Google appends to the OAuth redirect.
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// Signed-in user, returned after the OAuth callback.
#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    pub user_id: String,
    pub email: String,
    pub name: String,
}

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,
}
