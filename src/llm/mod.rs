//! LLM client module.
//!
//! Holds the conversation data model shared by the agent loop and the
//! provider adapters, plus the [`ModelClient`] seam the loop calls through.
//! Providers are stateless between calls: every call receives the full
//! history and the full tool declaration set.

mod gemini;

pub use gemini::{GeminiClient, GeminiConfig, DEFAULT_GEMINI_BASE_URL};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tools::ToolDeclaration;

/// Errors from the model provider. All of them are fatal to a loop run.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Model provider request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Model provider returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Failed to decode model response: {0}")]
    Decode(String),

    #[error("Model provider returned no candidates")]
    EmptyResponse,

    #[error("Model provider is not configured: {0}")]
    NotConfigured(String),
}

/// Author of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Model,
    Tool,
}

/// A model-issued request to invoke a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider call id, or a generated UUID when the provider has none.
    pub id: String,

    /// Name of the requested tool.
    pub name: String,

    /// Raw JSON argument payload as produced by the provider.
    pub arguments: String,
}

/// Textual outcome of a tool invocation, as the model sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "text")]
pub enum ToolOutcome {
    Success(String),
    Failure(String),
}

impl ToolOutcome {
    pub fn text(&self) -> &str {
        match self {
            Self::Success(text) | Self::Failure(text) => text,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Result of a tool call, paired to the request by call id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub name: String,
    pub outcome: ToolOutcome,
}

/// One entry in the conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<ToolResult>,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Some(text.into()),
            tool_calls: Vec::new(),
            tool_result: None,
        }
    }

    pub fn model(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Model,
            content,
            tool_calls,
            tool_result: None,
        }
    }

    pub fn tool_result(result: ToolResult) -> Self {
        Self {
            role: Role::Tool,
            content: None,
            tool_calls: Vec::new(),
            tool_result: Some(result),
        }
    }
}

/// Ordered conversation history for one loop invocation.
pub type ConversationHistory = Vec<Turn>;

/// The model's next turn: free text and/or requested tool calls.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelTurn {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

impl ModelTurn {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_call(name: &str, arguments: serde_json::Value) -> Self {
        Self {
            text: None,
            tool_calls: vec![ToolCall {
                id: uuid::Uuid::new_v4().to_string(),
                name: name.to_string(),
                arguments: arguments.to_string(),
            }],
        }
    }
}

/// A single call to a language-model provider.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Generate the next turn given the whole history and tool set.
    async fn generate(
        &self,
        model: &str,
        history: &[Turn],
        tools: &[ToolDeclaration],
    ) -> Result<ModelTurn, LlmError>;
}
