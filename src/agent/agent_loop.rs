//! Core agent loop implementation.
//!
//! The loop is an explicit state machine over [`LoopState`]. Every entry
//! into `AwaitingModel` consumes one unit of the step budget, so a run makes
//! at most `max_steps` model calls.

use std::sync::Arc;

use thiserror::Error;

use crate::auth::{AuthError, CredentialProvider};
use crate::calendar::GoogleCalendar;
use crate::config::Config;
use crate::llm::{
    ConversationHistory, GeminiClient, GeminiConfig, LlmError, ModelClient, ToolCall,
    ToolOutcome, ToolResult, Turn,
};
use crate::tools::{CalendarBackend, Dispatcher, ToolDeclaration, ToolError, ToolRegistry};

use super::context::RunContext;
use super::prompt::build_system_prompt;

/// Default step budget.
pub const DEFAULT_MAX_STEPS: usize = 10;

/// Terminal failure of a loop run.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Model provider error: {0}")]
    Provider(#[from] LlmError),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// How a loop run ended.
#[derive(Debug)]
pub enum LoopOutcome {
    FinalAnswer(String),
    StepLimitExceeded { limit: usize },
    Failure(AgentError),
    Cancelled,
}

impl LoopOutcome {
    /// Stable machine-readable label.
    pub fn status(&self) -> &'static str {
        match self {
            Self::FinalAnswer(_) => "final_answer",
            Self::StepLimitExceeded { .. } => "step_limit_exceeded",
            Self::Failure(_) => "failure",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_final_answer(&self) -> bool {
        matches!(self, Self::FinalAnswer(_))
    }

    /// Human-readable description of anything other than a final answer.
    pub fn error_message(&self) -> Option<String> {
        match self {
            Self::FinalAnswer(_) => None,
            Self::StepLimitExceeded { limit } => Some(format!(
                "Step limit of {} model calls reached without a final answer",
                limit
            )),
            Self::Failure(e) => Some(e.to_string()),
            Self::Cancelled => Some("Request was cancelled".to_string()),
        }
    }
}

/// Outcome plus the history and call count of a run.
#[derive(Debug)]
pub struct AgentRun {
    pub outcome: LoopOutcome,
    pub history: ConversationHistory,
    pub model_calls: usize,
}

enum LoopState {
    AwaitingModel,
    AwaitingToolResult(ToolCall),
    Done(LoopOutcome),
}

/// The calendar agent.
pub struct Agent {
    model: Arc<dyn ModelClient>,
    dispatcher: Dispatcher,
    max_steps: usize,
}

impl Agent {
    pub fn new(model: Arc<dyn ModelClient>, dispatcher: Dispatcher, max_steps: usize) -> Self {
        Self {
            model,
            dispatcher,
            max_steps,
        }
    }

    /// Wire the Gemini client and the Google Calendar tool set from config.
    pub fn from_config(
        config: &Config,
        credentials: Arc<dyn CredentialProvider>,
    ) -> anyhow::Result<Self> {
        let calendar = GoogleCalendar::new(config.calendar_base_url.clone(), config.tool_timeout())?;
        let registry = ToolRegistry::calendar(CalendarBackend::new(Arc::new(calendar), credentials))?;

        let llm = GeminiClient::new(GeminiConfig {
            api_key: config.require_gemini_key()?.to_string(),
            base_url: config.gemini_base_url.clone(),
            temperature: config.temperature,
            system_instruction: Some(build_system_prompt(&registry)),
            timeout: config.model_timeout(),
        })?;

        let dispatcher = Dispatcher::new(Arc::new(registry), config.tool_timeout());
        Ok(Self::new(Arc::new(llm), dispatcher, config.max_steps))
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    /// Run one request to completion and return how it ended.
    pub async fn run(
        &self,
        ctx: &RunContext,
        model: &str,
        seed: ConversationHistory,
        prompt: &str,
    ) -> LoopOutcome {
        self.run_session(ctx, model, seed, prompt).await.outcome
    }

    /// Like [`Agent::run`], but also hands back the grown history so the
    /// caller can persist it for the next turn of a session.
    pub async fn run_session(
        &self,
        ctx: &RunContext,
        model: &str,
        seed: ConversationHistory,
        prompt: &str,
    ) -> AgentRun {
        let mut history = seed;
        history.push(Turn::user(prompt));

        let tools = self.dispatcher.registry().declarations();
        let mut remaining = self.max_steps;
        let mut model_calls = 0;
        let mut state = LoopState::AwaitingModel;

        let outcome = loop {
            state = match state {
                LoopState::Done(outcome) => break outcome,
                LoopState::AwaitingModel if remaining == 0 => {
                    tracing::warn!(
                        "Step limit of {} reached without a final answer",
                        self.max_steps
                    );
                    LoopState::Done(LoopOutcome::StepLimitExceeded {
                        limit: self.max_steps,
                    })
                }
                LoopState::AwaitingModel => {
                    remaining -= 1;
                    model_calls += 1;
                    tracing::debug!("Agent iteration {}", model_calls);
                    self.call_model(ctx, model, &mut history, tools).await
                }
                LoopState::AwaitingToolResult(call) => {
                    tracing::debug!("Dispatching tool call {} ({})", call.name, call.id);
                    self.call_tool(ctx, &mut history, call).await
                }
            };
        };

        match &outcome {
            LoopOutcome::Failure(e) => tracing::error!("Agent run failed: {}", e),
            LoopOutcome::Cancelled => tracing::info!("Agent run cancelled"),
            _ => {}
        }

        AgentRun {
            outcome,
            history,
            model_calls,
        }
    }

    async fn call_model(
        &self,
        ctx: &RunContext,
        model: &str,
        history: &mut ConversationHistory,
        tools: &[ToolDeclaration],
    ) -> LoopState {
        let result = tokio::select! {
            biased;
            _ = ctx.cancellation().cancelled() => return LoopState::Done(LoopOutcome::Cancelled),
            result = self.model.generate(model, history.as_slice(), tools) => result,
        };

        let turn = match result {
            Ok(turn) => turn,
            Err(e) => return LoopState::Done(LoopOutcome::Failure(AgentError::Provider(e))),
        };

        let mut calls = turn.tool_calls.into_iter();
        let Some(call) = calls.next() else {
            let answer = turn.text.clone().unwrap_or_else(|| {
                tracing::warn!("Model returned neither text nor a tool call");
                String::new()
            });
            history.push(Turn::model(turn.text, Vec::new()));
            return LoopState::Done(LoopOutcome::FinalAnswer(answer));
        };

        let deferred: Vec<String> = calls.map(|c| c.name).collect();
        if !deferred.is_empty() {
            tracing::warn!(
                "Model requested {} extra tool call(s) in one turn, only {} is executed: {:?}",
                deferred.len(),
                call.name,
                deferred
            );
        }

        history.push(Turn::model(turn.text, vec![call.clone()]));
        LoopState::AwaitingToolResult(call)
    }

    async fn call_tool(
        &self,
        ctx: &RunContext,
        history: &mut ConversationHistory,
        call: ToolCall,
    ) -> LoopState {
        let result = tokio::select! {
            biased;
            _ = ctx.cancellation().cancelled() => return LoopState::Done(LoopOutcome::Cancelled),
            result = self.dispatcher.execute(ctx, &call.name, &call.arguments) => result,
        };

        let outcome = match result.map_err(ToolError::into_feedback) {
            Ok(text) => {
                tracing::info!("Tool {} succeeded: {}", call.name, truncate_for_log(&text, 1000));
                ToolOutcome::Success(text)
            }
            Err(Ok(message)) => {
                tracing::warn!("Tool {} failed, reporting to model: {}", call.name, message);
                ToolOutcome::Failure(message)
            }
            Err(Err(e)) => return LoopState::Done(LoopOutcome::Failure(AgentError::Auth(e))),
        };

        history.push(Turn::tool_result(ToolResult {
            call_id: call.id,
            name: call.name,
            outcome,
        }));
        LoopState::AwaitingModel
    }
}

/// Truncate a string for logging purposes.
fn truncate_for_log(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [truncated]", &s[..end])
}
