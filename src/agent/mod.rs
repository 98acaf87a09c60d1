//! Agent module - the calendar agent loop.
//!
//! The agent follows a "tools in a loop" pattern:
//! 1. Seed the history with prior turns and the user's prompt
//! 2. Call the model with the full history and every tool declaration
//! 3. If the model requests a tool, dispatch it and append the result
//! 4. Repeat until the model answers, the step budget runs out, or the
//!    caller cancels

mod agent_loop;
mod context;
mod prompt;

pub use agent_loop::{Agent, AgentError, AgentRun, LoopOutcome, DEFAULT_MAX_STEPS};
pub use context::RunContext;
pub use prompt::build_system_prompt;
