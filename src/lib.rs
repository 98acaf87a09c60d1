//! # agc
//!
//! A natural-language assistant for Google Calendar.
//!
//! This library provides:
//! - A bounded agent loop that lets a language model call calendar tools
//! - A static tool registry and a validating tool dispatcher
//! - A Gemini model client and a Google Calendar REST client
//! - Google OAuth sign-in with an encrypted SQLite session store
//! - An HTTP API and a CLI front end
//!
//! ## Architecture
//!
//! The agent follows the "tools in a loop" pattern:
//! 1. Receive a prompt (CLI argument or `POST /api/chat`)
//! 2. Call the model with the history and every tool declaration
//! 3. Dispatch at most one requested tool call and append its result
//! 4. Repeat until a final answer, the step limit, a fatal error or
//!    cancellation
//!
//! ## Example
//!
//! ```rust,ignore
//! use agc::{agent::{Agent, RunContext}, auth::AuthBackend, config::Config};
//!
//! let config = Config::from_env()?;
//! let auth = AuthBackend::from_config(&config)?;
//! let agent = Agent::from_config(&config, auth.credentials)?;
//! let ctx = RunContext::new(agc::auth::LOCAL_IDENTITY);
//! let outcome = agent.run(&ctx, &config.model, Vec::new(), "Lunch with Sam tomorrow at noon").await;
//! ```

pub mod agent;
pub mod api;
pub mod auth;
pub mod calendar;
pub mod config;
pub mod llm;
pub mod tools;

#[cfg(test)]
mod testing;

pub use config::Config;
