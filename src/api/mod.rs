//! HTTP API.
//!
//! ## Endpoints
//!
//! - `GET /api/health` - Health check
//! - `POST /api/chat` - Run the agent on a prompt
//! - `GET /auth/login` - Redirect to Google consent
//! - `GET /auth/callback` - OAuth redirect target; creates a session
//! - `POST /auth/logout` - Delete the current session

mod auth;
mod routes;
pub mod types;

pub use routes::{router, serve, AppState};
