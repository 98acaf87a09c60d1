//! Per-request execution context.

use tokio_util::sync::CancellationToken;

/// Context for a single loop invocation.
///
/// Carries the identity whose credentials tool handlers resolve, and the
/// caller's cancellation token. Cloning is cheap; clones share the token.
#[derive(Debug, Clone)]
pub struct RunContext {
    identity: String,
    cancel: CancellationToken,
}

impl RunContext {
    /// Create a context with a fresh, never-cancelled token.
    pub fn new(identity: impl Into<String>) -> Self {
        Self::with_cancellation(identity, CancellationToken::new())
    }

    /// Create a context observing the caller's token.
    pub fn with_cancellation(identity: impl Into<String>, cancel: CancellationToken) -> Self {
        Self {
            identity: identity.into(),
            cancel,
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
