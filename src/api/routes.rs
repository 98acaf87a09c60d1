//! Router, shared state and chat handlers.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::agent::{Agent, AgentError, LoopOutcome, RunContext};
use crate::auth::{AuthBackend, CredentialProvider, OAuthClient, SessionStore, LOCAL_IDENTITY};
use crate::config::Config;

use super::auth;
use super::types::{ChatRequest, ChatResponse, HealthResponse};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub agent: Agent,
    pub credentials: Arc<dyn CredentialProvider>,
    pub store: Arc<SessionStore>,
    pub oauth: Option<OAuthClient>,
}

impl AppState {
    pub fn new(config: Config, agent: Agent, auth: AuthBackend) -> Self {
        Self {
            config,
            agent,
            credentials: auth.credentials,
            store: auth.store,
            oauth: auth.oauth,
        }
    }
}

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/chat", post(chat))
        .route("/auth/login", get(auth::login))
        .route("/auth/callback", get(auth::callback))
        .route("/auth/logout", post(auth::logout))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let auth = AuthBackend::from_config(&config)?;
    let agent = Agent::from_config(&config, Arc::clone(&auth.credentials))?;

    if config.dev_mode {
        tracing::warn!("DEV_MODE is on: requests without a session use the local identity");
    }

    let addr = format!("{}:{}", config.host, config.port);
    let state = Arc::new(AppState::new(config, agent, auth));
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// HTTP status for a loop outcome.
fn status_for(outcome: &LoopOutcome) -> StatusCode {
    match outcome {
        LoopOutcome::FinalAnswer(_) => StatusCode::OK,
        LoopOutcome::StepLimitExceeded { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        LoopOutcome::Failure(AgentError::Auth(_)) => StatusCode::UNAUTHORIZED,
        LoopOutcome::Failure(AgentError::Provider(_)) => StatusCode::BAD_GATEWAY,
        LoopOutcome::Cancelled => StatusCode::REQUEST_TIMEOUT,
    }
}

async fn chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>,
) -> Result<(StatusCode, Json<ChatResponse>), (StatusCode, String)> {
    if req.prompt.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "prompt must not be empty".to_string()));
    }

    let identity = auth::identity_from_headers(&headers)
        .or_else(|| {
            state
                .config
                .dev_mode
                .then(|| LOCAL_IDENTITY.to_string())
        })
        .ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                "Not signed in; visit /auth/login".to_string(),
            )
        })?;

    state
        .credentials
        .resolve(&identity)
        .await
        .map_err(|e| (StatusCode::UNAUTHORIZED, e.to_string()))?;

    let model = req
        .model
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| state.config.model.clone());

    let cancel = CancellationToken::new();
    let ctx = RunContext::with_cancellation(identity, cancel.clone());

    let timeout = state.config.request_timeout();
    let timer = tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        tracing::warn!("Chat request exceeded {:?}, cancelling", timeout);
        cancel.cancel();
    });

    tracing::info!("Chat request: model={} history={}", model, req.history.len());
    let run = state
        .agent
        .run_session(&ctx, &model, req.history, &req.prompt)
        .await;
    timer.abort();

    Ok((status_for(&run.outcome), Json(ChatResponse::from(run))))
}
