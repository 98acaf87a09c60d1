//! Google sign-in and session identification.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{
        header::{AUTHORIZATION, COOKIE, LOCATION, SET_COOKIE},
        HeaderMap, StatusCode,
    },
    response::{AppendHeaders, IntoResponse},
    Json,
};
use chrono::Utc;
use rand::RngCore;

use crate::auth::oauth::id_token_claims;
use crate::auth::{User, LOCAL_IDENTITY};

use super::routes::AppState;
use super::types::{CallbackQuery, SessionResponse};

pub const SESSION_COOKIE: &str = "agc_session";
const STATE_COOKIE: &str = "agc_oauth_state";
const SESSION_MAX_AGE_SECS: i64 = 30 * 24 * 60 * 60;

/// Value of a cookie in the request's `Cookie` header(s).
fn cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Session id from `Authorization: Bearer <id>` or the session cookie.
///
/// The CLI's session id is never accepted from a request; only the in-process
/// dev-mode fallback may use it.
pub fn identity_from_headers(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    bearer
        .or_else(|| cookie(headers, SESSION_COOKIE))
        .filter(|id| id != LOCAL_IDENTITY)
}

/// The callback's `state` must echo the cookie set by [`login`].
fn check_state(headers: &HeaderMap, state: Option<&str>) -> Result<(), (StatusCode, String)> {
    match (cookie(headers, STATE_COOKIE), state) {
        (Some(expected), Some(state)) if expected == state => Ok(()),
        (None, _) => Err((
            StatusCode::BAD_REQUEST,
            "Missing OAuth state cookie; start again at /auth/login".to_string(),
        )),
        _ => Err((StatusCode::BAD_REQUEST, "OAuth state mismatch".to_string())),
    }
}

fn oauth_unavailable() -> (StatusCode, String) {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        "Google OAuth is not configured (GOOGLE_CLIENT_ID / GOOGLE_CLIENT_SECRET)".to_string(),
    )
}

/// Redirect to the Google consent screen.
pub async fn login(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let oauth = state.oauth.as_ref().ok_or_else(oauth_unavailable)?;

    let mut nonce = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut nonce);
    let csrf = hex::encode(nonce);

    let url = oauth
        .authorize_url(&csrf)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok((
        StatusCode::FOUND,
        [
            (LOCATION, url),
            (
                SET_COOKIE,
                format!(
                    "{}={}; Path=/auth; HttpOnly; SameSite=Lax; Max-Age=600",
                    STATE_COOKIE, csrf
                ),
            ),
        ],
    ))
}

/// OAuth redirect target: exchange the code and start a session.
pub async fn callback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<CallbackQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let oauth = state.oauth.as_ref().ok_or_else(oauth_unavailable)?;

    if let Some(error) = query.error {
        return Err((StatusCode::BAD_REQUEST, format!("Sign-in was denied: {}", error)));
    }
    check_state(&headers, query.state.as_deref())?;

    let code = query
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| (StatusCode::BAD_REQUEST, "Missing authorization code".to_string()))?;

    let token = oauth
        .exchange_code(&code)
        .await
        .map_err(|e| (StatusCode::BAD_GATEWAY, e.to_string()))?;

    let id_token = token.id_token.as_deref().ok_or_else(|| {
        (
            StatusCode::BAD_GATEWAY,
            "Token response carried no id_token".to_string(),
        )
    })?;
    let claims = id_token_claims(id_token).map_err(|e| (StatusCode::BAD_GATEWAY, e.to_string()))?;

    let user = User {
        user_id: claims.sub,
        email: claims.email,
        name: claims.name,
    };
    let internal = |e: crate::auth::StoreError| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string());

    state.store.upsert_user(&user).map_err(internal)?;
    let session = state
        .store
        .create_session(
            &user.user_id,
            &token.access_token,
            token.refresh_token.as_deref(),
            token.expires_at(Utc::now()),
        )
        .map_err(internal)?;

    tracing::info!("User {} signed in", user.email);

    let session_cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE, session.session_id, SESSION_MAX_AGE_SECS
    );

    let clear_state = format!(
        "{}=; Path=/auth; HttpOnly; SameSite=Lax; Max-Age=0",
        STATE_COOKIE
    );

    Ok((
        AppendHeaders([(SET_COOKIE, session_cookie), (SET_COOKIE, clear_state)]),
        Json(SessionResponse {
            user_id: user.user_id,
            email: user.email,
            name: user.name,
        }),
    ))
}

/// Delete the caller's session and clear the cookie.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if let Some(session_id) = identity_from_headers(&headers) {
        state
            .store
            .delete_session(&session_id)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    }

    Ok((
        StatusCode::NO_CONTENT,
        [(
            SET_COOKIE,
            format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", SESSION_COOKIE),
        )],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_takes_precedence_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, "agc_session=from-cookie".parse().unwrap());
        assert_eq!(identity_from_headers(&headers).as_deref(), Some("from-cookie"));

        headers.insert(AUTHORIZATION, "Bearer from-header".parse().unwrap());
        assert_eq!(identity_from_headers(&headers).as_deref(), Some("from-header"));
    }

    #[test]
    fn cookie_lookup_ignores_other_cookies() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, "a=1; agc_session_old=x; agc_oauth_state=abc".parse().unwrap());
        assert_eq!(cookie(&headers, STATE_COOKIE).as_deref(), Some("abc"));
        assert_eq!(cookie(&headers, SESSION_COOKIE), None);
    }

    #[test]
    fn local_session_id_is_never_taken_from_a_request() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "Bearer local".parse().unwrap());
        assert!(identity_from_headers(&headers).is_none());

        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, "agc_session=local".parse().unwrap());
        assert!(identity_from_headers(&headers).is_none());
    }

    #[test]
    fn state_must_match_the_login_cookie() {
        let mut headers = HeaderMap::new();
        let (status, message) = check_state(&headers, Some("anything")).unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(message.contains("/auth/login"));

        headers.insert(COOKIE, "agc_oauth_state=abc".parse().unwrap());
        assert!(check_state(&headers, Some("abd")).is_err());
        assert!(check_state(&headers, None).is_err());
        assert!(check_state(&headers, Some("abc")).is_ok());
    }

    #[test]
    fn missing_or_empty_identity_is_none() {
        let mut headers = HeaderMap::new();
        assert!(identity_from_headers(&headers).is_none());
        headers.insert(AUTHORIZATION, "Bearer ".parse().unwrap());
        headers.insert(COOKIE, "agc_session=".parse().unwrap());
        assert!(identity_from_headers(&headers).is_none());
    }
}
