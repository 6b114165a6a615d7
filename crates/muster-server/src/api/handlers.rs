//! Operator-facing request handlers

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::{Deserialize, Serialize};
use serde_json::json;

use muster_core::{CommandTarget, DispatchStatus, RegistryError};

use crate::dispatch::{self, CommandRequest};
use crate::state::ServerState;

use super::SESSION_COOKIE;

/// Errors returned across the API boundary.
///
/// Every variant maps to a structured JSON body; the operator never sees a
/// raw error chain.
#[derive(Debug)]
pub enum ApiError {
    /// Missing, invalid, or expired session; also failed logins
    Unauthenticated,
    /// Malformed request input, rejected before any side effect
    InvalidRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthenticated => (StatusCode::UNAUTHORIZED, "unauthenticated".to_string()),
            ApiError::InvalidRequest(message) => (StatusCode::BAD_REQUEST, message),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[derive(Deserialize)]
pub struct LoginRequest {
    username: String,
    password: String,
}

/// `POST /login` — validate credentials and set the session cookie.
pub async fn login(
    State(state): State<ServerState>,
    jar: CookieJar,
    Json(body): Json<LoginRequest>,
) -> Result<(CookieJar, Json<serde_json::Value>), ApiError> {
    let token = state
        .sessions
        .login(&body.username, &body.password)
        .map_err(|_| ApiError::Unauthenticated)?;

    let cookie = Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true);

    Ok((jar.add(cookie), Json(json!({ "status": "ok" }))))
}

/// `POST /logout` — invalidate the session and clear the cookie.
pub async fn logout(
    State(state): State<ServerState>,
    jar: CookieJar,
) -> (CookieJar, Json<serde_json::Value>) {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.sessions.logout(cookie.value());
    }
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    (jar, Json(json!({ "status": "ok" })))
}

/// `GET /clients` — registry snapshot, `name -> {connected_at, last_heartbeat}`.
pub async fn list_clients(State(state): State<ServerState>) -> impl IntoResponse {
    Json(state.registry.list())
}

#[derive(Deserialize)]
pub struct SendCommandRequest {
    command: String,
    target: String,
}

#[derive(Serialize)]
pub struct SendCommandResponse {
    status: DispatchStatus,
    message: String,
}

/// `POST /send-command` — validate, dispatch, and report the aggregate
/// outcome.
///
/// Validation failures are rejected before the registry or dispatcher is
/// touched. A named target that is not connected is reported as a `failure`
/// outcome rather than an HTTP error; the dashboard renders the status pair
/// either way.
pub async fn send_command(
    State(state): State<ServerState>,
    Json(body): Json<SendCommandRequest>,
) -> Result<Json<SendCommandResponse>, ApiError> {
    let command = body.command.trim();
    if command.is_empty() {
        return Err(ApiError::InvalidRequest("command must not be empty".to_string()));
    }

    let target = CommandTarget::parse(&body.target)
        .ok_or_else(|| ApiError::InvalidRequest("target must be \"all\" or an agent name".to_string()))?;

    let request = CommandRequest {
        body: command.to_string(),
        target,
    };

    tracing::info!("Dispatching command to {}", request.target);

    let report = dispatch::dispatch(&state.registry, request, state.config.dispatch_timeout).await;

    let response = match report {
        Ok(report) => SendCommandResponse {
            status: report.status,
            message: report.message,
        },
        Err(RegistryError::UnknownAgent(name)) => SendCommandResponse {
            status: DispatchStatus::Failure,
            message: format!("unknown agent: {}", name),
        },
        Err(RegistryError::NameConflict(name)) => SendCommandResponse {
            status: DispatchStatus::Failure,
            message: format!("agent name conflict: {}", name),
        },
    };

    Ok(Json(response))
}
