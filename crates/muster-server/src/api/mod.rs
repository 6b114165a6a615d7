//! HTTP API surface
//!
//! Thin boundary consumed by the dashboard: login/logout, list connected
//! agents, submit a command. Protected routes pass through the session
//! middleware before touching any other component. The agent WebSocket
//! endpoint lives here too, outside the operator session layer.

mod handlers;
mod ws;

use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use axum_extra::extract::cookie::CookieJar;

use crate::state::ServerState;

use handlers::ApiError;

/// Name of the operator session cookie
pub const SESSION_COOKIE: &str = "muster_session";

/// Build the API router.
pub fn router(state: ServerState) -> Router {
    let protected = Router::new()
        .route("/clients", get(handlers::list_clients))
        .route("/send-command", post(handlers::send_command))
        .route("/logout", post(handlers::logout))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_session,
        ));

    Router::new()
        .route("/login", post(handlers::login))
        .route("/ws/agent", get(ws::agent_ws))
        .merge(protected)
        .with_state(state)
}

/// Reject requests without a live operator session.
///
/// Failure short-circuits with a uniform 401 before the request reaches the
/// registry or dispatcher; missing, unknown, and expired tokens are
/// indistinguishable to the caller.
async fn require_session(
    State(state): State<ServerState>,
    jar: CookieJar,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = jar
        .get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .ok_or(ApiError::Unauthenticated)?;

    state
        .sessions
        .authorize(&token)
        .map_err(|_| ApiError::Unauthenticated)?;

    Ok(next.run(request).await)
}
