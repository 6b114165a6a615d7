//! Integration tests for the HTTP API surface

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower::util::ServiceExt;

use muster_core::config::ServerConfig;
use muster_core::AgentName;
use muster_protocol::Message;
use muster_server::dispatch::AgentResult;
use muster_server::{api, AgentHandle, ServerState};

fn test_state() -> ServerState {
    ServerState::new(ServerConfig {
        admin_username: "admin".to_string(),
        admin_password: "hunter2".to_string(),
        dispatch_timeout: Duration::from_millis(200),
        ..ServerConfig::default()
    })
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Log in and return the session cookie ("muster_session=<token>").
async fn login(router: &Router) -> String {
    let response = router
        .clone()
        .oneshot(json_request(
            "POST",
            "/login",
            serde_json::json!({"username": "admin", "password": "hunter2"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("login should set a session cookie")
        .to_str()
        .unwrap();
    set_cookie.split(';').next().unwrap().to_string()
}

/// Admit a fake agent and return the receiving end of its command channel.
fn admit_agent(state: &ServerState, name: &str) -> (Arc<AgentHandle>, mpsc::Receiver<Message>) {
    let (tx, rx) = mpsc::channel(32);
    let handle = Arc::new(AgentHandle::new(
        AgentName::new(name).unwrap(),
        tx,
        CancellationToken::new(),
    ));
    state.registry.admit(Arc::clone(&handle)).unwrap();
    (handle, rx)
}

/// Admit a fake agent that echoes every command back as a success.
fn admit_echo_agent(state: &ServerState, name: &str) -> Arc<AgentHandle> {
    let (handle, mut rx) = admit_agent(state, name);
    let responder = Arc::clone(&handle);
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if let Message::Command { id, body } = frame {
                responder.complete(
                    id,
                    AgentResult {
                        success: true,
                        output: body,
                    },
                );
            }
        }
    });
    handle
}

#[tokio::test]
async fn test_login_sets_session_cookie() {
    let router = api::router(test_state());
    let cookie = login(&router).await;
    assert!(cookie.starts_with("muster_session="));
}

#[tokio::test]
async fn test_login_with_bad_credentials_is_401() {
    let router = api::router(test_state());
    let response = router
        .oneshot(json_request(
            "POST",
            "/login",
            serde_json::json!({"username": "admin", "password": "wrong"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_clients_requires_session() {
    let router = api::router(test_state());
    let response = router
        .oneshot(
            Request::builder()
                .uri("/clients")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body = body_json(response).await;
    assert_eq!(body["error"], "unauthenticated");
}

#[tokio::test]
async fn test_unauthenticated_send_command_never_reaches_dispatcher() {
    let state = test_state();
    let (_handle, mut rx) = admit_agent(&state, "bot1");
    let router = api::router(state);

    let response = router
        .oneshot(json_request(
            "POST",
            "/send-command",
            serde_json::json!({"command": "status", "target": "all"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // No command frame went out to the agent
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_clients_lists_connected_agents() {
    let state = test_state();
    let (handle, _rx) = admit_agent(&state, "bot1");
    let router = api::router(state);
    let cookie = login(&router).await;

    let response = router
        .oneshot(
            Request::builder()
                .uri("/clients")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let entry = &body["bot1"];
    assert_eq!(entry["connected_at"], handle.connected_at());
    assert_eq!(entry["last_heartbeat"], handle.last_heartbeat());
}

#[tokio::test]
async fn test_send_command_empty_body_is_400() {
    let router = api::router(test_state());
    let cookie = login(&router).await;

    let mut request = json_request(
        "POST",
        "/send-command",
        serde_json::json!({"command": "   ", "target": "all"}),
    );
    request
        .headers_mut()
        .insert(header::COOKIE, cookie.parse().unwrap());

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_send_command_empty_target_is_400() {
    let router = api::router(test_state());
    let cookie = login(&router).await;

    let mut request = json_request(
        "POST",
        "/send-command",
        serde_json::json!({"command": "status", "target": ""}),
    );
    request
        .headers_mut()
        .insert(header::COOKIE, cookie.parse().unwrap());

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_send_command_to_unknown_agent_reports_failure() {
    let router = api::router(test_state());
    let cookie = login(&router).await;

    let mut request = json_request(
        "POST",
        "/send-command",
        serde_json::json!({"command": "status", "target": "ghost"}),
    );
    request
        .headers_mut()
        .insert(header::COOKIE, cookie.parse().unwrap());

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "failure");
    assert_eq!(body["message"], "unknown agent: ghost");
}

#[tokio::test]
async fn test_send_command_broadcast_with_no_agents_fails() {
    let router = api::router(test_state());
    let cookie = login(&router).await;

    let mut request = json_request(
        "POST",
        "/send-command",
        serde_json::json!({"command": "status", "target": "all"}),
    );
    request
        .headers_mut()
        .insert(header::COOKIE, cookie.parse().unwrap());

    let response = router.oneshot(request).await.unwrap();
    let body = body_json(response).await;
    assert_eq!(body["status"], "failure");
    assert_eq!(body["message"], "no agents connected");
}

#[tokio::test]
async fn test_send_command_delivers_to_agent() {
    let state = test_state();
    admit_echo_agent(&state, "bot1");
    let router = api::router(state);
    let cookie = login(&router).await;

    let mut request = json_request(
        "POST",
        "/send-command",
        serde_json::json!({"command": "status", "target": "bot1"}),
    );
    request
        .headers_mut()
        .insert(header::COOKIE, cookie.parse().unwrap());

    let response = router.oneshot(request).await.unwrap();
    let body = body_json(response).await;
    assert_eq!(body["status"], "success");
    assert_eq!(body["message"], "status");
}

#[tokio::test]
async fn test_logout_invalidates_session() {
    let router = api::router(test_state());
    let cookie = login(&router).await;

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/logout")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = router
        .oneshot(
            Request::builder()
                .uri("/clients")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
