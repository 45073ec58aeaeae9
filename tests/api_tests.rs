use ollama_chat::config::Config;
use ollama_chat::message::ChatStreamEvent;
use ollama_chat::routes::create_router;
use ollama_chat::state::{AppState, SharedState};

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::util::ServiceExt;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod utils;

fn app_with_backend_port(port: u16) -> (SharedState, Router) {
    let config = Config {
        ollama_port: port,
        ..Config::default()
    };
    let state = Arc::new(AppState::new(config));
    let app = create_router("public").with_state(state.clone());
    (state, app)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn parse_events(body: &str) -> Vec<ChatStreamEvent> {
    utils::sse_data(body)
        .iter()
        .map(|data| serde_json::from_str(data).unwrap())
        .collect()
}

#[tokio::test]
async fn test_health_endpoint() {
    let (_, app) = app_with_backend_port(utils::closed_port());
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_chat_streams_snapshots_and_records_transcript() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_json(json!({ "model": "llama3", "prompt": "  Say hello\n", "stream": true })))
        .respond_with(ResponseTemplate::new(200).set_body_string(utils::ndjson(&[
            r#"{"response":"Hel"}"#,
            r#"{"response":"lo"}"#,
            r#"{"done":true}"#,
        ])))
        .mount(&server)
        .await;

    let (_, app) = app_with_backend_port(server.address().port());
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/chat",
            json!({ "host": "127.0.0.1", "model": "llama3", "prompt": "  Say hello\n" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let events = parse_events(&body_string(response).await);
    let session_id = match events.first() {
        Some(ChatStreamEvent::Session { session_id }) => session_id.clone(),
        other => panic!("expected session event first, got {other:?}"),
    };
    assert_eq!(
        &events[1..],
        &[
            ChatStreamEvent::Snapshot { content: "Hel".into() },
            ChatStreamEvent::Snapshot { content: "Hello".into() },
            ChatStreamEvent::Done { content: "Hello".into() },
        ]
    );

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/sessions/{session_id}/messages"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let history: Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(
        history,
        json!([
            { "role": "user", "content": "  Say hello\n" },
            { "role": "model", "content": "Hello" },
        ])
    );
}

#[tokio::test]
async fn test_chat_connection_refused_yields_error_message() {
    let (state, app) = app_with_backend_port(utils::closed_port());
    let response = app
        .oneshot(post_json(
            "/api/chat",
            json!({ "session_id": "tab-1", "host": "127.0.0.1", "model": "llama3", "prompt": "hi" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let events = parse_events(&body_string(response).await);
    match events.last() {
        Some(ChatStreamEvent::Error { content }) => {
            assert!(content.starts_with("Error: Could not connect to the server"));
        }
        other => panic!("expected an error event, got {other:?}"),
    }

    let history = state.sessions.get_history("tab-1").await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(history[1].content.starts_with("Error: Could not connect to the server"));
}

#[tokio::test]
async fn test_chat_mid_stream_abort_keeps_partial_answer() {
    let port = utils::truncating_backend("{\"response\":\"Hi\"}\n").await;
    let (state, app) = app_with_backend_port(port);
    let response = app
        .oneshot(post_json(
            "/api/chat",
            json!({ "session_id": "tab-2", "host": "127.0.0.1", "model": "m", "prompt": "hi" }),
        ))
        .await
        .unwrap();

    let events = parse_events(&body_string(response).await);
    match events.last() {
        Some(ChatStreamEvent::Error { content }) => {
            assert!(content.starts_with("Hi"));
            assert_ne!(content, "Hi");
        }
        other => panic!("expected an error event, got {other:?}"),
    }

    let history = state.sessions.get_history("tab-2").await.unwrap();
    assert!(history[1].content.starts_with("Hi"));
    assert!(!state.sessions.is_active("tab-2").await);
}

#[tokio::test]
async fn test_chat_rejects_busy_session() {
    let (state, app) = app_with_backend_port(utils::closed_port());
    let sid = state.sessions.create_session().await;
    state.sessions.submit(&sid, "still generating").await.unwrap();

    let response = app
        .oneshot(post_json(
            "/api/chat",
            json!({ "session_id": sid, "host": "127.0.0.1", "model": "m", "prompt": "again" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_chat_rejects_blank_fields() {
    let (_, app) = app_with_backend_port(utils::closed_port());

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/chat",
            json!({ "host": "127.0.0.1", "model": "m", "prompt": "   " }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(post_json(
            "/api/chat",
            json!({ "host": "", "model": "m", "prompt": "hi" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_session_history_is_not_found() {
    let (_, app) = app_with_backend_port(utils::closed_port());
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/sessions/nope/messages")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_relay_forwards_backend_json() {
    let server = MockServer::start().await;
    let backend_reply = json!({ "model": "llama3", "response": "Hello there", "done": true });
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_json(json!({ "model": "llama3", "prompt": "hi", "stream": false })))
        .respond_with(ResponseTemplate::new(200).set_body_json(backend_reply.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let (_, app) = app_with_backend_port(server.address().port());
    let response = app
        .oneshot(post_json(
            "/api/generate",
            json!({ "ipAddress": "127.0.0.1", "modelName": "llama3", "prompt": "hi" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body, backend_reply);
}

#[tokio::test]
async fn test_relay_connection_failure_is_500() {
    let (_, app) = app_with_backend_port(utils::closed_port());
    let response = app
        .oneshot(post_json(
            "/api/generate",
            json!({ "ipAddress": "127.0.0.1", "modelName": "llama3", "prompt": "hi" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body, json!({ "error": "Failed to connect to Ollama server" }));
}

#[tokio::test]
async fn test_config_exposes_ui_defaults() {
    let (_, app) = app_with_backend_port(utils::closed_port());
    let response = app
        .oneshot(Request::builder().uri("/api/config").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body, json!({ "host": "192.168.1.100", "model": "qwen2.5-coder:0.5b" }));
}
