//! Dispatcher tests against an in-process mock of the chat-completions API

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tower::ServiceExt;
use visaplex_gateway::config::{Config, PolicyConfig, RedactionConfig, UpstreamConfig};
use visaplex_gateway::http::{HttpState, router};
use visaplex_gateway::pipeline::Gateway;
use visaplex_gateway::prompt::{PromptAssembler, PromptBundle};
use visaplex_gateway::redact::Redactor;
use visaplex_gateway::scope::ScopeVerdict;
use visaplex_gateway::upstream::{
    CompletionService, CredentialProvider, OpenAiDispatcher, StaticCredentials, UpstreamOutcome,
};

#[derive(Clone, Default)]
struct Captured {
    hits: Arc<AtomicUsize>,
    auth: Arc<Mutex<Option<String>>>,
    body: Arc<Mutex<Option<Value>>>,
}

async fn spawn_upstream(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/v1", addr)
}

/// Mock that records the request and replies with a fixed status and body
async fn mock_upstream(status: StatusCode, reply: impl Into<String>) -> (String, Captured) {
    let captured = Captured::default();
    let reply: String = reply.into();
    let handler = move |State(c): State<Captured>, headers: HeaderMap, Json(body): Json<Value>| {
        let reply = reply.clone();
        async move {
            c.hits.fetch_add(1, Ordering::SeqCst);
            *c.auth.lock().await = headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            *c.body.lock().await = Some(body);
            (status, reply).into_response()
        }
    };
    let app = Router::new()
        .route("/v1/chat/completions", post(handler))
        .with_state(captured.clone());
    (spawn_upstream(app).await, captured)
}

fn dispatcher(base_url: &str, timeout_ms: Option<u64>) -> OpenAiDispatcher {
    let config = UpstreamConfig {
        base_url: base_url.to_string(),
        timeout_ms,
        ..UpstreamConfig::default()
    };
    OpenAiDispatcher::new(&config, Arc::new(StaticCredentials::new("test-key"))).unwrap()
}

fn bundle(question: &str) -> PromptBundle {
    let (text, _) = Redactor::new(&RedactionConfig::default())
        .unwrap()
        .redact(question);
    PromptAssembler::new(Arc::new(PolicyConfig::default())).assemble(
        &text,
        ScopeVerdict::In,
        "partner_visa_nz",
    )
}

#[tokio::test]
async fn success_reply_is_parsed_and_request_is_well_formed() {
    let (url, captured) = mock_upstream(
        StatusCode::OK,
        r#"{"choices":[{"message":{"role":"assistant","content":"  - Provide relationship evidence  "}}]}"#,
    )
    .await;

    let outcome = dispatcher(&url, None).complete(&bundle("partner visa")).await;
    assert_eq!(
        outcome,
        UpstreamOutcome::Success(Some("- Provide relationship evidence".into()))
    );

    assert_eq!(captured.hits.load(Ordering::SeqCst), 1);
    assert_eq!(
        captured.auth.lock().await.as_deref(),
        Some("Bearer test-key")
    );
    let body = captured.body.lock().await.clone().unwrap();
    assert_eq!(body["model"], "gpt-4o-mini");
    assert_eq!(body["max_tokens"], 220);
    let temperature = body["temperature"].as_f64().unwrap();
    assert!((temperature - 0.2).abs() < 1e-6);
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], "system");
    assert_eq!(messages[1]["role"], "user");
}

#[tokio::test]
async fn missing_answer_field_is_success_without_text() {
    let (url, _) = mock_upstream(StatusCode::OK, r#"{"id":"cmpl-1","choices":[]}"#).await;
    let outcome = dispatcher(&url, None).complete(&bundle("spouse")).await;
    assert_eq!(outcome, UpstreamOutcome::Success(None));
}

#[tokio::test]
async fn non_json_success_body_is_transport_failure() {
    let (url, _) = mock_upstream(StatusCode::OK, "<html>gateway</html>").await;
    let outcome = dispatcher(&url, None).complete(&bundle("spouse")).await;
    assert!(matches!(outcome, UpstreamOutcome::TransportFailure { .. }));
}

#[tokio::test]
async fn error_status_yields_bounded_excerpt() {
    let (url, _) = mock_upstream(StatusCode::TOO_MANY_REQUESTS, "x".repeat(1000)).await;

    match dispatcher(&url, None).complete(&bundle("spouse")).await {
        UpstreamOutcome::UpstreamFailure { status, detail } => {
            assert_eq!(status, 429);
            assert_eq!(detail.chars().count(), 300);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

/// Reads one request (headers plus content-length body) off a raw socket
async fn read_request(socket: &mut TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            return;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
            let len = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + len {
                return;
            }
        }
    }
}

#[tokio::test]
async fn error_body_cut_short_is_transport_failure() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        read_request(&mut socket).await;
        socket
            .write_all(
                b"HTTP/1.1 429 Too Many Requests\r\ncontent-type: text/plain\r\ncontent-length: 100\r\n\r\nslow do",
            )
            .await
            .unwrap();
        socket.flush().await.unwrap();
    });

    let outcome = dispatcher(&format!("http://{}/v1", addr), Some(2000))
        .complete(&bundle("spouse"))
        .await;
    assert!(
        matches!(outcome, UpstreamOutcome::TransportFailure { .. }),
        "unexpected outcome: {outcome:?}"
    );
}

#[tokio::test]
async fn refused_connection_is_transport_failure() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let outcome = dispatcher(&format!("http://{}/v1", addr), None)
        .complete(&bundle("spouse"))
        .await;
    assert!(matches!(outcome, UpstreamOutcome::TransportFailure { .. }));
}

#[tokio::test]
async fn client_timeout_is_transport_failure() {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Json(json!({ "choices": [] }))
        }),
    );
    let url = spawn_upstream(app).await;

    let outcome = dispatcher(&url, Some(100))
        .complete(&bundle("spouse"))
        .await;
    assert!(matches!(outcome, UpstreamOutcome::TransportFailure { .. }));
}

struct NoCredentials;

impl CredentialProvider for NoCredentials {
    fn api_key(&self) -> Option<String> {
        None
    }
}

#[tokio::test]
async fn missing_credential_skips_network_call() {
    let (url, captured) = mock_upstream(StatusCode::OK, r#"{"choices":[]}"#).await;
    let config = UpstreamConfig {
        base_url: url,
        ..UpstreamConfig::default()
    };
    let dispatcher = OpenAiDispatcher::new(&config, Arc::new(NoCredentials)).unwrap();

    let outcome = dispatcher.complete(&bundle("spouse")).await;
    assert!(matches!(outcome, UpstreamOutcome::TransportFailure { .. }));
    assert_eq!(captured.hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn end_to_end_upstream_error_is_502_with_capped_detail() {
    let (url, _) = mock_upstream(StatusCode::INTERNAL_SERVER_ERROR, "e".repeat(750)).await;

    let mut config = Config::default();
    config.upstream.base_url = url;
    let gateway = Gateway::new(&config, Arc::new(dispatcher(&config.upstream.base_url, None)))
        .unwrap();
    let app = router(HttpState::new(Arc::new(gateway)), "/chat", None);

    let req = Request::builder()
        .method("POST")
        .uri("/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"question":"partner visa timeline"}"#))
        .unwrap();
    let resp: Response = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);

    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"], "Upstream error");
    assert_eq!(body["detail"].as_str().map(|d| d.chars().count()), Some(300));
}

#[tokio::test]
async fn end_to_end_success_round_trip() {
    let (url, captured) = mock_upstream(
        StatusCode::OK,
        r#"{"choices":[{"message":{"content":"Use INZ forms."}}]}"#,
    )
    .await;

    let gateway = Gateway::new(&Config::default(), Arc::new(dispatcher(&url, None))).unwrap();
    let answer = gateway
        .handle_bytes(br#"{"question":"Email me at me@x.io about my de facto partner","disclaimer":false}"#)
        .await
        .unwrap();

    assert_eq!(answer.answer, "Use INZ forms.");
    assert_eq!(answer.scope, ScopeVerdict::In);
    let sent = captured.body.lock().await.clone().unwrap().to_string();
    assert!(!sent.contains("me@x.io"));
    assert!(sent.contains("[redacted email]"));
}
