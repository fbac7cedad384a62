use async_trait::async_trait;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::Response;
use axum::Router;
use bytes::Bytes;
use chat_bridge::config::{BridgeConfig, RemoteConfig, RemoteProtocol};
use chat_bridge::translate::chat_types::*;
use chat_bridge::translate::openai_types::*;
use chat_bridge::translate::request::chat_to_openai;
use chat_bridge::translate::response::openai_to_chat;
use chat_bridge::translate::streaming::StreamAccumulator;
use chat_bridge::{BridgeError, RemoteClient, RemoteTarget, ResponseSink, SharedJournal};
use futures::StreamExt;
use serde_json::json;
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

// ────────────────────────────────────────────────────────────────
// Mock OpenAI-compatible remote
// ────────────────────────────────────────────────────────────────

#[derive(Clone)]
enum Reply {
    Json(u16, String),
    Sse(String),
    /// One SSE frame, then the body never ends.
    Stall(String),
    /// Error status whose body breaks off mid-read.
    BrokenBody(u16),
    /// Native-protocol answer with its own status and content type.
    Native {
        status: u16,
        content_type: &'static str,
        body: String,
    },
}

#[derive(Debug, Clone)]
struct Seen {
    path: String,
    authorization: Option<String>,
    body: serde_json::Value,
    raw: Bytes,
}

#[derive(Clone)]
struct MockState {
    reply: Reply,
    seen: Arc<Mutex<Vec<Seen>>>,
}

struct MockRemote {
    addr: SocketAddr,
    seen: Arc<Mutex<Vec<Seen>>>,
}

impl MockRemote {
    async fn start(reply: Reply) -> Self {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let state = MockState {
            reply,
            seen: Arc::clone(&seen),
        };

        let app = Router::new().fallback(handle_mock).with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Self { addr, seen }
    }

    fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    fn requests(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }
}

async fn handle_mock(
    State(state): State<MockState>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.seen.lock().unwrap().push(Seen {
        path: uri.path().to_string(),
        authorization: headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(String::from),
        body: serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null),
        raw: body.clone(),
    });

    match state.reply {
        Reply::Json(status, body) => Response::builder()
            .status(status)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap(),
        Reply::Sse(body) => Response::builder()
            .header("content-type", "text/event-stream")
            .body(Body::from(body))
            .unwrap(),
        Reply::Native {
            status,
            content_type,
            body,
        } => Response::builder()
            .status(status)
            .header("content-type", content_type)
            .body(Body::from(body))
            .unwrap(),
        Reply::BrokenBody(status) => {
            let frames = futures::stream::iter(vec![
                Ok(Bytes::from_static(b"{\"error\":")),
                Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "upstream died")),
            ]);
            Response::builder()
                .status(status)
                .header("content-type", "application/json")
                .body(Body::from_stream(frames))
                .unwrap()
        }
        Reply::Stall(first) => {
            let frames = futures::stream::iter(vec![Ok::<_, Infallible>(Bytes::from(first))])
                .chain(futures::stream::pending());
            Response::builder()
                .header("content-type", "text/event-stream")
                .body(Body::from_stream(frames))
                .unwrap()
        }
    }
}

fn completion_json(content: &str, tool_calls: serde_json::Value) -> String {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": "remote-model",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content, "tool_calls": tool_calls},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 5, "completion_tokens": 1, "total_tokens": 6}
    })
    .to_string()
}

fn content_frame(text: &str) -> String {
    let chunk = json!({
        "id": "c1",
        "object": "chat.completion.chunk",
        "created": 0,
        "model": "remote-model",
        "choices": [{"index": 0, "delta": {"content": text}, "finish_reason": null}]
    });
    format!("data: {chunk}\n\n")
}

fn user_request(stream: bool) -> ChatRequest {
    ChatRequest {
        model: "llama-remote".to_string(),
        messages: vec![Message::new(Role::User, "hi")],
        stream: Some(stream),
        ..ChatRequest::default()
    }
}

// ────────────────────────────────────────────────────────────────
// Translation properties (no network)
// ────────────────────────────────────────────────────────────────

#[test]
fn test_request_response_roundtrip_preserves_text_and_tool_calls() {
    let mut args = ToolCallArguments::new();
    args.insert("city".to_string(), json!("Paris"));
    args.insert("units".to_string(), json!({"temp": "celsius", "wind": ["kmh"]}));

    let mut assistant = Message::assistant("Checking the weather.");
    assistant.tool_calls = vec![ToolCall::new("call_1", "get_weather", args.clone())];

    let req = ChatRequest {
        model: "local".to_string(),
        messages: vec![Message::new(Role::User, "weather?"), assistant],
        ..ChatRequest::default()
    };

    let wire = chat_to_openai(&req, "gpt-4o").unwrap();
    assert_eq!(wire.messages.len(), req.messages.len());

    // echo the assistant turn back as if the remote had produced it
    let echoed = &wire.messages[1];
    let resp = ChatCompletionResponse {
        id: "chatcmpl-echo".to_string(),
        object: "chat.completion".to_string(),
        created: 0,
        model: "gpt-4o".to_string(),
        choices: vec![Choice {
            index: 0,
            message: ChoiceMessage {
                role: echoed.role.clone(),
                content: echoed.content.clone(),
                reasoning: None,
                reasoning_content: None,
                tool_calls: echoed.tool_calls.clone(),
            },
            finish_reason: Some("tool_calls".to_string()),
        }],
        usage: None,
    };

    let back = openai_to_chat(&resp, "local").unwrap();
    assert_eq!(back.message.content, "Checking the weather.");
    assert_eq!(back.message.tool_calls.len(), 1);
    assert_eq!(back.message.tool_calls[0].function.name, "get_weather");
    assert_eq!(back.message.tool_calls[0].function.arguments, args);
}

#[test]
fn test_streamed_increments_concatenate_to_full_content() {
    let pieces = ["The ", "quick ", "brown ", "fox."];
    let mut acc = StreamAccumulator::new("m");
    let mut streamed = String::new();

    for piece in pieces {
        let chunk: ChatCompletionChunk = serde_json::from_value(json!({
            "choices": [{"index": 0, "delta": {"content": piece}, "finish_reason": null}]
        }))
        .unwrap();
        for partial in acc.process_chunk(&chunk) {
            assert!(!partial.done);
            streamed.push_str(&partial.message.content);
        }
    }

    let full: ChatCompletionResponse =
        serde_json::from_str(&completion_json(&pieces.concat(), serde_json::Value::Null)).unwrap();
    let non_streamed = openai_to_chat(&full, "m").unwrap();

    assert_eq!(streamed, non_streamed.message.content);
    assert_eq!(acc.finish().message.content, non_streamed.message.content);
}

#[test]
fn test_tool_deltas_0_0_1_0() {
    let deltas = [
        json!({"index": 0, "id": "call_a", "type": "function", "function": {"name": "lookup", "arguments": "{\"id\""}}),
        json!({"index": 0, "function": {"arguments": ": 1}"}}),
        json!({"index": 1, "id": "call_b", "type": "function", "function": {"name": "notify", "arguments": "{}"}}),
        json!({"index": 0, "function": {"name": "lookup_v2"}}),
    ];

    let mut acc = StreamAccumulator::new("m");
    for delta in deltas {
        let chunk: ChatCompletionChunk = serde_json::from_value(json!({
            "choices": [{"index": 0, "delta": {"tool_calls": [delta]}, "finish_reason": null}]
        }))
        .unwrap();
        assert!(acc.process_chunk(&chunk).is_empty());
    }

    let terminal = acc.finish();
    let calls = &terminal.message.tool_calls;
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].function.name, "lookup_v2");
    assert_eq!(calls[0].function.arguments["id"], 1);
    assert_eq!(calls[1].function.name, "notify");
}

// ────────────────────────────────────────────────────────────────
// Transport against the mock remote
// ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_scenario_a_non_streaming() {
    let remote = MockRemote::start(Reply::Json(200, completion_json("hello", serde_json::Value::Null))).await;
    let client = RemoteClient::new().unwrap();
    let target = RemoteTarget::new(remote.base_url(), "sk-test").with_model("gpt-4o-mini");

    let mut sink: Vec<ChatResponse> = Vec::new();
    client
        .send(&CancellationToken::new(), &user_request(false), &target, &mut sink)
        .await
        .unwrap();

    assert_eq!(sink.len(), 1);
    let resp = &sink[0];
    assert_eq!(resp.model, "llama-remote");
    assert_eq!(resp.message.role, Role::Assistant);
    assert_eq!(resp.message.content, "hello");
    assert!(resp.done);
    assert_eq!(resp.done_reason.as_deref(), Some("stop"));
    assert_eq!(resp.prompt_eval_count, 5);
    assert_eq!(resp.eval_count, 1);

    let seen = remote.requests();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].path, "/v1/chat/completions");
    assert_eq!(seen[0].authorization.as_deref(), Some("Bearer sk-test"));
    assert_eq!(seen[0].body["model"], "gpt-4o-mini");
    assert_eq!(seen[0].body["stream"], false);
    assert_eq!(seen[0].body["messages"][0]["role"], "user");
    assert_eq!(seen[0].body["messages"][0]["content"], "hi");
}

#[tokio::test]
async fn test_scenario_b_streaming() {
    let body = format!("{}{}data: [DONE]\n\n", content_frame("He"), content_frame("llo"));
    let remote = MockRemote::start(Reply::Sse(body)).await;
    let client = RemoteClient::new().unwrap();
    let target = RemoteTarget::new(remote.base_url(), "sk-test");

    let mut sink: Vec<ChatResponse> = Vec::new();
    client
        .send(&CancellationToken::new(), &user_request(true), &target, &mut sink)
        .await
        .unwrap();

    assert_eq!(sink.len(), 3);
    assert_eq!(sink[0].message.content, "He");
    assert!(!sink[0].done);
    assert_eq!(sink[1].message.content, "llo");
    assert!(!sink[1].done);
    assert_eq!(sink[2].message.content, "Hello");
    assert!(sink[2].done);

    let seen = remote.requests();
    assert_eq!(seen[0].body["stream"], true);
    assert_eq!(seen[0].body["model"], "llama-remote");
}

#[tokio::test]
async fn test_scenario_c_remote_error_is_surfaced_verbatim() {
    let error_body = r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#;
    let remote = MockRemote::start(Reply::Json(401, error_body.to_string())).await;
    let client = RemoteClient::new().unwrap();
    let target = RemoteTarget::new(remote.base_url(), "sk-wrong");

    let mut sink: Vec<ChatResponse> = Vec::new();
    let result = client
        .send(&CancellationToken::new(), &user_request(false), &target, &mut sink)
        .await;

    match result {
        Err(BridgeError::RemoteApi { status, body }) => {
            assert_eq!(status, 401);
            assert_eq!(body, error_body);
        }
        other => panic!("expected RemoteApi error, got {other:?}"),
    }
    assert!(sink.is_empty());
}

#[tokio::test]
async fn test_unreadable_error_body_still_reports_status() {
    let remote = MockRemote::start(Reply::BrokenBody(503)).await;
    let client = RemoteClient::new().unwrap();
    let target = RemoteTarget::new(remote.base_url(), "");

    let mut sink: Vec<ChatResponse> = Vec::new();
    let result = client
        .send(&CancellationToken::new(), &user_request(false), &target, &mut sink)
        .await;

    match result {
        Err(BridgeError::RemoteApi { status, body }) => {
            assert_eq!(status, 503);
            assert!(body.is_empty());
        }
        other => panic!("expected RemoteApi error, got {other:?}"),
    }
    assert!(sink.is_empty());
}

#[tokio::test]
async fn test_scenario_d_malformed_tool_arguments_dropped() {
    let tool_calls = json!([
        {"id": "call_bad", "type": "function", "function": {"name": "broken", "arguments": "{\"x\": "}},
        {"id": "call_ok", "type": "function", "function": {"name": "fine", "arguments": "{\"x\": 1}"}}
    ]);
    let remote = MockRemote::start(Reply::Json(200, completion_json("here you go", tool_calls))).await;
    let client = RemoteClient::new().unwrap();
    let target = RemoteTarget::new(remote.base_url(), "");

    let mut sink: Vec<ChatResponse> = Vec::new();
    client
        .send(&CancellationToken::new(), &user_request(false), &target, &mut sink)
        .await
        .unwrap();

    let resp = &sink[0];
    assert_eq!(resp.message.content, "here you go");
    assert_eq!(resp.message.tool_calls.len(), 1);
    assert_eq!(resp.message.tool_calls[0].id, "call_ok");
    assert_eq!(resp.message.tool_calls[0].function.arguments["x"], 1);
}

#[tokio::test]
async fn test_empty_credential_sends_no_auth_header() {
    let remote = MockRemote::start(Reply::Json(200, completion_json("ok", serde_json::Value::Null))).await;
    let client = RemoteClient::new().unwrap();
    let target = RemoteTarget::new(format!("{}/v1/chat/completions", remote.base_url()), "");

    let mut sink: Vec<ChatResponse> = Vec::new();
    client
        .send(&CancellationToken::new(), &user_request(false), &target, &mut sink)
        .await
        .unwrap();

    let seen = remote.requests();
    assert!(seen[0].authorization.is_none());
    assert_eq!(seen[0].path, "/v1/chat/completions");
}

#[tokio::test]
async fn test_base_url_path_is_preserved() {
    let remote = MockRemote::start(Reply::Json(200, completion_json("ok", serde_json::Value::Null))).await;
    let client = RemoteClient::new().unwrap();
    let target = RemoteTarget::new(format!("{}/compatible-mode/", remote.base_url()), "k");

    let mut sink: Vec<ChatResponse> = Vec::new();
    client
        .send(&CancellationToken::new(), &user_request(false), &target, &mut sink)
        .await
        .unwrap();

    assert_eq!(remote.requests()[0].path, "/compatible-mode/v1/chat/completions");
}

#[tokio::test]
async fn test_empty_choices_is_an_error() {
    let body = json!({"id": "x", "object": "chat.completion", "created": 0, "model": "m", "choices": []});
    let remote = MockRemote::start(Reply::Json(200, body.to_string())).await;
    let client = RemoteClient::new().unwrap();
    let target = RemoteTarget::new(remote.base_url(), "");

    let mut sink: Vec<ChatResponse> = Vec::new();
    let result = client
        .send(&CancellationToken::new(), &user_request(false), &target, &mut sink)
        .await;

    assert!(matches!(result, Err(BridgeError::EmptyChoice)));
    assert!(sink.is_empty());
}

/// Cancels the call as soon as the first partial arrives.
struct CancelOnFirst {
    cancel: CancellationToken,
    seen: Vec<ChatResponse>,
}

#[async_trait]
impl ResponseSink for CancelOnFirst {
    async fn deliver(&mut self, response: ChatResponse) -> chat_bridge::Result<()> {
        self.seen.push(response);
        self.cancel.cancel();
        Ok(())
    }
}

#[tokio::test]
async fn test_cancellation_interrupts_stalled_stream() {
    let remote = MockRemote::start(Reply::Stall(content_frame("partial"))).await;
    let client = RemoteClient::new().unwrap();
    let target = RemoteTarget::new(remote.base_url(), "");
    let cancel = CancellationToken::new();

    let mut sink = CancelOnFirst {
        cancel: cancel.clone(),
        seen: Vec::new(),
    };
    let result = tokio::time::timeout(
        std::time::Duration::from_secs(10),
        client.send(&cancel, &user_request(true), &target, &mut sink),
    )
    .await
    .expect("cancellation should end the call promptly");

    assert!(matches!(result, Err(BridgeError::Cancelled)));
    assert_eq!(sink.seen.len(), 1);
    assert!(!sink.seen[0].done);
}

#[tokio::test]
async fn test_unparseable_base_url_fails_before_any_call() {
    let client = RemoteClient::new().unwrap();
    let target = RemoteTarget::new("::not a url::", "");
    let mut sink: Vec<ChatResponse> = Vec::new();

    let result = client
        .send(&CancellationToken::new(), &user_request(false), &target, &mut sink)
        .await;

    assert!(matches!(result, Err(BridgeError::Config { .. })));
}

// ────────────────────────────────────────────────────────────────
// Full server roundtrip: native client → bridge → mock remote
// ────────────────────────────────────────────────────────────────

fn remote_config(base_url: String, protocol: RemoteProtocol, api_key_env: Option<&str>) -> RemoteConfig {
    RemoteConfig {
        name: "custom".to_string(),
        base_url: Some(base_url),
        api_key_env: api_key_env.map(String::from),
        protocol: Some(protocol),
    }
}

async fn start_bridge(remote_base: String, journal_dir: &std::path::Path) -> SocketAddr {
    start_bridge_with(remote_config(remote_base, RemoteProtocol::OpenAi, None), journal_dir).await
}

async fn start_bridge_with(remote: RemoteConfig, journal_dir: &std::path::Path) -> SocketAddr {
    let mut models = HashMap::new();
    models.insert("llama-remote".to_string(), "meta-llama/llama-3.1-8b".to_string());

    let config = BridgeConfig {
        port: 0,
        remote,
        models,
    };

    let state = Arc::new(chat_bridge::AppState {
        config,
        client: RemoteClient::new().unwrap(),
        journal: SharedJournal::new(journal_dir.join("calls.jsonl")).unwrap(),
    });

    let app = chat_bridge::build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn test_server_streams_ndjson_by_default() {
    let body = format!("{}{}data: [DONE]\n\n", content_frame("po"), content_frame("ng"));
    let remote = MockRemote::start(Reply::Sse(body)).await;
    let dir = tempfile::tempdir().unwrap();
    let addr = start_bridge(remote.base_url(), dir.path()).await;
    let http = reqwest::Client::new();

    let resp = http
        .post(format!("http://{addr}/api/chat"))
        .json(&json!({
            "model": "llama-remote",
            "messages": [{"role": "user", "content": "ping"}]
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers()["content-type"].to_str().unwrap(),
        "application/x-ndjson"
    );

    let text = resp.text().await.unwrap();
    let lines: Vec<serde_json::Value> = text
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["message"]["content"], "po");
    assert_eq!(lines[2]["done"], true);
    assert_eq!(lines[2]["message"]["content"], "pong");

    assert_eq!(remote.requests()[0].body["model"], "meta-llama/llama-3.1-8b");

    let journal: serde_json::Value = http
        .get(format!("http://{addr}/api/journal?limit=5"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(journal["calls"][0]["outcome"], "completed");
    assert_eq!(journal["calls"][0]["stream"], true);
}

#[tokio::test]
async fn test_server_non_streaming_and_error_status() {
    let remote = MockRemote::start(Reply::Json(200, completion_json("hello", serde_json::Value::Null))).await;
    let dir = tempfile::tempdir().unwrap();
    let addr = start_bridge(remote.base_url(), dir.path()).await;
    let http = reqwest::Client::new();

    let body: serde_json::Value = http
        .post(format!("http://{addr}/api/chat"))
        .json(&json!({
            "model": "llama-remote",
            "stream": false,
            "messages": [{"role": "user", "content": "hi"}]
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["message"]["content"], "hello");
    assert_eq!(body["done"], true);
    assert_eq!(body["done_reason"], "stop");
    assert_eq!(body["prompt_eval_count"], 5);
    assert_eq!(body["eval_count"], 1);

    let failing = MockRemote::start(Reply::Json(
        401,
        r#"{"error":{"message":"bad key","type":"auth"}}"#.to_string(),
    ))
    .await;
    let addr = start_bridge(failing.base_url(), dir.path()).await;

    let resp = http
        .post(format!("http://{addr}/api/chat"))
        .json(&json!({
            "model": "llama-remote",
            "messages": [{"role": "user", "content": "hi"}]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED.as_u16());
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "bad key");
}

#[tokio::test]
async fn test_server_rejects_bad_request_and_serves_health() {
    let remote = MockRemote::start(Reply::Json(200, completion_json("x", serde_json::Value::Null))).await;
    let dir = tempfile::tempdir().unwrap();
    let addr = start_bridge(remote.base_url(), dir.path()).await;
    let http = reqwest::Client::new();

    let resp = http
        .post(format!("http://{addr}/api/chat"))
        .header("content-type", "application/json")
        .body(r#"{"model": "m", "options": {"temperature": "hot"}}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    assert!(remote.requests().is_empty());

    let health = http.get(format!("http://{addr}/health")).send().await.unwrap();
    assert_eq!(health.status(), 200);

    let tags: serde_json::Value = http
        .get(format!("http://{addr}/api/tags"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(tags["models"][0]["name"], "llama-remote");
    assert_eq!(tags["models"][0]["remote_model"], "meta-llama/llama-3.1-8b");
}

#[tokio::test]
async fn test_native_remote_gets_body_unchanged() {
    let answer = "{\"model\":\"llama3\",\"done\":false}\n{\"model\":\"llama3\",\"done\":true}\n";
    let remote = MockRemote::start(Reply::Native {
        status: 200,
        content_type: "application/x-ndjson",
        body: answer.to_string(),
    })
    .await;
    let dir = tempfile::tempdir().unwrap();
    let addr = start_bridge_with(
        remote_config(format!("{}/", remote.base_url()), RemoteProtocol::Native, None),
        dir.path(),
    )
    .await;

    // unknown fields and key order must survive untouched
    let request = r#"{"model":"llama3","keep_alive":"5m","messages":[{"role":"user","content":"hi"}],"options":{"top_k":40}}"#;
    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/api/chat"))
        .header("content-type", "application/json")
        .body(request)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers()["content-type"].to_str().unwrap(),
        "application/x-ndjson"
    );
    assert_eq!(resp.text().await.unwrap(), answer);

    let seen = remote.requests();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].path, "/api/chat");
    assert_eq!(seen[0].raw, Bytes::from_static(request.as_bytes()));
    assert!(seen[0].authorization.is_none());
}

#[tokio::test]
async fn test_native_remote_status_and_key_pass_through() {
    const KEY_VAR: &str = "CHAT_BRIDGE_TEST_NATIVE_KEY";
    std::env::set_var(KEY_VAR, "native-secret");

    let remote = MockRemote::start(Reply::Native {
        status: 404,
        content_type: "application/json",
        body: r#"{"error":"model 'nope' not found"}"#.to_string(),
    })
    .await;
    let dir = tempfile::tempdir().unwrap();
    let addr = start_bridge_with(
        remote_config(remote.base_url(), RemoteProtocol::Native, Some(KEY_VAR)),
        dir.path(),
    )
    .await;
    let http = reqwest::Client::new();

    let resp = http
        .post(format!("http://{addr}/api/chat"))
        .json(&json!({"model": "nope", "messages": []}))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 404);
    assert_eq!(
        resp.headers()["content-type"].to_str().unwrap(),
        "application/json"
    );
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "model 'nope' not found");

    let seen = remote.requests();
    assert_eq!(seen[0].path, "/api/chat");
    assert_eq!(seen[0].authorization.as_deref(), Some("Bearer native-secret"));

    let journal: serde_json::Value = http
        .get(format!("http://{addr}/api/journal"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(journal["calls"][0]["outcome"], "remote_error");
    assert_eq!(journal["calls"][0]["status"], 404);
}
