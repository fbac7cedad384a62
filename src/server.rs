use crate::config::{BridgeConfig, RemoteProtocol};
use crate::error::BridgeError;
use crate::logging::{CallOutcome, CallRecord, SharedJournal};
use crate::remote::{RemoteClient, RemoteTarget};
use crate::sink::ResponseSink;
use crate::translate::chat_types::{ChatRequest, ChatResponse};

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

const NDJSON: &str = "application/x-ndjson";

#[derive(Clone)]
pub struct AppState {
    pub config: BridgeConfig,
    pub client: RemoteClient,
    pub journal: SharedJournal,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/chat", post(handle_chat))
        .route("/api/tags", get(handle_tags))
        .route("/api/journal", get(handle_journal))
        .route("/health", get(handle_health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_chat(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    if state.config.protocol() == RemoteProtocol::Native {
        return handle_passthrough(state, body).await;
    }

    let mut req: ChatRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e, "rejecting unparseable chat request");
            return error_body(StatusCode::BAD_REQUEST, format!("Invalid request body: {e}"));
        }
    };

    // the native API streams unless told otherwise
    req.stream.get_or_insert(true);

    let target = match state.config.remote_target(&req.model) {
        Ok(t) => t,
        Err(e) => return error_response(&e),
    };

    tracing::info!(
        model = %req.model,
        remote_model = target.model.as_deref().unwrap_or_default(),
        stream = req.is_streaming(),
        messages = req.messages.len(),
        "chat request"
    );

    if req.is_streaming() {
        handle_streaming(state, req, target).await
    } else {
        handle_non_streaming(state, req, target).await
    }
}

async fn handle_non_streaming(state: Arc<AppState>, req: ChatRequest, target: RemoteTarget) -> Response {
    let cancel = CancellationToken::new();
    let started = Instant::now();
    let mut responses: Vec<ChatResponse> = Vec::new();

    let result = state.client.send(&cancel, &req, &target, &mut responses).await;
    let terminal = responses.pop();

    state
        .journal
        .record(journal_record(&req, &target, &result, terminal.as_ref(), started));

    match (result, terminal) {
        (Ok(()), Some(resp)) => Json(resp).into_response(),
        (Ok(()), None) => error_body(StatusCode::BAD_GATEWAY, "remote produced no response"),
        (Err(e), _) => error_response(&e),
    }
}

/// One line of a streamed answer.
enum Frame {
    Chunk(ChatResponse),
    Error { status: StatusCode, message: String },
}

impl Frame {
    fn into_line(self) -> Bytes {
        let mut line = match self {
            Self::Chunk(resp) => serde_json::to_vec(&resp).unwrap_or_default(),
            Self::Error { message, .. } => {
                serde_json::to_vec(&serde_json::json!({ "error": message })).unwrap_or_default()
            }
        };
        line.push(b'\n');
        Bytes::from(line)
    }
}

/// Forwards responses into the HTTP body channel and remembers the
/// terminal usage counters for the journal.
struct ChannelSink {
    tx: mpsc::Sender<Frame>,
    terminal: Option<ChatResponse>,
}

#[async_trait]
impl ResponseSink for ChannelSink {
    async fn deliver(&mut self, response: ChatResponse) -> crate::Result<()> {
        if response.done {
            self.terminal = Some(response.clone());
        }
        self.tx
            .send(Frame::Chunk(response))
            .await
            .map_err(|_| BridgeError::sink("client disconnected"))
    }
}

async fn handle_streaming(state: Arc<AppState>, req: ChatRequest, target: RemoteTarget) -> Response {
    let (tx, mut rx) = mpsc::channel::<Frame>(32);
    let cancel = CancellationToken::new();
    // dropping the response body cancels the remote call
    let guard = cancel.clone().drop_guard();

    tokio::spawn(async move {
        let started = Instant::now();
        let mut sink = ChannelSink {
            tx: tx.clone(),
            terminal: None,
        };

        let result = state.client.send(&cancel, &req, &target, &mut sink).await;
        state.journal.record(journal_record(
            &req,
            &target,
            &result,
            sink.terminal.as_ref(),
            started,
        ));

        match result {
            Ok(()) | Err(BridgeError::Cancelled | BridgeError::Sink { .. }) => {}
            Err(e) => {
                tracing::warn!(error = %e, "streamed chat call failed");
                let (status, message) = status_and_message(&e);
                let _ = tx.send(Frame::Error { status, message }).await;
            }
        }
    });

    // a failure before the first line can still get a proper status code
    let first = match rx.recv().await {
        Some(Frame::Error { status, message }) => return error_body(status, message),
        other => other,
    };

    let lines = stream::iter(first)
        .chain(ReceiverStream::new(rx))
        .map(move |frame| {
            let _keep_alive = &guard;
            Ok::<_, Infallible>(frame.into_line())
        });

    Response::builder()
        .header(header::CONTENT_TYPE, NDJSON)
        .body(Body::from_stream(lines))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

#[derive(Deserialize)]
struct ModelOnly {
    #[serde(default)]
    model: String,
}

async fn handle_passthrough(state: Arc<AppState>, body: Bytes) -> Response {
    let model = serde_json::from_slice::<ModelOnly>(&body)
        .map(|m| m.model)
        .unwrap_or_default();

    let target = match (state.config.effective_base_url(), state.config.resolve_api_key()) {
        (Ok(base_url), Ok(api_key)) => RemoteTarget::new(base_url, api_key),
        (Err(e), _) | (_, Err(e)) => return error_response(&e),
    };

    let started = Instant::now();
    let cancel = CancellationToken::new();
    let result = state.client.passthrough(&cancel, body, &target).await;

    let mut record = CallRecord::new(model.clone(), model, false).took(started.elapsed());
    match result {
        Ok(resp) => {
            if !(200..300).contains(&resp.status) {
                record = record.failed(
                    CallOutcome::RemoteError,
                    Some(resp.status),
                    "remote returned an error status",
                );
            }
            state.journal.record(record);

            let status = StatusCode::from_u16(resp.status).unwrap_or(StatusCode::BAD_GATEWAY);
            let content_type = resp
                .content_type
                .unwrap_or_else(|| "application/json".to_string());

            Response::builder()
                .status(status)
                .header(header::CONTENT_TYPE, content_type)
                .body(Body::from_stream(resp.body.bytes_stream()))
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
        Err(e) => {
            state
                .journal
                .record(record.failed(CallOutcome::Failed, None, e.to_string()));
            error_response(&e)
        }
    }
}

async fn handle_tags(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let mut names: Vec<(&String, &String)> = state.config.models.iter().collect();
    names.sort();

    let models: Vec<serde_json::Value> = names
        .into_iter()
        .map(|(name, remote)| {
            serde_json::json!({
                "name": name,
                "model": name,
                "remote_model": remote,
                "remote_host": state.config.remote.name,
            })
        })
        .collect();

    Json(serde_json::json!({ "models": models }))
}

#[derive(Deserialize)]
struct JournalQuery {
    limit: Option<usize>,
}

async fn handle_journal(
    State(state): State<Arc<AppState>>,
    Query(query): Query<JournalQuery>,
) -> Json<serde_json::Value> {
    let records = state.journal.recent(query.limit.unwrap_or(100));
    Json(serde_json::json!({ "calls": records }))
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

fn journal_record(
    req: &ChatRequest,
    target: &RemoteTarget,
    result: &crate::Result<()>,
    terminal: Option<&ChatResponse>,
    started: Instant,
) -> CallRecord {
    let record = CallRecord::new(
        req.model.clone(),
        target.model.clone().unwrap_or_else(|| req.model.clone()),
        req.is_streaming(),
    )
    .took(started.elapsed());

    match result {
        Ok(()) => {
            let (prompt, eval) = terminal.map_or((0, 0), |t| (t.prompt_eval_count, t.eval_count));
            record.with_usage(prompt, eval)
        }
        Err(e @ BridgeError::RemoteApi { status, .. }) => {
            record.failed(CallOutcome::RemoteError, Some(*status), e.to_string())
        }
        Err(e @ (BridgeError::Cancelled | BridgeError::Sink { .. })) => {
            record.failed(CallOutcome::Cancelled, None, e.to_string())
        }
        Err(e) => record.failed(CallOutcome::Failed, None, e.to_string()),
    }
}

fn status_and_message(err: &BridgeError) -> (StatusCode, String) {
    match err {
        BridgeError::RemoteApi { status, .. } => (
            StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY),
            err.remote_message().unwrap_or_default(),
        ),
        BridgeError::Conversion { .. } => (StatusCode::BAD_REQUEST, err.to_string()),
        BridgeError::Config { .. } => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
        _ => (StatusCode::BAD_GATEWAY, err.to_string()),
    }
}

fn error_response(err: &BridgeError) -> Response {
    let (status, message) = status_and_message(err);
    error_body(status, message)
}

fn error_body(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}
