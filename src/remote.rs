//! Outbound calls to the remote chat API.
//!
//! [`RemoteClient::send`] is the one entry point the rest of the host uses: it
//! translates the native request, makes a single HTTP call and feeds the
//! translated answer into a [`ResponseSink`].

use std::time::Duration;

use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::Url;
use tokio_util::sync::CancellationToken;

use crate::error::{BridgeError, Result};
use crate::sink::ResponseSink;
use crate::translate::chat_types::ChatRequest;
use crate::translate::openai_types::ChatCompletionResponse;
use crate::translate::request::chat_to_openai;
use crate::translate::response::openai_to_chat;
use crate::translate::streaming::transcode_stream;

/// Path every OpenAI-compatible chat endpoint lives under.
pub const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// Path of the native chat endpoint, used for passthrough remotes.
pub const NATIVE_CHAT_PATH: &str = "/api/chat";

/// Ceiling for one call, long enough for slow reasoning models.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Where a call goes and how it authenticates.
#[derive(Debug, Clone, Default)]
pub struct RemoteTarget {
    pub base_url: String,
    /// Bearer credential; empty means no `Authorization` header.
    pub api_key: String,
    /// Remote model id. Falls back to the request's own model.
    pub model: Option<String>,
}

impl RemoteTarget {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: None,
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Raw answer of a native passthrough call.
pub struct PassthroughResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: reqwest::Response,
}

/// Shared HTTP client for remote calls. Cheap to clone; clones share one
/// connection pool.
#[derive(Debug, Clone)]
pub struct RemoteClient {
    http: reqwest::Client,
}

impl RemoteClient {
    /// # Errors
    /// Returns `BridgeError::Http` if the TLS backend cannot be initialised.
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { http })
    }

    /// Forward `req` to the OpenAI-compatible remote in `target`, delivering
    /// the translated responses into `sink`.
    ///
    /// Streaming requests deliver zero or more partial responses followed by
    /// one terminal response; non-streaming requests deliver exactly one.
    ///
    /// # Errors
    /// `Config` for an unusable base URL, `Conversion` if the request cannot
    /// be translated, `RemoteApi` for non-2xx answers, `StreamRead` or
    /// `Http` for transport failures, `EmptyChoice` for an answer without
    /// choices, `Cancelled` if `cancel` fires first, or whatever the sink
    /// returned.
    pub async fn send<K>(
        &self,
        cancel: &CancellationToken,
        req: &ChatRequest,
        target: &RemoteTarget,
        sink: &mut K,
    ) -> Result<()>
    where
        K: ResponseSink + ?Sized,
    {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::debug!(model = %req.model, "remote call cancelled");
                Err(BridgeError::Cancelled)
            }
            result = self.forward(req, target, sink) => result,
        }
    }

    async fn forward<K>(&self, req: &ChatRequest, target: &RemoteTarget, sink: &mut K) -> Result<()>
    where
        K: ResponseSink + ?Sized,
    {
        let url = completions_url(&target.base_url)?;
        let remote_model = target.model.as_deref().unwrap_or(&req.model);
        let wire = chat_to_openai(req, remote_model)?;
        let body = serde_json::to_vec(&wire)
            .map_err(|e| BridgeError::conversion(format!("failed to encode request: {e}")))?;

        tracing::debug!(
            url = %url,
            model = %wire.model,
            stream = wire.stream,
            messages = wire.messages.len(),
            "forwarding chat request"
        );

        let mut builder = self
            .http
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        if !target.api_key.is_empty() {
            builder = builder.bearer_auth(&target.api_key);
        }

        let response = builder.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    tracing::warn!(status = status.as_u16(), error = %e, "failed to read error body");
                    String::new()
                }
            };
            tracing::warn!(status = status.as_u16(), "remote returned an error");
            return Err(BridgeError::RemoteApi {
                status: status.as_u16(),
                body,
            });
        }

        if wire.stream {
            return transcode_stream(response.bytes_stream(), &req.model, sink).await;
        }

        let body = response.bytes().await?;
        let completion: ChatCompletionResponse = serde_json::from_slice(&body)?;
        let translated = openai_to_chat(&completion, &req.model)?;
        sink.deliver(translated).await
    }

    /// Forward an already-native request body unchanged to `<base>/api/chat`,
    /// for remotes that speak the native protocol themselves.
    ///
    /// # Errors
    /// `Config` for an unusable base URL, `Http` if the call fails, or
    /// `Cancelled` if `cancel` fires before the response headers arrive.
    pub async fn passthrough(
        &self,
        cancel: &CancellationToken,
        body: Bytes,
        target: &RemoteTarget,
    ) -> Result<PassthroughResponse> {
        let url = endpoint_url(&target.base_url, NATIVE_CHAT_PATH)?;
        tracing::debug!(url = %url, "passthrough chat request");

        let mut builder = self
            .http
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        if !target.api_key.is_empty() {
            builder = builder.bearer_auth(&target.api_key);
        }

        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(BridgeError::Cancelled),
            response = builder.send() => response?,
        };

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok(PassthroughResponse {
            status: response.status().as_u16(),
            content_type,
            body: response,
        })
    }
}

/// Resolve the chat-completions URL beneath `base_url`.
///
/// # Errors
/// Returns `BridgeError::Config` if `base_url` is not an absolute URL.
pub fn completions_url(base_url: &str) -> Result<Url> {
    endpoint_url(base_url, CHAT_COMPLETIONS_PATH)
}

fn endpoint_url(base_url: &str, suffix: &str) -> Result<Url> {
    let mut url = Url::parse(base_url)
        .map_err(|e| BridgeError::config(format!("invalid remote base URL '{base_url}': {e}")))?;

    let path = url.path().trim_end_matches('/').to_string();
    if !path.ends_with(suffix) {
        url.set_path(&format!("{path}{suffix}"));
    }
    Ok(url)
}
