// src/services/transport.rs
//! HTTP transport to the inference backend's `/api/generate` endpoint.

use std::pin::Pin;

use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use reqwest::StatusCode;
use serde::Serialize;

use crate::error::StreamError;

/// Port the inference backend listens on.
pub const OLLAMA_PORT: u16 = 11434;

/// Port the relay server listens on by default.
pub const RELAY_PORT: u16 = 3001;

/// Raw response body chunks, in arrival order.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StreamError>> + Send>>;

/// One user submission. `port` records the relay the browser talked to and
/// is not used for addressing; the backend port belongs to the transport.
/// With `streaming` off the backend answers with a single JSON object, which
/// the decoder reads as one unterminated line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub host: String,
    pub port: u16,
    pub model: String,
    pub prompt: String,
    pub streaming: bool,
}

impl GenerationRequest {
    pub fn new(
        host: impl Into<String>,
        model: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: RELAY_PORT,
            model: model.into(),
            prompt: prompt.into(),
            streaming: true,
        }
    }
}

#[derive(Serialize)]
struct GenerateBody<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Clone, Debug)]
pub struct OllamaTransport {
    client: reqwest::Client,
    inference_port: u16,
}

impl Default for OllamaTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl OllamaTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            inference_port: OLLAMA_PORT,
        }
    }

    /// Point the transport at a backend on a non-standard port, e.g. a mock
    /// server in tests.
    pub fn with_inference_port(mut self, port: u16) -> Self {
        self.inference_port = port;
        self
    }

    pub fn generate_url(&self, host: &str) -> String {
        format!("http://{}:{}/api/generate", host.trim(), self.inference_port)
    }

    /// Open a generation and hand back its body chunks. Makes exactly one
    /// attempt.
    pub async fn open_stream(
        &self,
        request: &GenerationRequest,
    ) -> Result<ByteStream, StreamError> {
        let url = self.generate_url(&request.host);
        let body = GenerateBody {
            model: &request.model,
            prompt: &request.prompt,
            stream: request.streaming,
        };

        tracing::debug!(
            url = %url,
            model = %request.model,
            streaming = request.streaming,
            "opening generation stream"
        );

        let response = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|err| StreamError::Connection(error_chain(&err)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%status, body = %body, "backend rejected generation request");
            return Err(StreamError::Backend {
                status: status.as_u16(),
                body,
            });
        }

        if status == StatusCode::NO_CONTENT || response.content_length() == Some(0) {
            return Err(StreamError::StreamUnsupported);
        }

        let chunks = response
            .bytes_stream()
            .map_err(|err| StreamError::Interrupted(error_chain(&err)));
        Ok(Box::pin(chunks))
    }

    /// Non-streaming generation. The backend's JSON is returned untouched.
    pub async fn generate_once(
        &self,
        host: &str,
        model: &str,
        prompt: &str,
    ) -> Result<serde_json::Value, reqwest::Error> {
        let url = self.generate_url(host);
        let body = GenerateBody {
            model,
            prompt,
            stream: false,
        };

        tracing::debug!(url = %url, model = %model, "forwarding non-streaming generation");

        self.client
            .post(&url)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?
            .json::<serde_json::Value>()
            .await
    }
}

/// Flatten an error and its sources into one line. reqwest keeps the useful
/// part ("connection refused", "dns error") in the source chain.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        let text = inner.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = inner.source();
    }
    message
}
