// src/message.rs
use serde::{Deserialize, Serialize};

/// Body of the browser's streaming chat request.
#[derive(Debug, Deserialize, Serialize)]
pub struct ChatRequest {
    pub session_id: Option<String>,
    pub host: String,
    pub model: String,
    pub prompt: String,
}

/// Body of the non-streaming relay request.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayRequest {
    pub ip_address: String,
    pub model_name: String,
    pub prompt: String,
}

/// What the browser receives over the event stream. `content` is always the
/// full text of the model message, never a delta.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ChatStreamEvent {
    Session { session_id: String },
    Snapshot { content: String },
    Done { content: String },
    Error { content: String },
}

impl ChatStreamEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ChatStreamEvent::Session { .. } => "session",
            ChatStreamEvent::Snapshot { .. } => "snapshot",
            ChatStreamEvent::Done { .. } => "done",
            ChatStreamEvent::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ChatStreamEvent::Done { .. } | ChatStreamEvent::Error { .. })
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct UiDefaults {
    pub host: String,
    pub model: String,
}
