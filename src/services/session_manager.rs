// src/services/session_manager.rs
use std::{
    collections::HashMap,
    fmt::Debug,
    sync::Arc,
    time::{Duration, Instant},
};

use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::AppError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Model,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

/// Everything that can happen to a conversation. The transcript is only ever
/// changed by applying one of these.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConversationEvent {
    Submitted(String),
    AnswerOpened,
    Snapshot(String),
    Completed,
    ConnectFailed(String),
    Interrupted(String),
}

pub fn connect_error_message(detail: &str) -> String {
    format!(
        "Error: Could not connect to the server. Please check the IP address and ensure the server is running. ({detail})"
    )
}

pub fn interruption_note(detail: &str) -> String {
    format!("\n\n[Error: the response stream was interrupted ({detail})]")
}

/// Transcript plus the generation flag. `answer` indexes the model message
/// currently being written, if any.
#[derive(Clone, Debug, Default)]
pub struct Conversation {
    messages: Vec<Message>,
    generating: bool,
    answer: Option<usize>,
}

impl Conversation {
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_active(&self) -> bool {
        self.generating
    }

    /// Apply one event and return the message it touched.
    pub fn apply(&mut self, event: ConversationEvent) -> Result<Option<&Message>, AppError> {
        match event {
            ConversationEvent::Submitted(prompt) => {
                if self.generating {
                    return Err(AppError::Busy);
                }
                if prompt.trim().is_empty() {
                    return Err(AppError::BadRequest("Message cannot be empty".to_string()));
                }
                self.generating = true;
                Ok(Some(self.push(MessageRole::User, prompt)))
            }
            ConversationEvent::AnswerOpened => {
                if !self.generating || self.answer.is_some() {
                    tracing::warn!("answer opened outside of a generation");
                    return Ok(None);
                }
                self.answer = Some(self.messages.len());
                Ok(Some(self.push(MessageRole::Model, String::new())))
            }
            ConversationEvent::Snapshot(text) => match self.answer {
                Some(index) => {
                    let message = &mut self.messages[index];
                    message.content = text;
                    Ok(Some(&*message))
                }
                None => {
                    tracing::warn!("snapshot without an open answer");
                    Ok(None)
                }
            },
            ConversationEvent::Completed => {
                self.generating = false;
                Ok(self.answer.take().map(|index| &self.messages[index]))
            }
            ConversationEvent::ConnectFailed(detail) => {
                self.generating = false;
                self.answer = None;
                Ok(Some(self.push(MessageRole::Model, connect_error_message(&detail))))
            }
            ConversationEvent::Interrupted(detail) => {
                self.generating = false;
                match self.answer.take() {
                    Some(index) => {
                        let message = &mut self.messages[index];
                        message.content.push_str(&interruption_note(&detail));
                        Ok(Some(&*message))
                    }
                    None => Ok(Some(self.push(MessageRole::Model, connect_error_message(&detail)))),
                }
            }
        }
    }

    fn push(&mut self, role: MessageRole, content: String) -> &Message {
        self.messages.push(Message { role, content });
        &self.messages[self.messages.len() - 1]
    }
}

#[derive(Clone, Debug)]
pub struct Session {
    pub id: String,
    pub conversation: Conversation,
    pub last_active: Instant,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Instant::now();
        Self { id: id.into(), conversation: Conversation::default(), last_active: now }
    }
}

#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<RwLock<HashMap<String, Session>>>,
    ttl: Duration,
}

impl Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl SessionManager {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    // Create a fresh session and return its id.
    pub async fn create_session(&self) -> String {
        let id = Uuid::new_v4().to_string();
        let session = Session::new(id.clone());

        let mut guard = self.inner.write().await;
        guard.insert(id.clone(), session);
        id
    }

    // Ensure there's a session with this id.
    pub async fn ensure_session(&self, id: &str) -> String {
        {
            let guard = self.inner.read().await;
            if guard.contains_key(id) {
                return id.to_string();
            }
        }
        let mut guard = self.inner.write().await;
        guard
            .entry(id.to_string())
            .or_insert_with(|| Session::new(id.to_string()));
        id.to_string()
    }

    /// Record a user prompt and mark the session as generating. Fails with
    /// `AppError::Busy` while a previous answer is still streaming.
    pub async fn submit(&self, session_id: &str, prompt: &str) -> Result<(), AppError> {
        self.apply(session_id, ConversationEvent::Submitted(prompt.to_string()))
            .await
            .map(|_| ())
    }

    /// Apply an event to a session's conversation and touch last_active.
    /// Returns a copy of the message the event touched.
    pub async fn apply(
        &self,
        session_id: &str,
        event: ConversationEvent,
    ) -> Result<Option<Message>, AppError> {
        let mut guard = self.inner.write().await;
        let session = guard
            .get_mut(session_id)
            .ok_or_else(|| AppError::NotFound(format!("unknown session {session_id}")))?;
        session.last_active = Instant::now();
        session.conversation.apply(event).map(|message| message.cloned())
    }

    /// Get a copy of the session history
    pub async fn get_history(&self, session_id: &str) -> Option<Vec<Message>> {
        let guard = self.inner.read().await;
        guard
            .get(session_id)
            .map(|s| s.conversation.messages().to_vec())
    }

    pub async fn is_active(&self, session_id: &str) -> bool {
        let guard = self.inner.read().await;
        guard
            .get(session_id)
            .is_some_and(|s| s.conversation.is_active())
    }

    /// Remove a session by id
    pub async fn remove_session(&self, session_id: &str) -> bool {
        let mut guard = self.inner.write().await;
        guard.remove(session_id).is_some()
    }

    /// Remove sessions idle longer than ttl. Sessions with a generation in
    /// flight are kept. Returns number removed.
    pub async fn purge_expired(&self) -> usize {
        let mut guard = self.inner.write().await;
        let now = Instant::now();
        let before = guard.len();
        guard.retain(|_, s| {
            s.conversation.is_active() || now.duration_since(s.last_active) < self.ttl
        });
        before - guard.len()
    }

    /// Number of sessions
    pub async fn len(&self) -> usize {
        let guard = self.inner.read().await;
        guard.len()
    }

    /// List session ids
    pub async fn list_session_ids(&self) -> Vec<String> {
        let guard = self.inner.read().await;
        guard.keys().cloned().collect()
    }
}
