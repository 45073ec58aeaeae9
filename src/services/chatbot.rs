// src/services/chatbot.rs
//! Drives one generation: transport, decoder and the session transcript.

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;

use crate::{
    error::StreamError,
    message::ChatStreamEvent,
    services::{
        decoder::accumulate,
        session_manager::{ConversationEvent, SessionManager},
        transport::{GenerationRequest, OllamaTransport},
    },
};

const EVENT_BUFFER: usize = 64;

/// Open the backend stream and return the accumulated-answer snapshots.
/// Open failures (connection, unsupported body, backend status) are returned
/// before any snapshot exists.
pub async fn stream_answer(
    transport: &OllamaTransport,
    request: &GenerationRequest,
) -> Result<impl Stream<Item = Result<String, StreamError>> + Send + 'static, StreamError> {
    let chunks = transport.open_stream(request).await?;
    Ok(accumulate(chunks))
}

/// Run a generation to completion, emitting conversation events in order.
/// A dropped receiver does not stop the generation.
pub async fn run_generation(
    transport: OllamaTransport,
    request: GenerationRequest,
    tx: mpsc::Sender<ConversationEvent>,
) {
    let snapshots = match stream_answer(&transport, &request).await {
        Ok(snapshots) => snapshots,
        Err(err) => {
            tracing::warn!(host = %request.host, error = %err, "could not open generation stream");
            emit(&tx, ConversationEvent::ConnectFailed(err.to_string())).await;
            return;
        }
    };

    emit(&tx, ConversationEvent::AnswerOpened).await;

    let mut snapshots = std::pin::pin!(snapshots);
    while let Some(item) = snapshots.next().await {
        match item {
            Ok(snapshot) => emit(&tx, ConversationEvent::Snapshot(snapshot)).await,
            Err(err) => {
                emit(&tx, ConversationEvent::Interrupted(err.to_string())).await;
                return;
            }
        }
    }

    emit(&tx, ConversationEvent::Completed).await;
}

async fn emit(tx: &mpsc::Sender<ConversationEvent>, event: ConversationEvent) {
    if tx.send(event).await.is_err() {
        tracing::debug!("conversation event receiver dropped");
    }
}

/// Apply each event to the session and forward what the UI should see.
/// This task is the only writer of the session's active answer.
pub async fn apply_events(
    sessions: SessionManager,
    session_id: String,
    mut rx: mpsc::Receiver<ConversationEvent>,
    ui: mpsc::Sender<ChatStreamEvent>,
) {
    while let Some(event) = rx.recv().await {
        let touched = match sessions.apply(&session_id, event.clone()).await {
            Ok(touched) => touched,
            Err(err) => {
                tracing::error!(
                    session_id = %session_id,
                    error = %err,
                    "failed to apply conversation event"
                );
                continue;
            }
        };

        let content = touched.map(|message| message.content).unwrap_or_default();
        if let Some(ui_event) = ui_event(&event, content) {
            // The browser may be gone; the transcript is still updated.
            let _ = ui.send(ui_event).await;
        }
    }
}

fn ui_event(event: &ConversationEvent, content: String) -> Option<ChatStreamEvent> {
    match event {
        ConversationEvent::Submitted(_) | ConversationEvent::AnswerOpened => None,
        ConversationEvent::Snapshot(_) => Some(ChatStreamEvent::Snapshot { content }),
        ConversationEvent::Completed => Some(ChatStreamEvent::Done { content }),
        ConversationEvent::ConnectFailed(_) | ConversationEvent::Interrupted(_) => {
            Some(ChatStreamEvent::Error { content })
        }
    }
}

/// Start a generation for a session whose prompt was already submitted.
/// Returns the events meant for the UI.
pub fn spawn_generation(
    sessions: SessionManager,
    transport: OllamaTransport,
    session_id: String,
    request: GenerationRequest,
) -> mpsc::Receiver<ChatStreamEvent> {
    let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
    let (ui_tx, ui_rx) = mpsc::channel(EVENT_BUFFER);

    tracing::info!(
        session_id = %session_id,
        host = %request.host,
        model = %request.model,
        "starting generation"
    );

    tokio::spawn(run_generation(transport, request, event_tx));
    tokio::spawn(apply_events(sessions, session_id, event_rx, ui_tx));

    ui_rx
}
