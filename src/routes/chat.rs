use axum::{
    Json,
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::Stream;

use crate::{
    error::AppError,
    message::{ChatRequest, ChatStreamEvent, UiDefaults},
    services::{
        chatbot::spawn_generation,
        session_manager::Message,
        transport::GenerationRequest,
    },
    state::SharedState,
};

pub async fn chat_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, AppError> {
    let host = payload.host.trim();
    let model = payload.model.trim();
    if host.is_empty() || model.is_empty() {
        return Err(AppError::BadRequest(
            "Host and model must not be empty".to_string(),
        ));
    }

    let session_id = match &payload.session_id {
        Some(s) if !s.trim().is_empty() => state.sessions.ensure_session(s).await,
        _ => state.sessions.create_session().await,
    };

    // Rejects blank prompts and sessions that are still generating.
    state.sessions.submit(&session_id, &payload.prompt).await?;

    let request = GenerationRequest::new(host, model, payload.prompt.as_str());
    let mut events = spawn_generation(
        state.sessions.clone(),
        state.transport.clone(),
        session_id.clone(),
        request,
    );

    let stream = async_stream::stream! {
        yield sse_event(&ChatStreamEvent::Session { session_id });
        while let Some(event) = events.recv().await {
            let terminal = event.is_terminal();
            yield sse_event(&event);
            if terminal {
                break;
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn sse_event(event: &ChatStreamEvent) -> Result<Event, axum::Error> {
    Event::default().event(event.name()).json_data(event)
}

pub async fn history_handler(
    State(state): State<SharedState>,
    Path(session_id): Path<String>,
) -> Result<Json<Vec<Message>>, AppError> {
    state
        .sessions
        .get_history(&session_id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("unknown session {session_id}")))
}

pub async fn config_handler(State(state): State<SharedState>) -> Json<UiDefaults> {
    Json(UiDefaults {
        host: state.config.default_host.clone(),
        model: state.config.default_model.clone(),
    })
}
