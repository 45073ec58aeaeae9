// src/state.rs
use std::sync::Arc;

use crate::config::Config;
use crate::services::session_manager::SessionManager;
use crate::services::transport::OllamaTransport;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub sessions: SessionManager,
    pub transport: OllamaTransport,
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            sessions: SessionManager::new(config.session_ttl),
            transport: OllamaTransport::new().with_inference_port(config.ollama_port),
            config,
        }
    }
}
