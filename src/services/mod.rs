pub mod chatbot;
pub mod decoder;
pub mod session_manager;
pub mod transport;
