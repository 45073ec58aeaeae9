// src/config.rs
use std::{str::FromStr, time::Duration};

use thiserror::Error;

use crate::services::transport::{OLLAMA_PORT, RELAY_PORT};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub bind_addr: String,
    pub ollama_port: u16,
    pub default_host: String,
    pub default_model: String,
    pub static_dir: String,
    pub session_ttl: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: format!("0.0.0.0:{RELAY_PORT}"),
            ollama_port: OLLAMA_PORT,
            default_host: "192.168.1.100".to_string(),
            default_model: "qwen2.5-coder:0.5b".to_string(),
            static_dir: "public".to_string(),
            session_ttl: Duration::from_secs(3600),
        }
    }
}

impl Config {
    /// Read settings from the environment; `main` loads `.env` first. Unset
    /// variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            bind_addr: parse_value(
                "BIND_ADDR",
                dotenvy::var("BIND_ADDR").ok(),
                defaults.bind_addr,
            )?,
            ollama_port: parse_value(
                "OLLAMA_PORT",
                dotenvy::var("OLLAMA_PORT").ok(),
                defaults.ollama_port,
            )?,
            default_host: parse_value(
                "DEFAULT_OLLAMA_HOST",
                dotenvy::var("DEFAULT_OLLAMA_HOST").ok(),
                defaults.default_host,
            )?,
            default_model: parse_value(
                "DEFAULT_MODEL",
                dotenvy::var("DEFAULT_MODEL").ok(),
                defaults.default_model,
            )?,
            static_dir: parse_value(
                "STATIC_DIR",
                dotenvy::var("STATIC_DIR").ok(),
                defaults.static_dir,
            )?,
            session_ttl: Duration::from_secs(parse_value(
                "SESSION_TTL_SECS",
                dotenvy::var("SESSION_TTL_SECS").ok(),
                defaults.session_ttl.as_secs(),
            )?),
        })
    }
}

fn parse_value<T: FromStr>(
    key: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        Some(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        _ => Ok(default),
    }
}
