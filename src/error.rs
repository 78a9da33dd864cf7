//! Error handling and custom error types
//!
//! Provides unified error handling across the service using thiserror.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("AI provider error: {0}")]
    AiProvider(String),

    #[error("Job provider error: {0}")]
    JobProvider(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
