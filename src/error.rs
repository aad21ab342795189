//! Error types for qosagent.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid work for {name}: {reason}")]
    InvalidWork { name: String, reason: String },

    #[error("no tokio runtime to run work for {name}")]
    NoRuntime { name: String },

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
