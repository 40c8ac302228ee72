use std::time::Duration;

use thiserror::Error;
use vansh_core::{ValidationError, WireError};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
    /// The session is missing or was rejected; the stored token has been cleared.
    #[error("not signed in or session expired")]
    Unauthorized,
    #[error("server returned {status}: {message}")]
    Server { status: u16, message: String },
    #[error("rate limited (429)")]
    RateLimited { retry_after: Option<Duration> },
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    /// Transport-level failures worth a transient notification and a retry.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::RateLimited { .. } => true,
            Self::Server { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum PushError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("protocol error: {0}")]
    Wire(#[from] WireError),
    #[error("server refused the connection: {0}")]
    Rejected(String),
    #[error("connection closed by server")]
    Closed,
    #[error("no heartbeat from server within {0:?}")]
    HeartbeatTimeout(Duration),
    #[error("handshake timed out")]
    HandshakeTimeout,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("session storage error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt session file: {0}")]
    Json(#[from] serde_json::Error),
}
