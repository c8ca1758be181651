//! Normalized error model.
//!
//! Every failure that crosses the data-layer boundary is one of these. Callers
//! (and the notifier) only ever read `message()`; `kind()` is there for code
//! that needs to branch, e.g. to skip retries on validation failures.

use thiserror::Error;

/// Result type used across the client.
pub type ApiResult<T> = Result<T, ApiError>;

/// Classification of an [`ApiError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Transport,
    Client,
    Server,
    Precondition,
    Realtime,
    Decode,
    Local,
}

/// Single error shape produced regardless of the underlying failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The request never produced a response (connect, timeout, body read).
    #[error("{0}")]
    Transport(String),

    /// The server rejected the request (4xx: validation, permission, not found).
    #[error("{message}")]
    Client { status: u16, message: String },

    /// The server failed (5xx).
    #[error("{message}")]
    Server { status: u16, message: String },

    /// A local requirement was not met; no request was made.
    #[error("{0}")]
    Precondition(String),

    /// The realtime connection is missing or failed.
    #[error("{0}")]
    Realtime(String),

    /// A successful response did not have the expected shape.
    #[error("{0}")]
    Decode(String),

    /// A local step after the request failed (writing a file, cache state).
    #[error("{0}")]
    Local(String),
}

impl ApiError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    pub fn realtime(msg: impl Into<String>) -> Self {
        Self::Realtime(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn local(msg: impl Into<String>) -> Self {
        Self::Local(msg.into())
    }

    /// Build the error for a non-2xx HTTP status.
    ///
    /// 4xx maps to `Client`; every other status maps to `Server`.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if (400..500).contains(&status) {
            Self::Client { status, message }
        } else {
            Self::Server { status, message }
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_) => ErrorKind::Transport,
            Self::Client { .. } => ErrorKind::Client,
            Self::Server { .. } => ErrorKind::Server,
            Self::Precondition(_) => ErrorKind::Precondition,
            Self::Realtime(_) => ErrorKind::Realtime,
            Self::Decode(_) => ErrorKind::Decode,
            Self::Local(_) => ErrorKind::Local,
        }
    }

    /// The human-readable message shown to the user.
    pub fn message(&self) -> &str {
        match self {
            Self::Transport(m)
            | Self::Precondition(m)
            | Self::Realtime(m)
            | Self::Decode(m)
            | Self::Local(m) => m,
            Self::Client { message, .. } | Self::Server { message, .. } => message,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Client { status, .. } | Self::Server { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether repeating the same request could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transport | ErrorKind::Server)
    }
}
