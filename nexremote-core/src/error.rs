//! Error taxonomy for the NexRemote connection and streaming engine.
//!
//! Mirrors the propagation policy of spec §7: `Protocol`/`Dispatch`/`Capture`
//! errors are recovered locally by callers (log and continue), `Auth` and
//! `Approval` terminate the owning session, `Transport` errors terminate only
//! the affected stream, and `Persistence` errors are fatal at startup but
//! logged-and-absent at runtime.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProtocolError>;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("certificate error: {0}")]
    Certificate(String),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("frame too large: {size} bytes exceeds limit of {limit}")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("authentication timed out")]
    AuthTimeout,

    #[error("approval rejected")]
    ApprovalRejected,

    #[error("approval timed out")]
    ApprovalTimeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("capture error: {0}")]
    Capture(String),

    #[error("dispatch error: {0}")]
    Dispatch(String),

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl ProtocolError {
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn capture(msg: impl Into<String>) -> Self {
        Self::Capture(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Whether this error, seen on a session's control channel, should
    /// terminate the whole session rather than just the message/stream that
    /// produced it (spec §7 propagation policy).
    pub fn terminates_session(&self) -> bool {
        matches!(
            self,
            ProtocolError::Auth(_)
                | ProtocolError::AuthTimeout
                | ProtocolError::ApprovalRejected
                | ProtocolError::ApprovalTimeout
        )
    }
}
