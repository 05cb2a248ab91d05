//! Per-subsystem error enums.
//!
//! Each subsystem gets its own `thiserror` enum rather than one global
//! error type, so callers match on exactly the variants that can occur
//! at that boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RtpError {
    #[error("packet too short: {0} bytes")]
    TooShort(usize),

    #[error("unsupported RTP version: {0}")]
    UnsupportedVersion(u8),

    #[error("header size {header} exceeds packet length {len}")]
    HeaderExceedsLength { header: usize, len: usize },
}

#[derive(Debug, Error)]
pub enum VadError {
    #[error("model not loaded: {0}")]
    ModelNotLoaded(String),

    #[error("invalid audio: {0}")]
    InvalidAudio(String),
}

#[derive(Debug, Error)]
pub enum SttError {
    #[error("provider request failed: {0}")]
    ProviderFailed(String),

    #[error("session closed")]
    SessionClosed,

    #[error("not initialized")]
    NotInitialized,

    #[error("invalid audio: {0}")]
    InvalidAudio(String),
}

#[derive(Debug, Error)]
pub enum PortPoolError {
    #[error("port pool exhausted")]
    Exhausted,
}

#[derive(Debug, Error)]
pub enum WsManagerError {
    #[error("queue is shut down")]
    ShutDown,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(String),

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("no outbound WebSocket URL configured")]
    NoWebSocketUrl,
}
