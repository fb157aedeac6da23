//! Error types for listclean-rs.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("queue store error: {0}")]
    Store(#[from] redis::RedisError),

    #[error("queue store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("invalid proxy endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Why a single verification attempt did not produce a verdict.
///
/// These never abort a worker; the item is classified as rejected.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("connection failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out after {0} ms")]
    Timeout(u64),

    #[error("dns lookup failed: {0}")]
    Dns(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("proxy error: {0}")]
    Proxy(String),

    #[error("invalid item: {0}")]
    InvalidItem(String),
}

impl VerifyError {
    /// Short label used as a metric attribute.
    pub fn kind(&self) -> &'static str {
        match self {
            VerifyError::Io(_) => "io",
            VerifyError::Timeout(_) => "timeout",
            VerifyError::Dns(_) => "dns",
            VerifyError::Protocol(_) => "protocol",
            VerifyError::Proxy(_) => "proxy",
            VerifyError::InvalidItem(_) => "invalid_item",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
