//! Error handling for the application

use std::time::Duration;
use thiserror::Error;

/// Configuration errors - always fail fast, before any network call
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Unsupported provider type: {0}")]
    UnsupportedProvider(String),

    #[error("No endpoint configured for provider {0}")]
    MissingEndpoint(String),

    #[error("Pool set is empty")]
    EmptyPoolSet,

    #[error("Increment divisor must be positive")]
    InvalidDivisor,

    #[error("Minimum active pool count must be positive")]
    InvalidMinActivePools,

    #[error("Allocation threshold must be in 1..=10000 bps, got {0}")]
    InvalidThreshold(u32),

    #[error("Invalid pool descriptor {address}: {reason}")]
    InvalidPool { address: String, reason: String },
}

/// JSON-RPC and decoding errors
#[derive(Error, Debug, Clone)]
pub enum RpcError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("RPC error {code}: {message}")]
    Remote { code: i64, message: String },

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("ABI decode failed: {0}")]
    Decode(String),
}

impl RpcError {
    /// Transient failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            RpcError::Transport(_) => true,
            RpcError::Status(status) => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for RpcError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => RpcError::Status(status.as_u16()),
            None => RpcError::Transport(err.to_string()),
        }
    }
}

/// Quote errors - disqualify one pool for one round
#[derive(Error, Debug, Clone)]
pub enum QuoteError {
    #[error("Pool {0} is not synced")]
    NotSynced(String),

    #[error("Rate query failed: {0}")]
    Rpc(#[from] RpcError),

    #[error("Quote timed out after {0:?}")]
    Timeout(Duration),

    #[error("Quoted rate is not finite: {0}")]
    NonFinite(f64),
}

/// Pool-related errors
#[derive(Error, Debug, Clone)]
pub enum PoolError {
    #[error("Pool {address} is bound to {expected} but got a {actual} connection")]
    ConnectionMismatch {
        address: String,
        expected: String,
        actual: String,
    },

    #[error("Pool {address} initialization failed: {source}")]
    InitFailed { address: String, source: RpcError },

    #[error("Pool {address} sync failed: {source}")]
    SyncFailed { address: String, source: RpcError },

    #[error("Pool {0} must be initialized before sync")]
    NotInitialized(String),
}

/// Allocation run errors surfaced to the caller
#[derive(Error, Debug, Clone)]
pub enum AllocationError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Allocation invariant violated: {0}")]
    InvariantViolated(String),
}

/// General application error
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    ConfigError(#[from] ConfigError),

    #[error("Blockchain error: {0}")]
    BlockchainError(#[from] RpcError),

    #[error("Allocation error: {0}")]
    AllocationError(#[from] AllocationError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}
