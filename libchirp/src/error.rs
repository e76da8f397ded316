//! Error types for Chirp

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ChirpError>;

#[derive(Error, Debug)]
pub enum ChirpError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChirpError {
    /// Returns the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            ChirpError::Config(_) => 2,
            ChirpError::Auth(_) => 3,
            ChirpError::Platform(_) => 1,
            ChirpError::Generation(_) => 1,
            ChirpError::Io(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required configuration: {}", .0.join(", "))]
    Missing(Vec<String>),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("No refresh token available; run the authorization flow first")]
    MissingRefreshToken,

    #[error("Token endpoint rejected the request (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Token endpoint unreachable: {0}")]
    Transport(String),

    #[error("Malformed token response: {0}")]
    MalformedResponse(String),

    #[error("Authorization flow failed: {0}")]
    Authorization(String),

    #[error("IO error during authorization: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of a single platform call.
///
/// Every variant is recoverable from the main loop's point of view: the
/// action is logged as failed and retried at its next natural interval.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Rate limited{}", .retry_after.map(|r| format!(" (resets at {})", r)).unwrap_or_default())]
    RateLimited { retry_after: Option<i64> },

    #[error("Rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Transport failure: {0}")]
    Transport(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenError {
    #[error("Generation service unreachable: {0}")]
    Transport(String),

    #[error("Generation service rejected the request (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Malformed completion response: {0}")]
    Malformed(String),

    #[error("Completion was empty")]
    EmptyCompletion,
}
