//! Error types for the E2E harness

use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Server failed to start: {0}")]
    ServerStartup(String),

    #[error("casperjs not found. Install with: npm install -g casperjs")]
    CasperNotFound,

    #[error("casperjs error: {0}")]
    Casper(String),

    #[error("Could not reach \"{0}\"")]
    UrlUnreachable(String),

    #[error("`{command}` failed: {status}")]
    ExtensionToggle { command: String, status: String },

    #[error("Credential cache copy failed: {0}")]
    CredentialCopy(String),

    #[error("Capture buffer read while reader threads are still active")]
    CaptureActive,

    #[error("No home directory for the current user")]
    NoHomeDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type E2eResult<T> = Result<T, E2eError>;
