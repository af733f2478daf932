use std::sync::Arc;

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum MbError {
    #[error("I/O Error: {0}")]
    Io(#[from] Arc<std::io::Error>),

    #[error("HTTP Request Error: {0}")]
    Http(#[from] Arc<reqwest::Error>),

    #[error("JSON Parsing Error: {0}")]
    Json(#[from] Arc<serde_json::Error>),

    #[error("Semantic Versioning Error: {0}")]
    SemVer(#[from] Arc<semver::Error>),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Resource Not Found: {0}")]
    NotFound(String),

    #[error("Installation Error: {0}")]
    InstallError(String),

    #[error("Link Conflict: {0} exists and is not a symlink")]
    LinkConflict(String),

    #[error("DownloadError: Failed to download '{0}' from '{1}': {2}")]
    DownloadError(String, String, String),

    #[error("HttpError: {0}")]
    HttpError(String),

    #[error("Checksum Error: {0}")]
    ChecksumError(String),

    #[error("Validation Error: {0}")]
    ValidationError(String),

    #[error("Unsatisfied Requirement: {0}")]
    RequirementError(String),

    #[error("Failed to execute command: {0}")]
    CommandExecError(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Server exited before it became ready: {0}")]
    ServerExited(String),

    #[error("Smoke test failed during {stage}: {source}")]
    SmokeTest {
        stage: String,
        #[source]
        source: Box<MbError>,
    },

    #[error("Generic Error: {0}")]
    Generic(String),
}

impl MbError {
    /// Unwraps a `SmokeTest` wrapper so callers can match on the cause.
    pub fn root_cause(&self) -> &MbError {
        match self {
            MbError::SmokeTest { source, .. } => source.root_cause(),
            other => other,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.root_cause(), MbError::Timeout(_))
    }
}

impl From<std::io::Error> for MbError {
    fn from(err: std::io::Error) -> Self {
        MbError::Io(Arc::new(err))
    }
}

impl From<reqwest::Error> for MbError {
    fn from(err: reqwest::Error) -> Self {
        MbError::Http(Arc::new(err))
    }
}

impl From<serde_json::Error> for MbError {
    fn from(err: serde_json::Error) -> Self {
        MbError::Json(Arc::new(err))
    }
}

impl From<semver::Error> for MbError {
    fn from(err: semver::Error) -> Self {
        MbError::SemVer(Arc::new(err))
    }
}

pub type Result<T> = std::result::Result<T, MbError>;
