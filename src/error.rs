// Error type shared by the library and both binaries

use thiserror::Error;

#[derive(Error, Debug)]
pub enum UploaderError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Metadata generation error: {0}")]
    Metadata(String),

    #[error("Schedule error: {0}")]
    Schedule(String),

    #[error("Keychain error: {0}")]
    Keychain(String),

    #[error("Video probe error: {0}")]
    Probe(String),

    #[error("{0} not found")]
    NotFound(String),
}

impl UploaderError {
    pub fn api(status: u16, body: impl Into<String>) -> Self {
        UploaderError::Api {
            status,
            body: body.into(),
        }
    }

    /// Server-side and transport failures are worth retrying; client errors are not.
    pub fn is_transient(&self) -> bool {
        match self {
            UploaderError::Http(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            UploaderError::Api { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, UploaderError>;
