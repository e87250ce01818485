use crate::modes::Mode;

/// Missing or unusable credential. Permanent until configuration changes
/// and the provider is re-initialized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("API key is missing. Set GEMINI_API_KEY (or API_KEY) and restart.")]
    MissingApiKey,

    #[error("API key is invalid: {0}")]
    InvalidApiKey(String),

    #[error("API key was rejected by the service: {0}")]
    Rejected(String),
}

/// A session could not be constructed for one mode. Local to that attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{mode} cannot combine search grounding with structured output")]
    UnsupportedCapabilities { mode: Mode },
}

/// Terminal failure of one streamed turn. The session stays usable.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("network error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("credential rejected: {0}")]
    Credential(String),

    #[error("response blocked: {0}")]
    Blocked(String),

    #[error("malformed stream payload: {0}")]
    Decode(String),

    #[error("session is bound to {session} but the turn targets {requested}")]
    ModeMismatch { session: Mode, requested: Mode },
}

impl StreamError {
    pub fn is_credential(&self) -> bool {
        matches!(self, StreamError::Credential(_))
    }
}

pub type StreamResult<T> = Result<T, StreamError>;
