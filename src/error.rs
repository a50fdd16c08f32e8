use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NarrationError {
    /// The synthesis service answered with a non-success status or could not be reached.
    #[error("{message}")]
    Synthesis {
        message: String,
        status_code: Option<u16>,
    },

    #[error("Audio playback failed: {0}")]
    Playback(String),

    #[error("Narration engine is no longer running")]
    EngineClosed,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl NarrationError {
    pub fn synthesis(message: impl Into<String>) -> Self {
        Self::Synthesis {
            message: message.into(),
            status_code: None,
        }
    }

    pub fn synthesis_status(status_code: u16, message: impl Into<String>) -> Self {
        Self::Synthesis {
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    /// Whether a retry could plausibly succeed (transport failures and 5xx).
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Synthesis { status_code, .. } => match status_code {
                None => true,
                Some(code) => *code >= 500,
            },
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, NarrationError>;
