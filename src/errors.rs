use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum AppError {
    #[error("STORE_FAILURE: {0}")]
    Store(String),
    #[error("AI_TRANSPORT: {0}")]
    AiTransport(String),
    #[error("AI_FORMAT: {0}")]
    AiFormat(String),
    #[error("INVALID_INPUT: {0}")]
    Validation(String),
    #[error("BUSY: {0}")]
    Busy(String),
    #[error("CONFIG_INVALID: {0}")]
    Config(String),
    #[error("IO_FAILURE: {0}")]
    Io(String),
    #[error("INTERNAL: {0}")]
    Internal(String),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Store(_) => "STORE_FAILURE",
            Self::AiTransport(_) => "AI_TRANSPORT",
            Self::AiFormat(_) => "AI_FORMAT",
            Self::Validation(_) => "INVALID_INPUT",
            Self::Busy(_) => "BUSY",
            Self::Config(_) => "CONFIG_INVALID",
            Self::Io(_) => "IO_FAILURE",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Message shown to the user, without the code prefix.
    pub fn user_message(&self) -> &str {
        match self {
            Self::Store(message)
            | Self::AiTransport(message)
            | Self::AiFormat(message)
            | Self::Validation(message)
            | Self::Busy(message)
            | Self::Config(message)
            | Self::Io(message)
            | Self::Internal(message) => message,
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Store(value.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
