use thiserror::Error;

#[derive(Debug, Error)]
pub enum EtpError {
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error("Configuration conflict: {0}")]
    ConfigConflict(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Invalid value: {0}")]
    InvalidValue(String),
    #[error("Error: {0}")]
    GenericError(String),
}

impl From<serde_yaml::Error> for EtpError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::ParseError(e.to_string())
    }
}

impl From<serde_json::error::Error> for EtpError {
    fn from(e: serde_json::error::Error) -> Self {
        Self::SerializationError(e.to_string())
    }
}

impl From<anyhow::Error> for EtpError {
    fn from(error: anyhow::Error) -> Self {
        Self::GenericError(format!("{error:#}"))
    }
}

impl From<String> for EtpError {
    fn from(e: String) -> Self {
        Self::GenericError(e)
    }
}
