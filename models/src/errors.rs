// models/src/errors.rs

pub use thiserror::Error;
use uuid::Uuid;

/// Error taxonomy shared by every crate in the workspace.
///
/// Gateway outcomes (sent / rejected / transport failure) are deliberately
/// NOT errors — they are a closed enum in the gateway client so the
/// scheduler is forced to handle each branch.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BotError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("A patient with this phone number already exists")]
    DuplicatePhone,
    #[error("Decryption failed: {0}")]
    Decryption(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Text provider error: {0}")]
    Provider(String),
    #[error("entity {0} was not found")]
    NotFound(Uuid),
    #[error("Unauthorized")]
    Unauthorized,
}

pub type BotResult<T> = Result<T, BotError>;

impl From<sled::Error> for BotError {
    fn from(err: sled::Error) -> Self {
        BotError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for BotError {
    fn from(err: serde_json::Error) -> Self {
        BotError::Serialization(err.to_string())
    }
}
