//! Shared error types for the kiosk supervisor

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SharedError {
    #[error("Unknown browser state: {input}")]
    UnknownState { input: String },

    #[error("Serialization failed: {message}")]
    SerializationError { message: String },
}

pub type SharedResult<T> = Result<T, SharedError>;
