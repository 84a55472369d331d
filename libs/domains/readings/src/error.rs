use chrono::{DateTime, Utc};
use mqtt_worker::HandlerError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReadingError {
    #[error("Payload on '{topic}' is not valid UTF-8: {reason}")]
    Decode { topic: String, reason: String },

    /// Insert failed for good; carries the lost reading for the log
    #[error(
        "Failed to store reading on '{topic}' (value '{value}', received {received_at}) after {attempts} attempt(s): {reason}"
    )]
    Persistence {
        topic: String,
        value: String,
        received_at: DateTime<Utc>,
        attempts: u32,
        reason: String,
    },
}

pub type ReadingResult<T> = Result<T, ReadingError>;

impl From<ReadingError> for HandlerError {
    fn from(err: ReadingError) -> Self {
        match err {
            ReadingError::Decode { .. } => HandlerError::Decode(err.to_string()),
            ReadingError::Persistence { .. } => HandlerError::Persistence(err.to_string()),
        }
    }
}
