use chrono::Utc;

use crate::error::{ReadingError, ReadingResult};
use crate::models::Reading;

/// Turns a raw MQTT payload into a [`Reading`].
///
/// The payload must be UTF-8; the text is stored as-is and `received_at`
/// is taken from the process clock at decode time.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadingDecoder;

impl ReadingDecoder {
    pub fn new() -> Self {
        Self
    }

    pub fn decode(&self, topic: &str, payload: &[u8]) -> ReadingResult<Reading> {
        let value = std::str::from_utf8(payload).map_err(|e| ReadingError::Decode {
            topic: topic.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Reading::new(topic, value, Utc::now()))
    }
}
