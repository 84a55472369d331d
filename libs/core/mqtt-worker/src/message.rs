use chrono::{DateTime, Utc};

/// A publish delivered by the broker on one of the subscribed topics.
///
/// The payload is kept as raw bytes; decoding belongs to the handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub arrived_at: DateTime<Utc>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            arrived_at: Utc::now(),
        }
    }

    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }
}
