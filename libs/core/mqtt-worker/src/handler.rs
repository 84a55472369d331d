//! Handler seam between the transport and the domain.

use crate::message::InboundMessage;
use async_trait::async_trait;
use thiserror::Error;

/// Why a single message could not be handled.
///
/// Handler failures are logged and counted by the loop, never propagated.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// Payload could not be turned into a domain value
    #[error("decode failed: {0}")]
    Decode(String),

    /// Decoded value could not be stored
    #[error("persistence failed: {0}")]
    Persistence(String),
}

impl HandlerError {
    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            HandlerError::Decode(_) => "decode",
            HandlerError::Persistence(_) => "persistence",
        }
    }
}

/// Processes one inbound message to completion.
///
/// Called sequentially per topic; implementations must be safe to share
/// across shard workers.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn handle(&self, message: InboundMessage) -> Result<(), HandlerError>;

    /// Name used in logs and metrics
    fn name(&self) -> &'static str {
        "handler"
    }
}
