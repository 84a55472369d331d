use async_trait::async_trait;

use crate::error::ReadingResult;
use crate::models::Reading;

/// Destination for decoded readings.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReadingSink: Send + Sync {
    /// Durably store one reading as its own row
    async fn store(&self, reading: &Reading) -> ReadingResult<()>;
}
