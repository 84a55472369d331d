//! Error classification and retry helpers

pub mod error;
pub mod retry;

pub use error::{DatabaseError, DatabaseResult, is_transient};
pub use retry::{Exhausted, RetryConfig, retry_when, retry_with_backoff};
