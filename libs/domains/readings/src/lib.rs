//! Readings Domain
//!
//! Turns raw sensor messages into [`Reading`]s and stores them, one row per
//! message, in the `readings` table.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │ ReadingProcessor │  ← MessageHandler for the ingestion loop
//! └───┬──────────┬───┘
//!     │          │
//! ┌───▼─────┐ ┌──▼──────────┐
//! │ Decoder │ │ ReadingSink │  ← trait + PostgreSQL implementation
//! └─────────┘ └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use database::common::RetryConfig;
//! use domain_readings::{PgReadingRepository, ReadingProcessor};
//! use sea_orm::Database;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::connect("postgres://...").await?;
//! let sink = PgReadingRepository::new(db, RetryConfig::default());
//! let processor = ReadingProcessor::new(sink);
//! # Ok(())
//! # }
//! ```

pub mod decoder;
pub mod entity;
pub mod error;
pub mod models;
pub mod postgres;
pub mod processor;
pub mod repository;

pub use decoder::ReadingDecoder;
pub use error::{ReadingError, ReadingResult};
pub use models::{Reading, SensorKind};
pub use postgres::PgReadingRepository;
pub use processor::ReadingProcessor;
pub use repository::ReadingSink;

#[cfg(test)]
pub use repository::MockReadingSink;
