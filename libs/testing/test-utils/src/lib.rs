//! Shared test utilities for the ingestion crates
//!
//! - `TestDatabase`: PostgreSQL container with the readings schema (feature: "postgres")
//! - `TestBroker`: Mosquitto container plus a publishing client (feature: "mqtt")
//! - `TestDataBuilder`: Deterministic topics and values (always available)
//! - `assertions`: Custom assertion helpers (always available)
//!
//! # Usage
//!
//! ```rust,no_run
//! use test_utils::{TestDatabase, TestDataBuilder};
//!
//! #[tokio::test]
//! #[ignore] // Requires Docker
//! async fn my_postgres_test() {
//!     let db = TestDatabase::new().await;
//!     let builder = TestDataBuilder::from_test_name("my_test");
//!
//!     let topic = builder.topic("DHT11", "temperature");
//! }
//! ```
//!
//! Broker tests need `features = ["mqtt"]`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { workspace = true, features = ["mqtt"] }
//! ```

#[cfg(feature = "postgres")]
mod postgres;

#[cfg(feature = "mqtt")]
mod broker;

#[cfg(feature = "postgres")]
pub use postgres::TestDatabase;

#[cfg(feature = "mqtt")]
pub use broker::TestBroker;

/// Builder for test data with deterministic randomization
///
/// Topics are namespaced by the seed so parallel tests against one
/// database never see each other's rows.
pub struct TestDataBuilder {
    seed: u64,
}

impl TestDataBuilder {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Create from test name (generates seed from test name hash)
    ///
    /// ```
    /// use test_utils::TestDataBuilder;
    ///
    /// let builder = TestDataBuilder::from_test_name("test_store_reading");
    /// ```
    pub fn from_test_name(name: &str) -> Self {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        Self::new(hasher.finish())
    }

    /// Topic in the `sensor/<device>/<measurement>` shape, unique to this builder
    ///
    /// ```
    /// use test_utils::TestDataBuilder;
    ///
    /// let topic = TestDataBuilder::new(7).topic("DHT11", "humidity");
    /// assert_eq!(topic, "test-7/sensor/DHT11/humidity");
    /// ```
    pub fn topic(&self, device: &str, measurement: &str) -> String {
        format!("test-{}/sensor/{}/{}", self.seed, device, measurement)
    }

    /// Deterministic numeric payload for the `index`-th message
    pub fn value(&self, index: u32) -> String {
        let base = (self.seed % 400) as f64 / 10.0;
        format!("{:.1}", base + index as f64 * 0.5)
    }
}

/// Test assertion helpers
pub mod assertions {
    use chrono::{DateTime, Utc};

    /// Assert that timestamps never go backwards
    pub fn assert_non_decreasing(timestamps: &[DateTime<Utc>], context: &str) {
        for pair in timestamps.windows(2) {
            assert!(
                pair[0] <= pair[1],
                "{}: timestamp {} is after {}",
                context,
                pair[0],
                pair[1]
            );
        }
    }

    /// Assert that an optional value is Some
    pub fn assert_some<T>(value: Option<T>, context: &str) -> T {
        value.unwrap_or_else(|| panic!("{}: expected Some, got None", context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn test_data_builder_deterministic() {
        let builder1 = TestDataBuilder::new(42);
        let builder2 = TestDataBuilder::new(42);

        assert_eq!(builder1.topic("DHT11", "humidity"), builder2.topic("DHT11", "humidity"));
        assert_eq!(builder1.value(3), builder2.value(3));
    }

    #[test]
    fn test_data_builder_different_names() {
        let builder1 = TestDataBuilder::from_test_name("test1");
        let builder2 = TestDataBuilder::from_test_name("test2");

        assert_ne!(builder1.topic("DHT11", "humidity"), builder2.topic("DHT11", "humidity"));
    }

    #[test]
    fn test_values_are_numeric() {
        let builder = TestDataBuilder::new(123);
        assert_eq!(builder.value(0), "12.3");
        assert_eq!(builder.value(2), "13.3");
    }

    #[test]
    fn test_assert_non_decreasing_accepts_ties() {
        let now = Utc::now();
        assertions::assert_non_decreasing(&[now, now, now + Duration::seconds(1)], "ties");
    }

    #[test]
    #[should_panic(expected = "backwards")]
    fn test_assert_non_decreasing_rejects_reordering() {
        let now = Utc::now();
        assertions::assert_non_decreasing(&[now, now - Duration::seconds(1)], "backwards");
    }
}
