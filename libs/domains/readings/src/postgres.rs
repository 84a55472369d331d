use async_trait::async_trait;
use database::common::{Exhausted, RetryConfig, retry_when};
use database::is_transient;
use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder};
use tracing::debug;

use crate::{
    entity,
    error::{ReadingError, ReadingResult},
    models::Reading,
    repository::ReadingSink,
};

/// Stores each reading with a single-row `INSERT`, retrying transient failures.
pub struct PgReadingRepository {
    db: DatabaseConnection,
    retry: RetryConfig,
}

impl PgReadingRepository {
    pub fn new(db: DatabaseConnection, retry: RetryConfig) -> Self {
        Self { db, retry }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    /// All stored readings for a topic, oldest first.
    pub async fn find_by_topic(&self, topic: &str) -> Result<Vec<Reading>, DbErr> {
        let models = entity::Entity::find()
            .filter(entity::Column::Topic.eq(topic))
            .order_by_asc(entity::Column::Id)
            .all(&self.db)
            .await?;

        Ok(models.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl ReadingSink for PgReadingRepository {
    async fn store(&self, reading: &Reading) -> ReadingResult<()> {
        let active_model: entity::ActiveModel = reading.into();
        let db = &self.db;

        let inserted = retry_when(
            move || entity::Entity::insert(active_model.clone()).exec_without_returning(db),
            &self.retry,
            is_transient,
        )
        .await;

        match inserted {
            Ok(_) => {
                debug!(
                    topic = %reading.topic(),
                    value = %reading.value(),
                    "Inserted reading"
                );
                Ok(())
            }
            Err(Exhausted { error, attempts }) => Err(ReadingError::Persistence {
                topic: reading.topic().to_string(),
                value: reading.value().to_string(),
                received_at: reading.received_at(),
                attempts,
                reason: error.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult, RuntimeErr};

    fn fast_retry(max_retries: u32) -> RetryConfig {
        RetryConfig::new()
            .with_max_retries(max_retries)
            .with_initial_delay(1)
            .with_max_delay(5)
            .without_jitter()
    }

    fn inserted() -> MockExecResult {
        MockExecResult {
            last_insert_id: 1,
            rows_affected: 1,
        }
    }

    fn connection_refused() -> DbErr {
        DbErr::Conn(RuntimeErr::Internal("connection refused".to_string()))
    }

    fn reading() -> Reading {
        Reading::new("sensor/DHT11/temperature", "23.5", Utc::now())
    }

    #[tokio::test]
    async fn test_store_inserts_once() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([inserted()])
            .into_connection();
        let repo = PgReadingRepository::new(db, fast_retry(3));

        repo.store(&reading()).await.unwrap();

        let log = repo.connection().clone().into_transaction_log();
        assert_eq!(log.len(), 1);
        let sql = format!("{:?}", log[0]);
        assert!(sql.contains("INSERT INTO"));
        assert!(sql.contains("readings"));
        assert!(sql.contains("23.5"));
    }

    #[tokio::test]
    async fn test_store_retries_transient_failures() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_errors([connection_refused(), connection_refused()])
            .append_exec_results([inserted()])
            .into_connection();
        let repo = PgReadingRepository::new(db, fast_retry(3));

        assert!(repo.store(&reading()).await.is_ok());
    }

    #[tokio::test]
    async fn test_store_gives_up_after_bounded_retries() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_errors([connection_refused(), connection_refused(), connection_refused()])
            .into_connection();
        let repo = PgReadingRepository::new(db, fast_retry(2));
        let reading = reading();

        let err = repo.store(&reading).await.unwrap_err();

        match err {
            ReadingError::Persistence {
                topic,
                value,
                received_at,
                attempts,
                ..
            } => {
                assert_eq!(topic, "sensor/DHT11/temperature");
                assert_eq!(value, "23.5");
                assert_eq!(received_at, reading.received_at());
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_store_does_not_retry_statement_errors() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_errors([DbErr::Exec(RuntimeErr::Internal(
                "null value in column \"value\" violates not-null constraint".to_string(),
            ))])
            .append_exec_results([inserted()])
            .into_connection();
        let repo = PgReadingRepository::new(db, fast_retry(3));

        match repo.store(&reading()).await.unwrap_err() {
            ReadingError::Persistence { attempts, .. } => assert_eq!(attempts, 1),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
