use sea_orm::DbErr;

/// Database error type for connection and health operations
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// PostgreSQL errors surfaced by SeaORM
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] DbErr),

    /// Connection failed after retries
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Health check failed
    #[error("Health check failed: {0}")]
    HealthCheckFailed(String),
}

/// Result type alias for database operations
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Lower-cased fragments of driver messages that indicate the server or the
/// network went away rather than the statement being wrong.
const TRANSIENT_MARKERS: &[&str] = &[
    "connection",
    "timed out",
    "timeout",
    "broken pipe",
    "reset by peer",
    "pool",
    "io error",
    "the database system is starting up",
    "the database system is shutting down",
];

/// Whether a failed statement is worth retrying.
///
/// Connection and pool-acquire failures are always transient. Execution and
/// query failures are transient only when the driver message points at
/// connectivity; constraint violations and SQL errors are not.
pub fn is_transient(err: &DbErr) -> bool {
    match err {
        DbErr::Conn(_) | DbErr::ConnectionAcquire(_) => true,
        DbErr::Exec(inner) | DbErr::Query(inner) => {
            let message = inner.to_string().to_lowercase();
            TRANSIENT_MARKERS
                .iter()
                .any(|marker| message.contains(marker))
        }
        _ => false,
    }
}
