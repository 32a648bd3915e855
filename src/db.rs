use std::future::Future;
use std::time::Duration;

use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::errors::ServiceError;

/// Type alias for a database connection pool
pub type DbPool = DatabaseConnection;

/// Fixed retry policy for transient connectivity errors on lookups.
const LOOKUP_RETRIES: usize = 3;
const LOOKUP_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Configuration for database connection
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub acquire_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            acquire_timeout: Duration::from_secs(8),
        }
    }
}

impl From<&AppConfig> for DbConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            url: cfg.database_url.clone(),
            max_connections: cfg.db_max_connections,
            min_connections: cfg.db_min_connections,
            connect_timeout: Duration::from_secs(cfg.db_connect_timeout_secs),
            idle_timeout: Duration::from_secs(cfg.db_idle_timeout_secs),
            acquire_timeout: Duration::from_secs(cfg.db_acquire_timeout_secs),
        }
    }
}

/// Establishes a connection pool to the database.
pub async fn establish_connection(database_url: &str) -> Result<DbPool, DbErr> {
    let config = DbConfig {
        url: database_url.to_string(),
        ..Default::default()
    };
    establish_connection_with_config(&config).await
}

/// Establishes a connection pool with custom pool tuning.
pub async fn establish_connection_with_config(config: &DbConfig) -> Result<DbPool, DbErr> {
    debug!("Configuring database connection with: {:?}", config);

    let mut opt = ConnectOptions::new(config.url.clone());
    opt.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(config.connect_timeout)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .sqlx_logging(false);

    metrics::gauge!("dineline_db_max_connections", config.max_connections as f64);

    let pool = Database::connect(opt).await?;
    info!(
        max_connections = config.max_connections,
        "Database connection pool established"
    );
    Ok(pool)
}

pub async fn establish_connection_from_app_config(cfg: &AppConfig) -> Result<DbPool, DbErr> {
    establish_connection_with_config(&DbConfig::from(cfg)).await
}

fn is_transient(err: &DbErr) -> bool {
    matches!(err, DbErr::Conn(_) | DbErr::ConnectionAcquire(_))
}

/// Runs a read closure, retrying transient connectivity failures a small
/// fixed number of times with a fixed delay before surfacing the error.
/// Business errors (not found, validation) pass through untouched.
pub async fn with_lookup_retry<T, F, Fut>(op_name: &str, mut op: F) -> Result<T, ServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DbErr>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if is_transient(&err) && attempt < LOOKUP_RETRIES => {
                warn!(
                    op = op_name,
                    attempt,
                    error = %err,
                    "Transient database error; retrying"
                );
                metrics::counter!("dineline_db_lookup_retries", 1);
                tokio::time::sleep(LOOKUP_RETRY_DELAY).await;
            }
            Err(err) => return Err(ServiceError::DatabaseError(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn lookup_retry_recovers_from_transient_errors() {
        let calls = AtomicUsize::new(0);
        let result = with_lookup_retry("test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(DbErr::Conn(sea_orm::RuntimeErr::Internal(
                        "connection reset".into(),
                    )))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn lookup_retry_passes_business_errors_through() {
        let calls = AtomicUsize::new(0);
        let result: Result<i32, _> = with_lookup_retry("test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(DbErr::RecordNotFound("missing".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
