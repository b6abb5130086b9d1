//! Postgres bootstrap: pool, schema migrations.

use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use thiserror::Error;

use crate::config::DatabaseConfig;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);
const IDLE_TIMEOUT: Duration = Duration::from_secs(600);
const MAX_LIFETIME: Duration = Duration::from_secs(1800);

#[derive(Debug, Error)]
pub enum DbError {
    #[error("failed to connect to PostgreSQL: {0}")]
    Connect(#[source] sqlx::Error),

    #[error("failed to apply migrations: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

impl From<DbError> for AppError {
    fn from(err: DbError) -> Self {
        AppError::DatabaseError(anyhow::Error::new(err))
    }
}

/// Open the pool and bring the schema up to date. The `configs` NOTIFY
/// trigger ships with the migrations, so settings can listen right after.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, DbError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .idle_timeout(IDLE_TIMEOUT)
        .max_lifetime(MAX_LIFETIME)
        .connect(&config.url)
        .await
        .map_err(DbError::Connect)?;

    tracing::info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "Connected to PostgreSQL"
    );

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Identity schema is up to date");

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_db_errors_are_opaque_server_errors() {
        let err: AppError = DbError::Connect(sqlx::Error::PoolTimedOut).into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(matches!(err, AppError::DatabaseError(_)));
    }

    #[tokio::test]
    #[ignore] // needs DATABASE_URL pointing at a disposable database
    async fn test_connect_applies_migrations() {
        let config = DatabaseConfig {
            url: std::env::var("DATABASE_URL").unwrap_or_default(),
            max_connections: 2,
            min_connections: 1,
        };

        let pool = connect(&config).await.unwrap();
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM configs")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert!(count >= 0);
    }
}
