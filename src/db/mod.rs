mod connection;
pub mod models;
mod repository;
mod statement;

pub use connection::{
    is_connection_error, is_connection_limit, ConnectionManager, Connector, Database, DbError,
    RetryPolicy, SqlConnector, MAX_BACKOFF,
};
pub use models::*;
pub use repository::*;
pub use statement::*;

use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use tracing::info;

use crate::config::DatabaseConfig;

/// Current time in the format stored in `created_at` / `updated_at`
pub fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Build the connection manager. Nothing is opened until the first query.
pub fn connect(config: &DatabaseConfig) -> Database {
    info!(target = %config.display_target(), "Configuring database connection");
    ConnectionManager::new(
        SqlConnector::new(config.url(), config.connect_timeout()),
        config.retry_policy(),
        config.query_timeout(),
    )
}

/// Execute a SQL migration file, properly handling comments
async fn execute_sql(db: &Database, sql: &str) -> Result<()> {
    for statement in sql.split(';') {
        // Strip SQL comment lines (lines starting with --)
        let cleaned: String = statement
            .lines()
            .filter(|line| !line.trim().starts_with("--"))
            .collect::<Vec<_>>()
            .join("\n");
        let trimmed = cleaned.trim();
        if !trimmed.is_empty() {
            db.execute(Statement::new(trimmed)).await?;
        }
    }
    Ok(())
}

pub async fn migrate(db: &Database) -> Result<()> {
    info!("Running database migrations...");
    execute_sql(db, include_str!("../../migrations/001_initial.sql")).await?;
    info!("Database schema is up to date");
    Ok(())
}

/// Fresh in-memory schema behind the same connection manager production uses
#[cfg(test)]
pub(crate) async fn test_database() -> Database {
    let config = DatabaseConfig {
        url: Some("sqlite::memory:".to_string()),
        ..DatabaseConfig::default()
    };
    let db = connect(&config);
    migrate(&db).await.expect("migrations apply to sqlite");
    db
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let db = test_database().await;
        migrate(&db).await.unwrap();

        let tables = db
            .count(Statement::new(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' \
                 AND name IN ('users', 'categories', 'labour_profiles', 'bookings', 'referrals')",
            ))
            .await
            .unwrap();
        assert_eq!(tables, 5);
    }

    #[tokio::test]
    async fn test_foreign_keys_are_enforced() {
        let db = test_database().await;
        let mut patch = Patch::new();
        patch
            .set("name", "Asad")
            .set("category_id", "missing")
            .set("city", "Lahore")
            .set("phone", "0300");
        let err = db
            .execute(patch.into_insert("labour_profiles", "lp-1", &now()))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Query(_)));
    }

    // MySQL reports TEXT/BLOB cells as blobs, and the Any driver only decodes
    // `String` from text cells, so every column must be VARCHAR or numeric.
    #[test]
    fn test_schema_column_types_decode_through_any() {
        let schema = include_str!("../../migrations/001_initial.sql");
        let mut columns = 0;
        for line in schema.lines().map(str::trim) {
            let mut tokens = line.split_whitespace();
            let (Some(name), Some(ty)) = (tokens.next(), tokens.next()) else {
                continue;
            };
            if name.starts_with("--")
                || !name.chars().all(|c| c.is_ascii_lowercase() || c == '_')
            {
                continue;
            }
            let ty = ty.trim_end_matches(',');
            let base = ty.split('(').next().unwrap_or(ty);
            assert!(
                matches!(base, "VARCHAR" | "BIGINT" | "DOUBLE"),
                "column {} has type {}",
                name,
                ty
            );
            columns += 1;
        }
        assert!(columns > 40, "only {} columns parsed", columns);
    }

    #[test]
    fn test_now_is_rfc3339_utc() {
        let ts = now();
        assert!(ts.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
    }
}
