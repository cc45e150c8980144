mod attempt_repo;
mod concept_repo;

pub use attempt_repo::SyncAuditLog;
pub use concept_repo::ConceptStore;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Initialize the database connection pool and run migrations.
///
/// WAL mode plus a busy timeout serializes concurrent write transactions
/// touching the same database, which is how the batch sync path enforces
/// its row-lock discipline on SQLite.
pub async fn init_db(db_path: PathBuf) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).map_err(sqlx::Error::Io)?;
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

#[cfg(test)]
pub(crate) async fn test_pool() -> (SqlitePool, tempfile::TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let pool = init_db(temp_dir.path().join("test.db")).await.unwrap();
    (pool, temp_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_db_creates_tables() {
        let (pool, _temp) = test_pool().await;

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' AND name NOT LIKE '_sqlx_%' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();

        let table_names: Vec<&str> = tables.iter().map(|t| t.0.as_str()).collect();
        assert!(table_names.contains(&"concepts"));
        assert!(table_names.contains(&"sync_attempts"));
    }

    #[tokio::test]
    async fn test_owner_concept_type_unique() {
        let (pool, _temp) = test_pool().await;
        let now = chrono::Utc::now().to_rfc3339();

        let insert = "INSERT INTO concepts (id, owner_id, concept_type, created_at, updated_at) VALUES (?, ?, ?, ?, ?)";
        sqlx::query(insert)
            .bind(uuid::Uuid::new_v4().to_string())
            .bind("user1")
            .bind("linear")
            .bind(&now)
            .bind(&now)
            .execute(&pool)
            .await
            .unwrap();

        // Second row for the same (owner, concept_type) must be rejected
        let dup = sqlx::query(insert)
            .bind(uuid::Uuid::new_v4().to_string())
            .bind("user1")
            .bind("linear")
            .bind(&now)
            .bind(&now)
            .execute(&pool)
            .await;
        assert!(dup.is_err());
    }
}
