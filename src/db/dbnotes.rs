use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Error as SqlxError, Row};
use std::time::Duration;
use tracing::{error, info, warn};

use super::{DocumentAccess, DocumentStore, SaveOutcome, StoreError};

/// Document row joined with the caller's access flag
#[derive(Debug, Clone, sqlx::FromRow)]
struct AccessibleDocumentRow {
    id: String,
    content: String,
    version: i64,
    updated_at: DateTime<Utc>,
    access_allowed: bool,
}

const SCHEMA_SQL: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS documents (
        id TEXT PRIMARY KEY,
        owner_id TEXT NOT NULL,
        content TEXT NOT NULL DEFAULT '',
        version BIGINT NOT NULL DEFAULT 1,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        deleted BOOLEAN NOT NULL DEFAULT FALSE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS document_collaborators (
        document_id TEXT NOT NULL REFERENCES documents(id),
        user_id TEXT NOT NULL,
        PRIMARY KEY (document_id, user_id)
    )
    "#,
];

/// No connection could be had at all, as opposed to a statement failing.
fn unavailable_or_database(e: SqlxError) -> StoreError {
    match e {
        SqlxError::PoolTimedOut | SqlxError::PoolClosed | SqlxError::Io(_) => StoreError::Unavailable(e.to_string()),
        other => StoreError::Database(other),
    }
}

/// Postgres-backed document store
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    /// Create a new database connection pool
    ///
    /// # Arguments
    /// * `database_url` - PostgreSQL connection string
    pub async fn connect(database_url: &str) -> Result<Self, SqlxError> {
        info!("Connecting to database...");

        let pool = PgPoolOptions::new()
            .max_connections(20)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600)) // Close idle connections after 10 minutes
            .max_lifetime(Duration::from_secs(1800)) // Recycle connections after 30 minutes
            .connect(database_url)
            .await?;

        info!("Database connection pool created successfully");

        Ok(Self { pool })
    }

    /// Create the tables this service reads and writes, if missing.
    pub async fn ensure_schema(&self) -> Result<(), SqlxError> {
        for statement in SCHEMA_SQL {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    fn log_pool_state(&self, action: &str, doc_id: &str) {
        let pool_idle = self.pool.num_idle() as u32;
        let pool_size = self.pool.size();
        info!(
            "{} doc {}. Pool connections: {} idle, {} in use",
            action,
            doc_id,
            pool_idle,
            pool_size.saturating_sub(pool_idle)
        );
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn get_document(&self, id: &str, user_id: &str) -> Result<Option<DocumentAccess>, StoreError> {
        self.log_pool_state("Checking access to", id);

        let query_sql = r#"
            SELECT d.id,
                   d.content,
                   d.version,
                   d.updated_at,
                   (d.owner_id = $2 OR EXISTS (
                        SELECT 1 FROM document_collaborators c
                        WHERE c.document_id = d.id AND c.user_id = $2
                   )) AS access_allowed
            FROM documents d
            WHERE d.id = $1
                AND d.deleted = FALSE
        "#;

        let row = sqlx::query_as::<_, AccessibleDocumentRow>(query_sql)
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to load document {}: {}", id, e);
                unavailable_or_database(e)
            })?;

        Ok(row.map(|r| DocumentAccess {
            id: r.id,
            content: r.content,
            version: r.version,
            updated_at: r.updated_at,
            access_allowed: r.access_allowed,
        }))
    }

    async fn save_if_version_matches(
        &self,
        id: &str,
        content: &str,
        expected_version: i64,
    ) -> Result<SaveOutcome, StoreError> {
        self.log_pool_state("Updating", id);

        // Begin a transaction
        let mut tx = match self.pool.begin().await {
            Ok(tx) => tx,
            Err(e) => {
                error!(
                    "Failed to acquire connection from pool. Pool state: {} idle, {} total",
                    self.pool.num_idle(),
                    self.pool.size()
                );
                return Err(unavailable_or_database(e));
            }
        };

        // Compare and increment in one statement
        let update_sql = r#"
            UPDATE documents
            SET content = $1,
                version = version + 1,
                updated_at = NOW()
            WHERE id = $2
                AND version = $3
                AND deleted = FALSE
            RETURNING version;
        "#;
        let updated = sqlx::query(update_sql)
            .bind(content)
            .bind(id)
            .bind(expected_version)
            .fetch_optional(&mut *tx)
            .await?;

        if let Some(row) = updated {
            let new_version: i64 = row.try_get("version")?;
            tx.commit().await?;
            info!("Document {} updated to version {}", id, new_version);
            return Ok(SaveOutcome::Accepted { new_version });
        }

        // Nothing matched: read the current state inside the same transaction
        let current_sql = r#"
            SELECT content, version
            FROM documents
            WHERE id = $1
                AND deleted = FALSE;
        "#;
        let current = sqlx::query(current_sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        tx.rollback().await?;

        match current {
            Some(row) => {
                let current_version: i64 = row.try_get("version")?;
                let current_content: String = row.try_get("content")?;
                warn!(
                    "Version conflict on document {}: expected {}, stored {}",
                    id, expected_version, current_version
                );
                Ok(SaveOutcome::Conflict { current_version, current_content })
            }
            None => Ok(SaveOutcome::NotFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_database_reports_unavailable() {
        // nothing listens on port 1
        let pool = PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(500))
            .connect_lazy("postgres://colabri@127.0.0.1:1/colabri")
            .unwrap();
        let store = PgDocumentStore { pool };

        let saved = store.save_if_version_matches("note-1", "X", 1).await;
        assert!(matches!(saved, Err(StoreError::Unavailable(_))), "got {:?}", saved);

        let loaded = store.get_document("note-1", "alice").await;
        assert!(matches!(loaded, Err(StoreError::Unavailable(_))), "got {:?}", loaded);
    }
}
