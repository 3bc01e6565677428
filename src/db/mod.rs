pub mod dbnotes;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use dbnotes::PgDocumentStore;
pub use memory::MemoryDocumentStore;

/// A document as seen by one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentAccess {
    pub id: String,
    pub content: String,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
    pub access_allowed: bool,
}

/// Result of a version-checked write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Content stored, version bumped by exactly one.
    Accepted { new_version: i64 },
    /// Expected version was stale. Nothing was written.
    Conflict { current_version: i64, current_content: String },
    NotFound,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence collaborator owning document content and version counters.
///
/// `save_if_version_matches` must be an atomic compare-and-swap: the version
/// comparison, the content write and the increment either all happen or none
/// do.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_document(&self, id: &str, user_id: &str) -> Result<Option<DocumentAccess>, StoreError>;

    async fn save_if_version_matches(
        &self,
        id: &str,
        content: &str,
        expected_version: i64,
    ) -> Result<SaveOutcome, StoreError>;
}
