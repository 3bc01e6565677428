use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;
use tracing::debug;

use super::{DocumentAccess, DocumentStore, SaveOutcome, StoreError};

#[derive(Debug, Clone)]
struct StoredDocument {
    owner: String,
    collaborators: HashSet<String>,
    content: String,
    version: i64,
    updated_at: DateTime<Utc>,
}

/// In-process document store, used when no database is configured and in tests.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    docs: Mutex<HashMap<String, StoredDocument>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a document owned by `owner`.
    pub async fn insert(&self, id: &str, owner: &str, content: &str, version: i64) {
        let mut docs = self.docs.lock().await;
        docs.insert(id.to_string(), StoredDocument {
            owner: owner.to_string(),
            collaborators: HashSet::new(),
            content: content.to_string(),
            version,
            updated_at: Utc::now(),
        });
    }

    /// Give `user_id` access to an existing document. Returns false if it does not exist.
    pub async fn grant(&self, id: &str, user_id: &str) -> bool {
        let mut docs = self.docs.lock().await;
        match docs.get_mut(id) {
            Some(doc) => {
                doc.collaborators.insert(user_id.to_string());
                true
            }
            None => false,
        }
    }

    /// Current `(content, version)` of a document.
    pub async fn snapshot(&self, id: &str) -> Option<(String, i64)> {
        let docs = self.docs.lock().await;
        docs.get(id).map(|doc| (doc.content.clone(), doc.version))
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get_document(&self, id: &str, user_id: &str) -> Result<Option<DocumentAccess>, StoreError> {
        let docs = self.docs.lock().await;
        Ok(docs.get(id).map(|doc| DocumentAccess {
            id: id.to_string(),
            content: doc.content.clone(),
            version: doc.version,
            updated_at: doc.updated_at,
            access_allowed: doc.owner == user_id || doc.collaborators.contains(user_id),
        }))
    }

    async fn save_if_version_matches(
        &self,
        id: &str,
        content: &str,
        expected_version: i64,
    ) -> Result<SaveOutcome, StoreError> {
        // The lock spans compare and write, which makes the pair atomic.
        let mut docs = self.docs.lock().await;
        let Some(doc) = docs.get_mut(id) else {
            return Ok(SaveOutcome::NotFound);
        };

        if doc.version != expected_version {
            debug!("Version mismatch on {}: expected {}, stored {}", id, expected_version, doc.version);
            return Ok(SaveOutcome::Conflict {
                current_version: doc.version,
                current_content: doc.content.clone(),
            });
        }

        doc.content = content.to_string();
        doc.version += 1;
        doc.updated_at = Utc::now();
        Ok(SaveOutcome::Accepted { new_version: doc.version })
    }
}
