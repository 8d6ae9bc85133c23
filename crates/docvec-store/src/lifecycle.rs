//! Document lifecycle operations for front-ends
//!
//! Listing, deletion by file name, bulk clear and statistics. Deletion is
//! immediate and irreversible; asking the user first is the caller's job.

use docvec_core::{DocumentSummary, Result, StoreStats};
use std::sync::Arc;

use crate::{SqliteStore, VectorStore};

/// Lifecycle facade over the fragment store. Holds no state of its own.
#[derive(Clone)]
pub struct DocumentManager {
    store: Arc<SqliteStore>,
}

impl DocumentManager {
    pub fn new(store: Arc<SqliteStore>) -> Self {
        Self { store }
    }

    pub async fn list_documents(&self) -> Result<Vec<DocumentSummary>> {
        self.store.list_documents().await
    }

    /// Fragments that `delete_document(file_name)` would remove
    pub async fn count_fragments(&self, file_name: &str) -> Result<u64> {
        self.store.count_by_file_name(file_name).await
    }

    /// Whether any fragment carries this file name
    pub async fn document_exists(&self, file_name: &str) -> Result<bool> {
        Ok(self.count_fragments(file_name).await? > 0)
    }

    pub async fn delete_document(&self, file_name: &str) -> Result<u64> {
        self.store.delete_document(file_name).await
    }

    pub async fn clear_all_documents(&self) -> Result<u64> {
        self.store.clear_all_documents().await
    }

    pub async fn get_stats(&self) -> Result<StoreStats> {
        self.store.get_stats().await
    }
}
