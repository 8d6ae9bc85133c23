//! docvec Store - Fragment persistence and similarity search
//!
//! Stores document fragments with their embeddings in a single SQLite file
//! and ranks them against query vectors with a brute-force cosine scan.

use async_trait::async_trait;
use docvec_core::{DocumentSummary, Result, SimilarFragment, StoreStats};

pub mod codec;
pub mod lifecycle;
pub mod search;
pub mod sqlite_store;

pub use lifecycle::DocumentManager;
pub use search::cosine_similarity;
pub use sqlite_store::SqliteStore;

/// Trait for fragment store operations
///
/// Every operation is durable once it returns.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace the fragment keyed by `(document_id, chunk_index)`
    async fn save_chunk(
        &self,
        document_id: &str,
        chunk_index: u32,
        chunk_text: &str,
        embedding: &[f32],
        file_name: Option<&str>,
    ) -> Result<i64>;

    /// Fragments most similar to `query_embedding`, best first
    async fn find_similar(
        &self,
        query_embedding: &[f32],
        top_k: usize,
        min_similarity: f32,
    ) -> Result<Vec<SimilarFragment>>;

    /// One entry per `(document_id, file_name)`, most recently touched first
    async fn list_documents(&self) -> Result<Vec<DocumentSummary>>;

    /// Delete every fragment with this exact file name
    async fn delete_document(&self, file_name: &str) -> Result<u64>;

    /// Delete every fragment
    async fn clear_all_documents(&self) -> Result<u64>;

    /// Aggregate counts and on-disk size
    async fn get_stats(&self) -> Result<StoreStats>;
}
