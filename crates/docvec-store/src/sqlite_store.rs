//! SQLite implementation of the fragment store
//!
//! One table, `document_chunks`, keyed by `(document_id, chunk_index)`.
//! Embeddings live in a BLOB column next to their component count; text is
//! only read back for fragments that survive similarity ranking.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docvec_core::{
    DocumentSummary, DocvecError, Fragment, Result, SimilarFragment, StorageConfig, StoreStats,
};
use futures::TryStreamExt;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{FromRow, QueryBuilder, Sqlite};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::RwLock;

use crate::codec;
use crate::search::{self, Candidate};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS document_chunks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        document_id TEXT NOT NULL,
        file_name TEXT,
        chunk_index INTEGER NOT NULL,
        chunk_text TEXT NOT NULL,
        embedding BLOB NOT NULL,
        embedding_dim INTEGER NOT NULL,
        created_at INTEGER NOT NULL,
        UNIQUE (document_id, chunk_index)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_document_chunks_document_id ON document_chunks(document_id)",
    "CREATE INDEX IF NOT EXISTS idx_document_chunks_file_name ON document_chunks(file_name)",
    "CREATE INDEX IF NOT EXISTS idx_document_chunks_created_at ON document_chunks(created_at)",
];

/// Ids bound per text lookup, well under SQLite's bound-variable limit
const HYDRATE_BATCH: usize = 500;

/// SQLite fragment store
pub struct SqliteStore {
    pool: SqlitePool,
    path: PathBuf,
    // shared for reads, exclusive for writes
    gate: RwLock<()>,
}

impl SqliteStore {
    /// Open (and create if needed) the database file and its schema
    pub async fn open(config: &StorageConfig) -> Result<Self> {
        let path = config.db_path.clone();
        ensure_parent_dir(&path).await?;

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Delete)
            .synchronous(SqliteSynchronous::Full)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(config.pool_size.max(1))
            .connect_with(options)
            .await
            .map_err(|e| {
                DocvecError::Storage(format!("Failed to open {}: {e}", path.display()))
            })?;

        let store = Self {
            pool,
            path,
            gate: RwLock::new(()),
        };
        store.init_schema().await?;

        tracing::info!(path = %store.path.display(), "fragment store opened");
        Ok(store)
    }

    /// Create table and indices (idempotent)
    pub async fn init_schema(&self) -> Result<()> {
        let _write = self.gate.write().await;
        for statement in SCHEMA {
            sqlx::query(*statement)
                .execute(&self.pool)
                .await
                .map_err(|e| DocvecError::Storage(format!("Failed to create schema: {e}")))?;
        }
        Ok(())
    }

    /// Database file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Close all pooled connections
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// All fragments of one document, ordered by chunk index
    pub async fn get_document_chunks(&self, document_id: &str) -> Result<Vec<Fragment>> {
        let _read = self.gate.read().await;

        let rows: Vec<FragmentRow> = sqlx::query_as(
            r#"
            SELECT id, document_id, file_name, chunk_index, chunk_text,
                   embedding, embedding_dim, created_at
            FROM document_chunks
            WHERE document_id = ?
            ORDER BY chunk_index
            "#,
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DocvecError::Storage(format!("Failed to get chunks: {e}")))?;

        rows.into_iter().map(Fragment::try_from).collect()
    }

    /// Number of fragments stored under a file name
    pub async fn count_by_file_name(&self, file_name: &str) -> Result<u64> {
        let _read = self.gate.read().await;

        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM document_chunks WHERE file_name = ?")
                .bind(file_name)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| DocvecError::Storage(format!("Failed to count chunks: {e}")))?;

        Ok(count as u64)
    }

    /// Scan phase: score every stored embedding without reading text
    async fn scan(&self, query: &[f32], min_similarity: f32) -> Result<Vec<Candidate>> {
        let mut rows = sqlx::query_as::<_, EmbeddingRow>(
            r#"
            SELECT id, document_id, file_name, chunk_index, embedding, embedding_dim
            FROM document_chunks
            "#,
        )
        .fetch(&self.pool);

        let mut candidates = Vec::new();
        let mut scanned = 0usize;

        while let Some(row) = rows
            .try_next()
            .await
            .map_err(|e| DocvecError::Storage(format!("Similarity scan failed: {e}")))?
        {
            scanned += 1;
            if row.embedding_dim as usize != query.len() {
                tracing::debug!(
                    id = row.id,
                    stored_dim = row.embedding_dim,
                    query_dim = query.len(),
                    "skipping fragment with mismatched dimension"
                );
                continue;
            }

            let embedding = codec::decode(&row.embedding, row.embedding_dim as usize)
                .map_err(|e| DocvecError::Storage(format!("Fragment {} is corrupt: {e}", row.id)))?;
            let similarity = search::cosine_similarity(query, &embedding);

            // filtering here keeps memory proportional to the survivors
            if search::passes_floor(similarity, min_similarity) {
                candidates.push(Candidate {
                    id: row.id,
                    document_id: row.document_id,
                    file_name: row.file_name,
                    chunk_index: row.chunk_index as u32,
                    similarity,
                });
            }
        }

        tracing::debug!(scanned, above_floor = candidates.len(), "similarity scan done");
        Ok(candidates)
    }

    /// Hydrate phase: fetch text for the selected ids only
    async fn hydrate(&self, selected: Vec<Candidate>) -> Result<Vec<SimilarFragment>> {
        if selected.is_empty() {
            return Ok(Vec::new());
        }

        let mut texts: HashMap<i64, String> = HashMap::with_capacity(selected.len());
        for batch in selected.chunks(HYDRATE_BATCH) {
            let mut builder: QueryBuilder<Sqlite> =
                QueryBuilder::new("SELECT id, chunk_text FROM document_chunks WHERE id IN (");
            let mut ids = builder.separated(", ");
            for candidate in batch {
                ids.push_bind(candidate.id);
            }
            ids.push_unseparated(")");

            let rows = builder
                .build_query_as::<(i64, String)>()
                .fetch_all(&self.pool)
                .await
                .map_err(|e| DocvecError::Storage(format!("Failed to load fragment text: {e}")))?;
            texts.extend(rows);
        }

        Ok(selected
            .into_iter()
            .filter_map(|c| {
                let chunk_text = texts.get(&c.id)?.clone();
                Some(SimilarFragment {
                    id: c.id,
                    document_id: c.document_id,
                    file_name: c.file_name,
                    chunk_index: c.chunk_index,
                    chunk_text,
                    similarity: c.similarity,
                })
            })
            .collect())
    }
}

#[async_trait]
impl super::VectorStore for SqliteStore {
    async fn save_chunk(
        &self,
        document_id: &str,
        chunk_index: u32,
        chunk_text: &str,
        embedding: &[f32],
        file_name: Option<&str>,
    ) -> Result<i64> {
        if embedding.is_empty() {
            return Err(DocvecError::InvalidInput(
                "Embedding cannot be empty".to_string(),
            ));
        }
        if chunk_text.trim().is_empty() {
            return Err(DocvecError::InvalidInput(
                "Chunk text cannot be empty".to_string(),
            ));
        }

        let blob = codec::encode(embedding)?;

        let _write = self.gate.write().await;
        // stamped under the write gate so commit order matches timestamp order
        let now = Utc::now().timestamp_micros();

        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO document_chunks (
                document_id, file_name, chunk_index, chunk_text,
                embedding, embedding_dim, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (document_id, chunk_index) DO UPDATE SET
                file_name = excluded.file_name,
                chunk_text = excluded.chunk_text,
                embedding = excluded.embedding,
                embedding_dim = excluded.embedding_dim,
                created_at = excluded.created_at
            RETURNING id
            "#,
        )
        .bind(document_id)
        .bind(file_name)
        .bind(chunk_index as i64)
        .bind(chunk_text)
        .bind(&blob)
        .bind(embedding.len() as i64)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DocvecError::Storage(format!("Failed to save chunk: {e}")))?;

        tracing::trace!(id, document_id, chunk_index, dim = embedding.len(), "chunk saved");
        Ok(id)
    }

    async fn find_similar(
        &self,
        query_embedding: &[f32],
        top_k: usize,
        min_similarity: f32,
    ) -> Result<Vec<SimilarFragment>> {
        if query_embedding.is_empty() {
            return Err(DocvecError::InvalidInput(
                "Query embedding cannot be empty".to_string(),
            ));
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }

        // held across both phases so a write cannot land in between
        let _read = self.gate.read().await;

        let candidates = self.scan(query_embedding, min_similarity).await?;
        let selected = search::select_top_k(candidates, top_k, min_similarity);
        self.hydrate(selected).await
    }

    async fn list_documents(&self) -> Result<Vec<DocumentSummary>> {
        let _read = self.gate.read().await;

        let rows: Vec<SummaryRow> = sqlx::query_as(
            r#"
            SELECT document_id, file_name,
                   COUNT(*) AS chunk_count,
                   MAX(created_at) AS last_update
            FROM document_chunks
            GROUP BY document_id, file_name
            ORDER BY last_update DESC, document_id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DocvecError::Storage(format!("Failed to list documents: {e}")))?;

        rows.into_iter().map(DocumentSummary::try_from).collect()
    }

    async fn delete_document(&self, file_name: &str) -> Result<u64> {
        let _write = self.gate.write().await;

        let result = sqlx::query("DELETE FROM document_chunks WHERE file_name = ?")
            .bind(file_name)
            .execute(&self.pool)
            .await
            .map_err(|e| DocvecError::Storage(format!("Failed to delete document: {e}")))?;

        tracing::info!(file_name, deleted = result.rows_affected(), "document deleted");
        Ok(result.rows_affected())
    }

    async fn clear_all_documents(&self) -> Result<u64> {
        let _write = self.gate.write().await;

        let result = sqlx::query("DELETE FROM document_chunks")
            .execute(&self.pool)
            .await
            .map_err(|e| DocvecError::Storage(format!("Failed to clear documents: {e}")))?;

        tracing::info!(deleted = result.rows_affected(), "all documents cleared");
        Ok(result.rows_affected())
    }

    async fn get_stats(&self) -> Result<StoreStats> {
        let _read = self.gate.read().await;

        let (total_documents, total_chunks, last_update): (i64, i64, Option<i64>) =
            sqlx::query_as(
                r#"
                SELECT COUNT(DISTINCT document_id), COUNT(*), MAX(created_at)
                FROM document_chunks
                "#,
            )
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DocvecError::Storage(format!("Failed to read stats: {e}")))?;

        let storage_size_bytes = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => {
                return Err(DocvecError::Storage(format!(
                    "Failed to stat {}: {e}",
                    self.path.display()
                )))
            }
        };

        Ok(StoreStats {
            total_documents: total_documents as u64,
            total_chunks: total_chunks as u64,
            storage_size_bytes,
            last_update: last_update.map(from_micros).transpose()?,
        })
    }
}

async fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                DocvecError::Storage(format!(
                    "Failed to create directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
    }
    Ok(())
}

fn from_micros(micros: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| DocvecError::Storage(format!("Invalid timestamp: {micros}")))
}

/// Scan-phase row (no text)
#[derive(Debug, FromRow)]
struct EmbeddingRow {
    id: i64,
    document_id: String,
    file_name: Option<String>,
    chunk_index: i64,
    embedding: Vec<u8>,
    embedding_dim: i64,
}

/// Full fragment row
#[derive(Debug, FromRow)]
struct FragmentRow {
    id: i64,
    document_id: String,
    file_name: Option<String>,
    chunk_index: i64,
    chunk_text: String,
    embedding: Vec<u8>,
    embedding_dim: i64,
    created_at: i64,
}

impl TryFrom<FragmentRow> for Fragment {
    type Error = DocvecError;

    fn try_from(row: FragmentRow) -> Result<Self> {
        Ok(Fragment {
            id: row.id,
            document_id: row.document_id,
            file_name: row.file_name,
            chunk_index: row.chunk_index as u32,
            chunk_text: row.chunk_text,
            embedding: codec::decode(&row.embedding, row.embedding_dim as usize)?,
            created_at: from_micros(row.created_at)?,
        })
    }
}

/// Grouped listing row
#[derive(Debug, FromRow)]
struct SummaryRow {
    document_id: String,
    file_name: Option<String>,
    chunk_count: i64,
    last_update: i64,
}

impl TryFrom<SummaryRow> for DocumentSummary {
    type Error = DocvecError;

    fn try_from(row: SummaryRow) -> Result<Self> {
        Ok(DocumentSummary {
            document_id: row.document_id,
            file_name: row.file_name,
            chunk_count: row.chunk_count as u64,
            last_update: from_micros(row.last_update)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VectorStore;
    use std::sync::Arc;

    async fn open_temp() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            db_path: dir.path().join("nested").join("documents.db"),
            ..Default::default()
        };
        let store = SqliteStore::open(&config).await.unwrap();
        (dir, store)
    }

    /// Unit vector at `angle` radians in the plane, padded with zeros
    fn at_angle(angle: f32) -> Vec<f32> {
        vec![angle.cos(), angle.sin(), 0.0, 0.0]
    }

    #[tokio::test]
    async fn test_open_creates_parent_dirs_and_file() {
        let (_dir, store) = open_temp().await;
        assert!(store.path().exists());
        let stats = store.get_stats().await.unwrap();
        assert_eq!(stats.total_chunks, 0);
        assert!(stats.storage_size_bytes > 0);
        assert!(stats.last_update.is_none());
    }

    #[tokio::test]
    async fn test_reopen_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            db_path: dir.path().join("documents.db"),
            ..Default::default()
        };

        let store = SqliteStore::open(&config).await.unwrap();
        store
            .save_chunk("doc_1", 0, "persisted", &[1.0, 0.0], Some("a.txt"))
            .await
            .unwrap();
        store.close().await;

        let reopened = SqliteStore::open(&config).await.unwrap();
        let chunks = reopened.get_document_chunks("doc_1").await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_text, "persisted");
        assert_eq!(chunks[0].embedding, vec![1.0, 0.0]);
    }

    #[tokio::test]
    async fn test_save_rejects_empty_embedding() {
        let (_dir, store) = open_temp().await;
        let err = store
            .save_chunk("doc_1", 0, "text", &[], Some("a.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, DocvecError::InvalidInput(_)));
        assert_eq!(store.get_stats().await.unwrap().total_chunks, 0);
    }

    #[tokio::test]
    async fn test_save_rejects_blank_text() {
        let (_dir, store) = open_temp().await;
        let err = store
            .save_chunk("doc_1", 0, "   ", &[1.0], Some("a.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, DocvecError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_upsert_replaces_existing_key() {
        let (_dir, store) = open_temp().await;

        let first = store
            .save_chunk("doc_1", 0, "old text", &[1.0, 0.0], Some("a.pdf"))
            .await
            .unwrap();
        let second = store
            .save_chunk("doc_1", 0, "new text", &[0.0, 1.0, 0.5], Some("a.pdf"))
            .await
            .unwrap();

        assert_eq!(first, second);

        let chunks = store.get_document_chunks("doc_1").await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_text, "new text");
        assert_eq!(chunks[0].embedding, vec![0.0, 1.0, 0.5]);
        assert_eq!(chunks[0].embedding_dim(), 3);
        assert_eq!(store.get_stats().await.unwrap().total_chunks, 1);
    }

    #[tokio::test]
    async fn test_ids_are_monotonic() {
        let (_dir, store) = open_temp().await;
        let a = store.save_chunk("d", 0, "a", &[1.0], None).await.unwrap();
        let b = store.save_chunk("d", 1, "b", &[1.0], None).await.unwrap();
        let c = store.save_chunk("e", 0, "c", &[1.0], None).await.unwrap();
        assert!(a < b && b < c);
    }

    #[tokio::test]
    async fn test_find_similar_on_empty_store() {
        let (_dir, store) = open_temp().await;
        let results = store.find_similar(&[1.0, 0.0], 3, 0.0).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_find_similar_rejects_empty_query() {
        let (_dir, store) = open_temp().await;
        assert!(matches!(
            store.find_similar(&[], 3, 0.0).await,
            Err(DocvecError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_find_similar_floor_excludes_weak_match() {
        let (_dir, store) = open_temp().await;
        let query = at_angle(0.0);

        // cos(acos(0.9)) = 0.9, cos(acos(0.5)) = 0.5
        store
            .save_chunk("doc_a", 0, "strong match", &at_angle(0.9f32.acos()), Some("a.pdf"))
            .await
            .unwrap();
        store
            .save_chunk("doc_b", 0, "weak match", &at_angle(0.5f32.acos()), Some("b.pdf"))
            .await
            .unwrap();

        let results = store.find_similar(&query, 3, 0.65).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk_text, "strong match");
        assert_eq!(results[0].file_name.as_deref(), Some("a.pdf"));
        assert!((results[0].similarity - 0.9).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_find_similar_orders_and_limits() {
        let (_dir, store) = open_temp().await;
        for (i, angle) in [0.6f32, 0.1, 0.4, 0.2, 0.3].iter().enumerate() {
            store
                .save_chunk("doc", i as u32, &format!("chunk {i}"), &at_angle(*angle), None)
                .await
                .unwrap();
        }

        let results = store.find_similar(&at_angle(0.0), 3, -1.0).await.unwrap();
        let texts: Vec<&str> = results.iter().map(|r| r.chunk_text.as_str()).collect();
        assert_eq!(texts, vec!["chunk 1", "chunk 3", "chunk 4"]);
        for pair in results.windows(2) {
            assert!(pair[0].similarity >= pair[1].similarity);
        }
    }

    #[tokio::test]
    async fn test_find_similar_skips_other_dimensions() {
        let (_dir, store) = open_temp().await;
        store
            .save_chunk("doc_small", 0, "three dims", &[1.0, 0.0, 0.0], None)
            .await
            .unwrap();
        store
            .save_chunk("doc_large", 0, "four dims", &[1.0, 0.0, 0.0, 0.0], None)
            .await
            .unwrap();

        let results = store
            .find_similar(&[1.0, 0.0, 0.0], 10, -1.0)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document_id, "doc_small");
    }

    #[tokio::test]
    async fn test_zero_vector_never_matches() {
        let (_dir, store) = open_temp().await;
        store
            .save_chunk("doc", 0, "zero", &[0.0, 0.0], None)
            .await
            .unwrap();

        let results = store.find_similar(&[0.0, 0.0], 5, 0.0).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].similarity, 0.0);

        let results = store.find_similar(&[0.0, 0.0], 5, 0.01).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_list_documents_groups_and_orders() {
        let (_dir, store) = open_temp().await;
        for i in 0..3 {
            store
                .save_chunk("doc_old", i, "old", &[1.0], Some("old.pdf"))
                .await
                .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
        store
            .save_chunk("doc_new", 0, "new", &[1.0], Some("new.pdf"))
            .await
            .unwrap();

        let docs = store.list_documents().await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].document_id, "doc_new");
        assert_eq!(docs[0].chunk_count, 1);
        assert_eq!(docs[1].document_id, "doc_old");
        assert_eq!(docs[1].file_name.as_deref(), Some("old.pdf"));
        assert_eq!(docs[1].chunk_count, 3);
        assert!(docs[0].last_update >= docs[1].last_update);
    }

    #[tokio::test]
    async fn test_delete_document_by_file_name() {
        let (_dir, store) = open_temp().await;
        for i in 0..3 {
            store
                .save_chunk("doc_1", i, "x", &[1.0], Some("report.pdf"))
                .await
                .unwrap();
        }
        // same file name, second ingestion
        store
            .save_chunk("doc_2", 0, "x", &[1.0], Some("report.pdf"))
            .await
            .unwrap();
        store
            .save_chunk("doc_3", 0, "y", &[1.0], Some("other.pdf"))
            .await
            .unwrap();

        let before = store.get_stats().await.unwrap().total_chunks;
        let deleted = store.delete_document("report.pdf").await.unwrap();
        assert_eq!(deleted, 4);

        let after = store.get_stats().await.unwrap();
        assert_eq!(after.total_chunks, before - deleted);
        assert_eq!(after.total_documents, 1);

        let docs = store.list_documents().await.unwrap();
        assert!(docs
            .iter()
            .all(|d| d.file_name.as_deref() != Some("report.pdf")));
    }

    #[tokio::test]
    async fn test_delete_missing_document_is_zero() {
        let (_dir, store) = open_temp().await;
        assert_eq!(store.delete_document("nope.pdf").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_clear_all_documents() {
        let (_dir, store) = open_temp().await;
        for i in 0..10u32 {
            store
                .save_chunk(&format!("doc_{}", i % 3), i, "text", &[1.0, 2.0], Some("f.pdf"))
                .await
                .unwrap();
        }

        assert_eq!(store.clear_all_documents().await.unwrap(), 10);
        assert!(store.list_documents().await.unwrap().is_empty());
        assert_eq!(store.get_stats().await.unwrap().total_chunks, 0);
    }

    #[tokio::test]
    async fn test_stats_counts_distinct_documents() {
        let (_dir, store) = open_temp().await;
        store.save_chunk("a", 0, "x", &[1.0], None).await.unwrap();
        store.save_chunk("a", 1, "x", &[1.0], None).await.unwrap();
        store.save_chunk("b", 0, "x", &[1.0], None).await.unwrap();

        let stats = store.get_stats().await.unwrap();
        assert_eq!(stats.total_documents, 2);
        assert_eq!(stats.total_chunks, 3);
        assert!(stats.last_update.is_some());
    }

    #[tokio::test]
    async fn test_concurrent_reads_and_writes() {
        let (_dir, store) = open_temp().await;
        let store = Arc::new(store);

        let mut handles = Vec::new();
        for doc in 0..4 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                for i in 0..5u32 {
                    store
                        .save_chunk(&format!("doc_{doc}"), i, "text", &[1.0, 0.5], None)
                        .await
                        .unwrap();
                    store.find_similar(&[1.0, 0.5], 3, 0.0).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.get_stats().await.unwrap().total_chunks, 20);
    }

    #[tokio::test]
    async fn test_find_similar_hydrates_across_batches() {
        let (_dir, store) = open_temp().await;
        let total = HYDRATE_BATCH * 2 + 7;
        let blob = codec::encode(&[1.0, 0.0]).unwrap();

        let mut tx = store.pool.begin().await.unwrap();
        for i in 0..total {
            sqlx::query(
                r#"
                INSERT INTO document_chunks (
                    document_id, file_name, chunk_index, chunk_text,
                    embedding, embedding_dim, created_at
                ) VALUES ('doc_bulk', 'bulk.txt', ?, ?, ?, 2, 0)
                "#,
            )
            .bind(i as i64)
            .bind(format!("chunk {i}"))
            .bind(&blob)
            .execute(&mut *tx)
            .await
            .unwrap();
        }
        tx.commit().await.unwrap();

        let results = store.find_similar(&[1.0, 0.0], total, 0.0).await.unwrap();
        assert_eq!(results.len(), total);
        assert!(results.iter().all(|r| r.chunk_text == format!("chunk {}", r.chunk_index)));
    }

    #[tokio::test]
    async fn test_created_at_follows_commit_order() {
        let (_dir, store) = open_temp().await;
        let store = Arc::new(store);

        let mut handles = Vec::new();
        for doc in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                for i in 0..10u32 {
                    store
                        .save_chunk(&format!("doc_{doc}"), i, "text", &[1.0, 0.0], None)
                        .await
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let stamps: Vec<(i64,)> =
            sqlx::query_as("SELECT created_at FROM document_chunks ORDER BY id")
                .fetch_all(&store.pool)
                .await
                .unwrap();
        assert_eq!(stamps.len(), 80);
        assert!(stamps.windows(2).all(|w| w[0].0 <= w[1].0));
    }
}
