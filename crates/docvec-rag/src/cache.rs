//! Embedding cache
//!
//! Wraps an [`EmbeddingClient`] so repeated texts (duplicate fragments,
//! repeated questions) are embedded once. Uses the moka crate for a
//! thread-safe, async-compatible bounded cache with TTL.
//!
//! Author: hephaex@gmail.com

use async_trait::async_trait;
use docvec_core::{DocvecError, EmbeddingClient, Result};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Embeddings are stable for a given model
const EMBEDDING_TTL: Duration = Duration::from_secs(3600);

/// Caching decorator over an embedding provider
#[derive(Clone)]
pub struct CachedEmbedding {
    inner: Arc<dyn EmbeddingClient>,
    cache: Cache<String, Vec<f32>>,
    stats: Arc<CacheStats>,
}

impl CachedEmbedding {
    /// Cache up to `max_capacity` embeddings produced by `inner`
    pub fn new(inner: Arc<dyn EmbeddingClient>, max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(EMBEDDING_TTL)
            .build();

        Self {
            inner,
            cache,
            stats: Arc::new(CacheStats::default()),
        }
    }

    /// Get cache statistics
    pub fn stats(&self) -> Arc<CacheStats> {
        Arc::clone(&self.stats)
    }

    /// Get current cache size
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Drop every cached embedding
    pub async fn clear(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }

    async fn lookup(&self, text: &str) -> Option<Vec<f32>> {
        let result = self.cache.get(text).await;
        if result.is_some() {
            self.stats.record_hit();
        } else {
            self.stats.record_miss();
        }
        result
    }

    async fn store(&self, text: &str, embedding: &[f32]) {
        self.cache.insert(text.to_string(), embedding.to_vec()).await;
        self.stats.record_write();
    }
}

#[async_trait]
impl EmbeddingClient for CachedEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(embedding) = self.lookup(text).await {
            return Ok(embedding);
        }

        let embedding = self.inner.embed(text).await?;
        self.store(text, &embedding).await;
        Ok(embedding)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());
        let mut missing = Vec::new();

        for text in texts {
            let cached = self.lookup(text).await;
            if cached.is_none() {
                missing.push(text.clone());
            }
            results.push(cached);
        }

        if !missing.is_empty() {
            let computed = self.inner.embed_batch(&missing).await?;
            if computed.len() != missing.len() {
                return Err(DocvecError::Provider(format!(
                    "Expected {} embeddings, provider returned {}",
                    missing.len(),
                    computed.len()
                )));
            }

            let mut computed = computed.into_iter();
            for (slot, text) in results.iter_mut().zip(texts) {
                if slot.is_some() {
                    continue;
                }
                if let Some(embedding) = computed.next() {
                    self.store(text, &embedding).await;
                    *slot = Some(embedding);
                }
            }
        }

        results
            .into_iter()
            .map(|slot| {
                slot.ok_or_else(|| DocvecError::Provider("Missing embedding".to_string()))
            })
            .collect()
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

// ============================================================================
// Cache Statistics
// ============================================================================

/// Statistics for cache performance monitoring
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
}

impl CacheStats {
    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    /// Get total hits
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Get total misses
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Get total writes
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Get total requests (hits + misses)
    pub fn total_requests(&self) -> u64 {
        self.hits() + self.misses()
    }

    /// Calculate hit rate (0.0 - 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            0.0
        } else {
            self.hits() as f64 / total as f64
        }
    }

    /// Get a summary report
    pub fn report(&self) -> CacheStatsReport {
        CacheStatsReport {
            hits: self.hits(),
            misses: self.misses(),
            writes: self.writes(),
            total_requests: self.total_requests(),
            hit_rate: self.hit_rate(),
        }
    }
}

/// Serializable cache statistics report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatsReport {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub total_requests: u64,
    /// Hit rate (0.0 - 1.0)
    pub hit_rate: f64,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    /// Embeds text as `[len, 1.0]` and counts provider calls
    #[derive(Default)]
    struct CountingEmbedder {
        calls: AtomicUsize,
        texts: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingClient for CountingEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.texts.fetch_add(1, Ordering::SeqCst);
            Ok(vec![text.len() as f32, 1.0])
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.texts.fetch_add(texts.len(), Ordering::SeqCst);
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "counting"
        }
    }

    fn cached() -> (Arc<CountingEmbedder>, CachedEmbedding) {
        let inner = Arc::new(CountingEmbedder::default());
        let cache = CachedEmbedding::new(inner.clone(), 100);
        (inner, cache)
    }

    #[tokio::test]
    async fn test_repeated_embed_hits_cache() {
        let (inner, cache) = cached();

        let first = cache.embed("hello").await.unwrap();
        let second = cache.embed("hello").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().hits(), 1);
        assert_eq!(cache.stats().misses(), 1);
        assert_eq!(cache.stats().writes(), 1);
    }

    #[tokio::test]
    async fn test_batch_only_embeds_misses_in_order() {
        let (inner, cache) = cached();
        cache.embed("bb").await.unwrap();

        let texts = vec!["a".to_string(), "bb".to_string(), "ccc".to_string()];
        let out = cache.embed_batch(&texts).await.unwrap();

        assert_eq!(out, vec![vec![1.0, 1.0], vec![2.0, 1.0], vec![3.0, 1.0]]);
        // one single embed, then one batch of the two misses
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
        assert_eq!(inner.texts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fully_cached_batch_skips_provider() {
        let (inner, cache) = cached();
        let texts = vec!["x".to_string(), "y".to_string()];
        cache.embed_batch(&texts).await.unwrap();
        cache.embed_batch(&texts).await.unwrap();

        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
        assert!((cache.stats().hit_rate() - 0.5).abs() < 0.001);
    }

    #[tokio::test]
    async fn test_clear_forces_recompute() {
        let (inner, cache) = cached();
        cache.embed("text").await.unwrap();
        cache.clear().await;
        cache.embed("text").await.unwrap();

        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_delegates_metadata() {
        let (_inner, cache) = cached();
        assert_eq!(cache.dimension(), 2);
        assert_eq!(cache.model_name(), "counting");
    }

    #[test]
    fn test_empty_stats_report() {
        let report = CacheStats::default().report();
        assert_eq!(report.total_requests, 0);
        assert_eq!(report.hit_rate, 0.0);
    }
}
