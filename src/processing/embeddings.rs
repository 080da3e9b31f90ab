//! Embedding generation with batching, retries and zero-vector degradation

use crate::error::{KeenEyeError, Result};
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use indicatif::ProgressBar;
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmbeddingTask {
    /// Corpus entries being indexed
    Document,
    /// A search query, e.g. a resume
    Query,
}

/// A source of fixed-dimension text embeddings.
///
/// Implementations make a single attempt per call; retries and degradation
/// belong to `EmbeddingEngine`.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn name(&self) -> &str;

    fn dimension(&self) -> usize;

    /// One vector per input text, in input order
    async fn embed(&self, texts: &[String], task: EmbeddingTask) -> Result<Vec<Vec<f32>>>;
}

/// Embeddings for a batch of texts. Every position holds a vector of the
/// provider's dimension; `degraded[i]` marks zero vectors substituted after
/// the provider kept failing for text `i`.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingBatch {
    pub vectors: Vec<Vec<f32>>,
    pub degraded: Vec<bool>,
    pub cache_hits: usize,
    pub processing_time_ms: u64,
}

impl EmbeddingBatch {
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn degraded_positions(&self) -> Vec<usize> {
        self.degraded
            .iter()
            .enumerate()
            .filter_map(|(i, &d)| d.then_some(i))
            .collect()
    }

    pub fn degraded_count(&self) -> usize {
        self.degraded.iter().filter(|d| **d).count()
    }
}

pub struct EmbeddingEngine {
    provider: Arc<dyn EmbeddingProvider>,
    retry: RetryPolicy,
    batch_size: usize,
    cache: Option<Mutex<HashMap<(EmbeddingTask, String), Vec<f32>>>>,
}

impl EmbeddingEngine {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, retry: RetryPolicy, batch_size: usize) -> Self {
        Self {
            provider,
            retry,
            batch_size: batch_size.max(1),
            cache: None,
        }
    }

    pub fn with_cache(mut self, enable: bool) -> Self {
        self.cache = enable.then(|| Mutex::new(HashMap::new()));
        self
    }

    pub fn dimension(&self) -> usize {
        self.provider.dimension()
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Embed corpus texts in fixed-size batches. Never fails: texts the
    /// provider cannot embed come back as flagged zero vectors.
    pub async fn embed_batch(&self, texts: &[String], progress: Option<&ProgressBar>) -> EmbeddingBatch {
        let start_time = Instant::now();
        let mut batch = EmbeddingBatch {
            vectors: Vec::with_capacity(texts.len()),
            degraded: Vec::with_capacity(texts.len()),
            ..Default::default()
        };

        for chunk in texts.chunks(self.batch_size) {
            let mut slots: Vec<Option<Vec<f32>>> = chunk
                .iter()
                .map(|text| self.cached(EmbeddingTask::Document, text))
                .collect();
            batch.cache_hits += slots.iter().filter(|s| s.is_some()).count();

            let pending: Vec<usize> = (0..chunk.len()).filter(|&i| slots[i].is_none()).collect();
            if !pending.is_empty() {
                let pending_texts: Vec<String> = pending.iter().map(|&i| chunk[i].clone()).collect();
                match self.embed_checked(&pending_texts, EmbeddingTask::Document).await {
                    Ok(vectors) => {
                        for (&i, vector) in pending.iter().zip(vectors) {
                            slots[i] = Some(vector);
                        }
                    }
                    Err(err) => {
                        warn!(
                            "Embedding batch of {} failed ({}); retrying texts individually",
                            pending_texts.len(),
                            err
                        );
                        for &i in &pending {
                            slots[i] = self.embed_one(&chunk[i]).await;
                        }
                    }
                }
            }

            for (text, slot) in chunk.iter().zip(slots) {
                match slot {
                    Some(vector) => {
                        self.remember(EmbeddingTask::Document, text, &vector);
                        batch.vectors.push(vector);
                        batch.degraded.push(false);
                    }
                    None => {
                        batch.vectors.push(vec![0.0; self.dimension()]);
                        batch.degraded.push(true);
                    }
                }
            }

            if let Some(bar) = progress {
                bar.inc(chunk.len() as u64);
            }
        }

        batch.processing_time_ms = start_time.elapsed().as_millis() as u64;
        if batch.degraded_count() > 0 {
            warn!(
                "{} of {} embeddings fell back to zero vectors",
                batch.degraded_count(),
                batch.len()
            );
        }
        batch
    }

    /// Embed a search query. Fails instead of degrading: a zero query vector
    /// would make every search result meaningless.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(vector) = self.cached(EmbeddingTask::Query, text) {
            return Ok(vector);
        }

        let texts = vec![text.to_string()];
        let vector = self
            .embed_checked(&texts, EmbeddingTask::Query)
            .await
            .map_err(|e| KeenEyeError::Embedding(format!("query embedding failed: {}", e)))?
            .pop()
            .ok_or_else(|| KeenEyeError::Embedding("provider returned no query vector".to_string()))?;

        self.remember(EmbeddingTask::Query, text, &vector);
        Ok(vector)
    }

    async fn embed_one(&self, text: &str) -> Option<Vec<f32>> {
        let texts = vec![text.to_string()];
        match self.embed_checked(&texts, EmbeddingTask::Document).await {
            Ok(mut vectors) => vectors.pop(),
            Err(err) => {
                warn!(
                    "Embedding failed for text ({} chars), using zero vector: {}",
                    text.len(),
                    err
                );
                None
            }
        }
    }

    /// Provider call under the retry policy, with shape validation
    async fn embed_checked(&self, texts: &[String], task: EmbeddingTask) -> Result<Vec<Vec<f32>>> {
        let label = format!("{} embedding", self.provider.name());
        let vectors = self
            .retry
            .run(&label, || self.provider.embed(texts, task))
            .await?;

        if vectors.len() != texts.len() {
            return Err(KeenEyeError::Decode(format!(
                "requested {} embeddings, provider returned {}",
                texts.len(),
                vectors.len()
            )));
        }
        let expected = self.dimension();
        for vector in &vectors {
            if vector.len() != expected {
                return Err(KeenEyeError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
            if vector.iter().any(|v| !v.is_finite()) {
                return Err(KeenEyeError::Embedding("provider returned non-finite values".to_string()));
            }
        }
        debug!("Embedded {} texts with {}", texts.len(), self.provider.name());
        Ok(vectors)
    }

    fn cached(&self, task: EmbeddingTask, text: &str) -> Option<Vec<f32>> {
        let cache = self.cache.as_ref()?;
        let guard = cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.get(&(task, text.to_string())).cloned()
    }

    fn remember(&self, task: EmbeddingTask, text: &str, vector: &[f32]) {
        if let Some(cache) = &self.cache {
            let mut guard = cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.insert((task, text.to_string()), vector.to_vec());
        }
    }

    pub fn cache_size(&self) -> usize {
        self.cache.as_ref().map_or(0, |cache| {
            cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails on any text containing "bad"; counts provider calls
    struct FlakyProvider {
        dimension: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for FlakyProvider {
        fn name(&self) -> &str {
            "flaky"
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        async fn embed(&self, texts: &[String], _task: EmbeddingTask) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if texts.iter().any(|t| t.contains("bad")) {
                return Err(KeenEyeError::Network("upstream reset".to_string()));
            }
            Ok(texts.iter().map(|t| vec![t.len() as f32; self.dimension]).collect())
        }
    }

    fn engine(dimension: usize, batch_size: usize) -> (Arc<FlakyProvider>, EmbeddingEngine) {
        let provider = Arc::new(FlakyProvider {
            dimension,
            calls: AtomicUsize::new(0),
        });
        let engine = EmbeddingEngine::new(provider.clone(), RetryPolicy::new(3, Default::default(), Default::default()), batch_size);
        (provider, engine)
    }

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_failed_items_become_flagged_zero_vectors() {
        let (_, engine) = engine(4, 5);
        let input = texts(&["alpha", "bad one", "gamma", "bad two", "epsilon"]);

        let batch = engine.embed_batch(&input, None).await;

        assert_eq!(batch.len(), 5);
        assert_eq!(batch.degraded_positions(), vec![1, 3]);
        assert_eq!(batch.vectors[1], vec![0.0; 4]);
        assert_eq!(batch.vectors[3], vec![0.0; 4]);
        assert_eq!(batch.vectors[0], vec![5.0; 4]);
        assert_eq!(batch.vectors[4], vec![7.0; 4]);
    }

    #[tokio::test]
    async fn test_batches_are_chunked() {
        let (provider, engine) = engine(2, 2);
        let batch = engine.embed_batch(&texts(&["a", "b", "c", "d", "e"]), None).await;
        assert_eq!(batch.len(), 5);
        assert_eq!(batch.degraded_count(), 0);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_query_failure_is_terminal() {
        let (provider, engine) = engine(2, 8);
        let err = engine.embed_query("bad query").await.unwrap_err();
        assert!(matches!(err, KeenEyeError::Embedding(_)));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cache_skips_provider() {
        let (provider, engine) = engine(2, 8);
        let engine = engine.with_cache(true);

        engine.embed_batch(&texts(&["x", "y"]), None).await;
        let calls = provider.calls.load(Ordering::SeqCst);
        let again = engine.embed_batch(&texts(&["x", "y"]), None).await;

        assert_eq!(again.cache_hits, 2);
        assert_eq!(provider.calls.load(Ordering::SeqCst), calls);
        assert_eq!(engine.cache_size(), 2);
    }

    struct WrongDimension;

    #[async_trait]
    impl EmbeddingProvider for WrongDimension {
        fn name(&self) -> &str {
            "wrong"
        }

        fn dimension(&self) -> usize {
            3
        }

        async fn embed(&self, texts: &[String], _task: EmbeddingTask) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 2.0]).collect())
        }
    }

    #[tokio::test]
    async fn test_wrong_dimension_degrades_documents_and_fails_queries() {
        let engine = EmbeddingEngine::new(Arc::new(WrongDimension), RetryPolicy::none(), 4);

        let batch = engine.embed_batch(&texts(&["one"]), None).await;
        assert_eq!(batch.degraded_count(), 1);
        assert_eq!(batch.vectors[0].len(), 3);

        assert!(engine.embed_query("q").await.is_err());
    }
}
