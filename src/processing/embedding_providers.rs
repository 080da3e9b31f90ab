//! Concrete embedding providers: Gemini over HTTP, local Model2Vec, and an
//! offline feature-hashing fallback

use crate::config::{Config, EmbeddingProviderKind};
use crate::error::{status_error, KeenEyeError, Result};
use crate::processing::embeddings::{EmbeddingProvider, EmbeddingTask};
use async_trait::async_trait;
use log::{debug, info};
use model2vec_rs::model::StaticModel;
use serde::{Deserialize, Serialize};
use siphasher::sip::SipHasher13;
use std::hash::Hasher;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Build the provider selected in `config`
pub fn provider_from_config(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    let providers = &config.providers;
    let dimension = config.processing.embedding_dim;
    let provider: Arc<dyn EmbeddingProvider> = match providers.embedding {
        EmbeddingProviderKind::Gemini => {
            let api_key = providers.gemini_api_key.clone().ok_or_else(|| {
                KeenEyeError::Configuration("GEMINI_API_KEY is required for Gemini embeddings".to_string())
            })?;
            Arc::new(GeminiEmbeddingProvider::new(
                &providers.embedding_base_url,
                &providers.embedding_model,
                api_key,
                dimension,
                Duration::from_secs(config.retry.request_timeout_secs),
            )?)
        }
        EmbeddingProviderKind::Model2vec => Arc::new(Model2VecProvider::load(&providers.embedding_model)?),
        EmbeddingProviderKind::Hash => Arc::new(HashEmbeddingProvider::new(dimension)),
    };
    info!(
        "Embedding provider: {} (dimension {})",
        provider.name(),
        provider.dimension()
    );
    Ok(provider)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest<'a> {
    model: String,
    content: Content<'a>,
    task_type: &'static str,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedRequest<'a>>,
}

#[derive(Deserialize)]
struct BatchEmbedResponse {
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

/// Google Generative Language `batchEmbedContents` endpoint
pub struct GeminiEmbeddingProvider {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    dimension: usize,
}

impl GeminiEmbeddingProvider {
    pub fn new(base_url: &str, model: &str, api_key: String, dimension: usize, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| KeenEyeError::Configuration(format!("Failed to build HTTP client: {}", e)))?;
        let model = model.trim_start_matches("models/").to_string();
        Ok(Self {
            http,
            endpoint: format!("{}/models/{}:batchEmbedContents", base_url.trim_end_matches('/'), model),
            model,
            api_key,
            dimension,
        })
    }

    fn task_type(task: EmbeddingTask) -> &'static str {
        match task {
            EmbeddingTask::Document => "RETRIEVAL_DOCUMENT",
            EmbeddingTask::Query => "RETRIEVAL_QUERY",
        }
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbeddingProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String], task: EmbeddingTask) -> Result<Vec<Vec<f32>>> {
        let request = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| EmbedRequest {
                    model: format!("models/{}", self.model),
                    content: Content {
                        parts: [Part { text }],
                    },
                    task_type: Self::task_type(task),
                })
                .collect(),
        };

        let response = self
            .http
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status.as_u16(), body));
        }

        let parsed: BatchEmbedResponse = response.json().await?;
        debug!("Gemini returned {} embeddings", parsed.embeddings.len());
        Ok(parsed.embeddings.into_iter().map(|e| e.values).collect())
    }
}

/// Static Model2Vec model loaded from a local path or Hugging Face repo id
pub struct Model2VecProvider {
    model: StaticModel,
    name: String,
    dimension: usize,
}

impl Model2VecProvider {
    pub fn load(repo_or_path: &str) -> Result<Self> {
        let start_time = Instant::now();
        info!("Loading Model2Vec embedding model from: {}", repo_or_path);

        let model = StaticModel::from_pretrained(repo_or_path, None, None, None)
            .map_err(|e| KeenEyeError::Embedding(format!("Failed to load model: {}", e)))?;

        // The model does not expose its width directly
        let dimension = model.encode_single("dimension probe").len();
        if dimension == 0 {
            return Err(KeenEyeError::Embedding(format!(
                "Model {} produced empty embeddings",
                repo_or_path
            )));
        }

        info!("Model loaded in {:.2?}, dimension {}", start_time.elapsed(), dimension);
        Ok(Self {
            model,
            name: format!("model2vec:{}", repo_or_path),
            dimension,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for Model2VecProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String], _task: EmbeddingTask) -> Result<Vec<Vec<f32>>> {
        Ok(self.model.encode(texts))
    }
}

const HASH_SEED_K0: u64 = 0x0123_4567_89ab_cdef;
const HASH_SEED_K1: u64 = 0xfedc_ba98_7654_3210;

/// Signed feature hashing of lowercase word tokens, L2-normalized.
/// Needs no network or model files; texts sharing vocabulary land close.
#[derive(Debug, Clone)]
pub struct HashEmbeddingProvider {
    dimension: usize,
}

impl HashEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn hash_token(token: &str) -> u64 {
        let mut hasher = SipHasher13::new_with_keys(HASH_SEED_K0, HASH_SEED_K1);
        hasher.write(token.as_bytes());
        hasher.finish()
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let lowered = text.to_lowercase();
        let tokens = lowered
            .split(|c: char| !(c.is_alphanumeric() || c == '+' || c == '#'))
            .filter(|t| !t.is_empty());

        for token in tokens {
            let idx = (Self::hash_token(token) % self.dimension as u64) as usize;
            let sign = if Self::hash_token(&format!("{}_sign", token)) % 2 == 0 {
                1.0
            } else {
                -1.0
            };
            vector[idx] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    fn name(&self) -> &str {
        "hash"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String], _task: EmbeddingTask) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::vector_index::squared_l2;

    #[test]
    fn test_hash_vectors_are_normalized_and_deterministic() {
        let provider = HashEmbeddingProvider::new(64);
        let a = provider.embed_text("Senior Python engineer, AWS and SQL");
        let b = provider.embed_text("Senior Python engineer, AWS and SQL");
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_hash_empty_text_is_zero_vector() {
        let provider = HashEmbeddingProvider::new(16);
        assert!(provider.embed_text("  ,, ").iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_hash_similar_texts_are_closer() {
        let provider = HashEmbeddingProvider::new(256);
        let query = provider.embed_text("python machine learning engineer");
        let near = provider.embed_text("machine learning engineer using python");
        let far = provider.embed_text("pastry chef bakery croissants");
        assert!(squared_l2(&query, &near) < squared_l2(&query, &far));
    }

    #[test]
    fn test_gemini_endpoint_shape() {
        let provider = GeminiEmbeddingProvider::new(
            "https://generativelanguage.googleapis.com/v1beta/",
            "models/text-embedding-004",
            "key".to_string(),
            768,
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            provider.endpoint,
            "https://generativelanguage.googleapis.com/v1beta/models/text-embedding-004:batchEmbedContents"
        );
        assert_eq!(GeminiEmbeddingProvider::task_type(EmbeddingTask::Query), "RETRIEVAL_QUERY");
    }

    #[test]
    fn test_gemini_request_serializes_camel_case() {
        let request = BatchEmbedRequest {
            requests: vec![EmbedRequest {
                model: "models/m".to_string(),
                content: Content {
                    parts: [Part { text: "hello" }],
                },
                task_type: "RETRIEVAL_DOCUMENT",
            }],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["requests"][0]["taskType"], "RETRIEVAL_DOCUMENT");
        assert_eq!(json["requests"][0]["content"]["parts"][0]["text"], "hello");
    }
}
