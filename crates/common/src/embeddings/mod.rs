//! Embedding service abstraction.
//!
//! Providers: OpenAI-compatible HTTP, a deterministic mock for tests, and a
//! bounded TF-IDF fallback for degraded environments with no embedding provider
//! configured at all. `FallbackEmbedder` wires a primary and secondary provider
//! together with the spec's batch-level (not per-text) failover semantics.

use crate::errors::{AppError, Result};
use crate::metrics::record_embedding;
use async_trait::async_trait;
use backoff::{future::retry, Error as BackoffError, ExponentialBackoff};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Trait for embedding generation.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts, preserving order. Empty input
    /// returns empty output.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Model name, for logging and provenance.
    fn model_name(&self) -> &str;

    /// Declared output dimension.
    fn dimension(&self) -> usize;
}

/// OpenAI-compatible embedding client.
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dimension: usize,
    base_url: String,
}

#[derive(Serialize)]
struct OpenAIRequest {
    input: Vec<String>,
    model: String,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    data: Vec<OpenAIEmbedding>,
}

#[derive(Deserialize)]
struct OpenAIEmbedding {
    embedding: Vec<f32>,
}

impl OpenAIEmbedder {
    pub fn new(api_key: String, model: Option<String>, base_url: Option<String>) -> Self {
        let model = model.unwrap_or_else(|| crate::DEFAULT_EMBEDDING_MODEL.to_string());
        let dimension = match model.as_str() {
            "text-embedding-ada-002" => 1536,
            "text-embedding-3-small" => 1536,
            "text-embedding-3-large" => 3072,
            _ => crate::DEFAULT_EMBEDDING_DIMENSION,
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build embedding HTTP client");

        Self {
            client,
            api_key,
            model,
            dimension,
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
        }
    }

    /// Exponential backoff over transient provider errors: 1s, 2s, 4s, giving
    /// up once the elapsed retry window exceeds 7s.
    async fn request_with_retry(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let started = Instant::now();
        let backoff = ExponentialBackoff {
            initial_interval: Duration::from_secs(1),
            multiplier: 2.0,
            max_interval: Duration::from_secs(4),
            max_elapsed_time: Some(Duration::from_secs(7)),
            ..Default::default()
        };

        let result = retry(backoff, || async {
            self.make_request(texts).await.map_err(|e| {
                tracing::warn!(error = %e, "embedding request failed, retrying");
                BackoffError::transient(e)
            })
        })
        .await;

        record_embedding(started.elapsed().as_secs_f64(), &self.model, result.is_ok());
        result
    }

    async fn make_request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);

        let request = OpenAIRequest {
            input: texts.to_vec(),
            model: self.model.clone(),
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::EmbeddingError {
                message: format!("request failed: {e}"),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::EmbeddingError {
                message: format!("API error {status}: {body}"),
            });
        }

        let result: OpenAIResponse = response
            .json()
            .await
            .map_err(|e| AppError::EmbeddingError {
                message: format!("failed to parse response: {e}"),
            })?;

        Ok(result.data.into_iter().map(|e| e.embedding).collect())
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.request_with_retry(&[text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| AppError::EmbeddingError {
                message: "empty response".to_string(),
            })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        const BATCH_SIZE: usize = 100;
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(BATCH_SIZE) {
            let embeddings = self.request_with_retry(chunk).await?;
            all_embeddings.extend(embeddings);
        }

        Ok(all_embeddings)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Deterministic mock embedder for tests and offline development.
pub struct MockEmbedder {
    dimension: usize,
}

impl MockEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        Ok((0..self.dimension).map(|_| rng.gen::<f32>()).collect())
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for _ in texts {
            embeddings.push(self.embed("").await?);
        }
        Ok(embeddings)
    }

    fn model_name(&self) -> &str {
        "mock-embedding"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Bounded TF-IDF vectorizer used as a last-resort embedding path when no
/// provider is configured at all. Opt-in per call site (e.g. gap detection in
/// a degraded environment) — it must never silently substitute in the normal
/// embedding path.
pub struct TfIdfEmbedder {
    max_concepts: usize,
    max_features: usize,
}

impl TfIdfEmbedder {
    pub fn new(max_concepts: usize, max_features: usize) -> Self {
        Self {
            max_concepts,
            max_features,
        }
    }

    fn tokenize(text: &str) -> Vec<String> {
        text.split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
            .filter(|w| !w.is_empty())
            .collect()
    }

    /// Builds a single document's TF-IDF vector against the corpus-wide document
    /// frequency table, hashing terms into `max_features` buckets.
    fn vectorize(&self, text: &str, doc_freq: &HashMap<String, usize>, num_docs: usize) -> Vec<f32> {
        let tokens = Self::tokenize(text);
        let mut term_freq: HashMap<String, usize> = HashMap::new();
        for t in &tokens {
            *term_freq.entry(t.clone()).or_insert(0) += 1;
        }

        let mut vector = vec![0f32; self.max_features];
        let total_terms = tokens.len().max(1) as f32;

        for (term, tf) in term_freq.iter().take(self.max_concepts) {
            let df = *doc_freq.get(term).unwrap_or(&1) as f32;
            let idf = ((num_docs as f32 + 1.0) / (df + 1.0)).ln() + 1.0;
            let weight = (*tf as f32 / total_terms) * idf;
            let bucket = (hash_term(term) as usize) % self.max_features;
            vector[bucket] += weight;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in vector.iter_mut() {
                *v /= norm;
            }
        }
        vector
    }
}

fn hash_term(term: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    term.hash(&mut hasher);
    hasher.finish()
}

#[async_trait]
impl Embedder for TfIdfEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut doc_freq = HashMap::new();
        for term in Self::tokenize(text).into_iter().collect::<std::collections::HashSet<_>>() {
            doc_freq.insert(term, 1);
        }
        Ok(self.vectorize(text, &doc_freq, 1))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        for text in texts {
            let unique: std::collections::HashSet<String> =
                Self::tokenize(text).into_iter().collect();
            for term in unique {
                *doc_freq.entry(term).or_insert(0) += 1;
            }
        }

        Ok(texts
            .iter()
            .map(|t| self.vectorize(t, &doc_freq, texts.len()))
            .collect())
    }

    fn model_name(&self) -> &str {
        "tfidf-fallback"
    }

    fn dimension(&self) -> usize {
        self.max_features
    }
}

/// Wraps a primary and secondary embedder. On repeated primary failure, fails
/// over to the secondary *for the remainder of the batch only* and emits a
/// structured "provider switched" event; never returns partial results silently.
pub struct FallbackEmbedder {
    primary: Arc<dyn Embedder>,
    secondary: Arc<dyn Embedder>,
}

impl FallbackEmbedder {
    pub fn new(primary: Arc<dyn Embedder>, secondary: Arc<dyn Embedder>) -> Self {
        Self { primary, secondary }
    }
}

#[async_trait]
impl Embedder for FallbackEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        match self.primary.embed(text).await {
            Ok(v) => Ok(v),
            Err(primary_err) => {
                tracing::warn!(
                    error = %primary_err,
                    primary = self.primary.model_name(),
                    secondary = self.secondary.model_name(),
                    "embedding provider switched"
                );
                self.secondary.embed(text).await.map_err(|secondary_err| {
                    AppError::EmbeddingUnavailable {
                        message: format!(
                            "primary failed ({primary_err}) and secondary failed ({secondary_err})"
                        ),
                    }
                })
            }
        }
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        match self.primary.embed_batch(texts).await {
            Ok(v) => Ok(v),
            Err(primary_err) => {
                tracing::warn!(
                    error = %primary_err,
                    primary = self.primary.model_name(),
                    secondary = self.secondary.model_name(),
                    batch_size = texts.len(),
                    "embedding provider switched for remaining batch"
                );
                self.secondary.embed_batch(texts).await.map_err(|secondary_err| {
                    AppError::EmbeddingUnavailable {
                        message: format!(
                            "primary failed ({primary_err}) and secondary failed ({secondary_err})"
                        ),
                    }
                })
            }
        }
    }

    fn model_name(&self) -> &str {
        self.primary.model_name()
    }

    fn dimension(&self) -> usize {
        self.primary.dimension()
    }
}

/// Create an embedder from configuration.
pub fn create_embedder(
    provider: &str,
    api_key: Option<String>,
    model: Option<String>,
    base_url: Option<String>,
) -> Arc<dyn Embedder> {
    match provider {
        "openai" => {
            let key = api_key.expect("OpenAI API key required");
            Arc::new(OpenAIEmbedder::new(key, model, base_url))
        }
        "mock" => Arc::new(MockEmbedder::new(crate::DEFAULT_EMBEDDING_DIMENSION)),
        "tfidf" => Arc::new(TfIdfEmbedder::new(1200, 64)),
        _ => {
            tracing::warn!(provider, "unknown embedding provider, using mock");
            Arc::new(MockEmbedder::new(crate::DEFAULT_EMBEDDING_DIMENSION))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_embedder() {
        let embedder = MockEmbedder::new(1536);
        let embedding = embedder.embed("test text").await.unwrap();
        assert_eq!(embedding.len(), 1536);
    }

    #[tokio::test]
    async fn test_mock_batch_empty_input() {
        let embedder = MockEmbedder::new(1536);
        let embeddings = embedder.embed_batch(&[]).await.unwrap();
        assert!(embeddings.is_empty());
    }

    #[tokio::test]
    async fn test_tfidf_dimension_is_bounded() {
        let embedder = TfIdfEmbedder::new(1200, 64);
        let v = embedder.embed("graph neural networks for literature review").await.unwrap();
        assert_eq!(v.len(), 64);
    }

    #[tokio::test]
    async fn test_tfidf_batch_preserves_order_and_count() {
        let embedder = TfIdfEmbedder::new(1200, 64);
        let texts = vec!["concept one".to_string(), "concept two".to_string()];
        let vectors = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(vectors.len(), 2);
    }

    #[tokio::test]
    async fn test_fallback_uses_secondary_when_primary_fails() {
        struct AlwaysFails;
        #[async_trait]
        impl Embedder for AlwaysFails {
            async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
                Err(AppError::EmbeddingError {
                    message: "simulated failure".into(),
                })
            }
            async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
                Err(AppError::EmbeddingError {
                    message: "simulated failure".into(),
                })
            }
            fn model_name(&self) -> &str {
                "always-fails"
            }
            fn dimension(&self) -> usize {
                1536
            }
        }

        let primary: Arc<dyn Embedder> = Arc::new(AlwaysFails);
        let secondary: Arc<dyn Embedder> = Arc::new(MockEmbedder::new(1536));
        let fallback = FallbackEmbedder::new(primary, secondary);

        let result = fallback.embed("test").await.unwrap();
        assert_eq!(result.len(), 1536);
    }
}
