use async_trait::async_trait;
use codegraph_core::{content_hash, CodeGraphError, Result};
use dashmap::DashMap;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Unified trait for embedding providers (§4.5), mirroring the provider
/// abstraction already used across the codebase's remote-model clients.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
    fn dimension(&self) -> usize;
    fn name(&self) -> &'static str;
}

/// Always-available fallback tier: a deterministic fixed-dimension vector
/// derived from simple lexical features (hashed token buckets, L2-
/// normalized). No network access and no model weights, so it can never be
/// unavailable — the property the remote tier cannot guarantee.
pub struct LocalDeterministicProvider {
    dimension: usize,
}

impl LocalDeterministicProvider {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn features(&self, text: &str) -> Vec<f32> {
        let mut buckets = vec![0f32; self.dimension];
        for token in text.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
            let lower = token.to_lowercase();
            let digest = content_hash(lower.as_bytes());
            let bucket = (u8::from_str_radix(&digest[0..2], 16).unwrap_or(0) as usize) % self.dimension;
            // Second hash byte's parity sets sign, spreading tokens across +/- so
            // unrelated texts don't collapse toward an all-positive vector.
            let sign = if u8::from_str_radix(&digest[2..4], 16).unwrap_or(0) % 2 == 0 { 1.0 } else { -1.0 };
            buckets[bucket] += sign;
        }
        let norm = buckets.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in buckets.iter_mut() {
                *v /= norm;
            }
        }
        buckets
    }
}

#[async_trait]
impl EmbeddingProvider for LocalDeterministicProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.features(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &'static str {
        "local-deterministic"
    }
}

#[derive(Debug, Serialize)]
struct SummarizerRequest<'a> {
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct SummarizerResponse {
    embedding: Vec<f32>,
}

/// Remote semantic tier: POSTs to a configured summarizer endpoint with a
/// 2s timeout (§4.5). Errors and timeouts are the caller's signal to fall
/// back to the local tier — this provider never retries internally.
pub struct RemoteSemanticProvider {
    client: Client,
    endpoint: String,
    dimension: usize,
}

impl RemoteSemanticProvider {
    pub fn new(endpoint: impl Into<String>, dimension: usize) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .map_err(|e| CodeGraphError::Configuration(e.to_string()))?;
        Ok(Self { client, endpoint: endpoint.into(), dimension })
    }
}

#[async_trait]
impl EmbeddingProvider for RemoteSemanticProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&SummarizerRequest { input: text })
            .send()
            .await
            .map_err(|e| CodeGraphError::Timeout(format!("summarizer request: {e}")))?;

        let parsed: SummarizerResponse = response
            .error_for_status()
            .map_err(|e| CodeGraphError::StoreUnavailable(format!("summarizer: {e}")))?
            .json()
            .await
            .map_err(|e| CodeGraphError::Internal(format!("summarizer response: {e}")))?;
        Ok(parsed.embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &'static str {
        "remote-semantic"
    }
}

/// Content-addressed cache in front of an [`EmbeddingProvider`], keyed by the
/// sha256 of `provider_name + text` so the local and remote tiers never
/// collide in the same cache (§4.5).
pub struct CachedEmbedder<P: EmbeddingProvider> {
    inner: P,
    cache: DashMap<String, Vec<f32>>,
}

impl<P: EmbeddingProvider> CachedEmbedder<P> {
    pub fn new(inner: P) -> Self {
        Self { inner, cache: DashMap::new() }
    }

    fn cache_key(&self, text: &str) -> String {
        content_hash(format!("{}:{}", self.inner.name(), text).as_bytes())
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let key = self.cache_key(text);
        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached.clone());
        }
        let embedding = self.inner.embed(text).await?;
        self.cache.insert(key, embedding.clone());
        Ok(embedding)
    }

    pub fn dimension(&self) -> usize {
        self.inner.dimension()
    }
}

/// Composes the local and remote tiers: tries remote first when configured,
/// falls back to local on any error (§4.5 "local deterministic tier always
/// available; remote tier layered on top").
pub struct TieredEmbedder {
    local: Arc<CachedEmbedder<LocalDeterministicProvider>>,
    remote: Option<Arc<CachedEmbedder<RemoteSemanticProvider>>>,
}

impl TieredEmbedder {
    pub fn local_only(dimension: usize) -> Self {
        Self {
            local: Arc::new(CachedEmbedder::new(LocalDeterministicProvider::new(dimension))),
            remote: None,
        }
    }

    pub fn with_remote(dimension: usize, summarizer_url: &str) -> Result<Self> {
        let remote = RemoteSemanticProvider::new(summarizer_url, dimension)?;
        Ok(Self {
            local: Arc::new(CachedEmbedder::new(LocalDeterministicProvider::new(dimension))),
            remote: Some(Arc::new(CachedEmbedder::new(remote))),
        })
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(remote) = &self.remote {
            match remote.embed(text).await {
                Ok(vector) => return Ok(vector),
                Err(e) => {
                    warn!(error = %e, "remote embedding tier unavailable, falling back to local");
                }
            }
        }
        self.local.embed(text).await
    }

    pub fn dimension(&self) -> usize {
        self.local.dimension()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_tier_is_deterministic_and_normalized() {
        let provider = LocalDeterministicProvider::new(32);
        let a = provider.embed("fn parse(x: Token) -> Ast").await.unwrap();
        let b = provider.embed("fn parse(x: Token) -> Ast").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4 || norm == 0.0);
    }

    #[tokio::test]
    async fn distinct_texts_generally_diverge() {
        let provider = LocalDeterministicProvider::new(64);
        let a = provider.embed("parseExpression").await.unwrap();
        let b = provider.embed("serializeResponse").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn cache_returns_identical_vector_without_recomputation() {
        let embedder = CachedEmbedder::new(LocalDeterministicProvider::new(16));
        let a = embedder.embed("alpha").await.unwrap();
        let b = embedder.embed("alpha").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(embedder.cache.len(), 1);
    }

    #[tokio::test]
    async fn tiered_embedder_falls_back_to_local_when_remote_unreachable() {
        let tiered = TieredEmbedder::with_remote(16, "http://127.0.0.1:1").unwrap();
        let vector = tiered.embed("hello world").await.unwrap();
        assert_eq!(vector.len(), 16);
    }
}
