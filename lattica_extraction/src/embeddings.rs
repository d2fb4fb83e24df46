//! Embedding collaborator clients.
//!
//! [`HttpEmbedder`] calls the configured embedding collaborator over HTTP.
//! [`HashEmbedder`] is the deterministic offline fallback: a feature-hashed
//! bag-of-tokens vector, L2-normalized. It carries no semantics beyond token
//! overlap but it is byte-stable for identical input, which is what the
//! pipeline contract requires, and it keeps the engine fully functional with
//! no collaborator configured.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use lattica_core::{EngineError, EngineResult};

use crate::Embedder;

/// Deterministic feature-hashing embedder.
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    /// Create an embedder with the given output dimension.
    pub fn new(dimension: usize) -> Self {
        Self { dimension: dimension.max(1) }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in lattica_core::tokenize(text) {
            let digest = Sha256::digest(token.as_bytes());
            let mut prefix = [0u8; 8];
            prefix.copy_from_slice(&digest[..8]);
            let bucket = u64::from_le_bytes(prefix) % self.dimension as u64;
            // Sign from a second hash byte spreads mass around zero.
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket as usize] += sign;
        }
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String]) -> EngineResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    texts: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// HTTP client for an external embedding collaborator.
///
/// POSTs `{"texts": [...]}` and expects `{"embeddings": [[...], ...]}` with
/// one vector per input, each of the collection dimension.
pub struct HttpEmbedder {
    client: reqwest::Client,
    url: String,
    dimension: usize,
}

impl HttpEmbedder {
    /// Create a client against the collaborator URL.
    pub fn new(url: impl Into<String>, dimension: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            dimension,
        }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String]) -> EngineResult<Vec<Vec<f32>>> {
        let response = self
            .client
            .post(&self.url)
            .json(&EmbedRequest { texts })
            .send()
            .await
            .map_err(|e| EngineError::TransientDependency(format!("embedding collaborator: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(EngineError::PermanentDependency(format!(
                "embedding collaborator rejected credentials ({status})"
            )));
        }
        if !status.is_success() {
            return Err(EngineError::TransientDependency(format!(
                "embedding collaborator returned {status}"
            )));
        }

        let body: EmbedResponse = response
            .json()
            .await
            .map_err(|e| EngineError::PermanentDependency(format!("embedding response: {e}")))?;

        if body.embeddings.len() != texts.len() {
            return Err(EngineError::DataIntegrity(format!(
                "embedding collaborator returned {} vectors for {} texts",
                body.embeddings.len(),
                texts.len()
            )));
        }
        for vector in &body.embeddings {
            if vector.len() != self.dimension {
                return Err(EngineError::DataIntegrity(format!(
                    "embedding dimension mismatch: expected {}, got {}",
                    self.dimension,
                    vector.len()
                )));
            }
        }
        Ok(body.embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_embedder_deterministic() {
        let embedder = HashEmbedder::new(64);
        let a = embedder.embed(&["Acme is in Paris".to_string()]).await.unwrap();
        let b = embedder.embed(&["Acme is in Paris".to_string()]).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].len(), 64);
    }

    #[tokio::test]
    async fn test_hash_embedder_normalized() {
        let embedder = HashEmbedder::new(32);
        let v = embedder.embed(&["some text to embed".to_string()]).await.unwrap();
        let norm: f32 = v[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_hash_embedder_overlap_similarity() {
        let embedder = HashEmbedder::new(128);
        let vs = embedder
            .embed(&[
                "Acme is headquartered in Paris".to_string(),
                "Where is Acme headquartered".to_string(),
                "unrelated sailing weather report".to_string(),
            ])
            .await
            .unwrap();
        let dot = |a: &[f32], b: &[f32]| -> f32 { a.iter().zip(b).map(|(x, y)| x * y).sum() };
        let related = dot(&vs[0], &vs[1]);
        let unrelated = dot(&vs[0], &vs[2]);
        assert!(
            related > unrelated,
            "token overlap should yield higher similarity ({related} vs {unrelated})"
        );
    }

    #[tokio::test]
    async fn test_hash_embedder_empty_text() {
        let embedder = HashEmbedder::new(16);
        let v = embedder.embed(&[String::new()]).await.unwrap();
        assert!(v[0].iter().all(|x| *x == 0.0));
    }

    #[tokio::test]
    async fn test_hash_embedder_batch_order_preserved() {
        let embedder = HashEmbedder::new(16);
        let batch = embedder
            .embed(&["first text".to_string(), "second text".to_string()])
            .await
            .unwrap();
        let first = embedder.embed(&["first text".to_string()]).await.unwrap();
        assert_eq!(batch[0], first[0]);
    }

    #[tokio::test]
    async fn test_http_embedder_unreachable_is_transient() {
        // Port 9 (discard) is never listening in the test environment.
        let embedder = HttpEmbedder::new("http://127.0.0.1:9/embed", 8);
        let err = embedder.embed(&["text".to_string()]).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
