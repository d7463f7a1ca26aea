//! A deterministic, offline stand-in for a real embedding model.
//!
//! Real deployments plug in an embedding model (local or remote) behind
//! `docsync_core::traits::Embedder`; this hash-based implementation lets
//! the CLI run end-to-end without one, e.g. in CI or for a first trial run.

use async_trait::async_trait;
use docsync_core::error::Result;
use docsync_core::traits::Embedder;

pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let hash = text.bytes().fold(0u64, |acc, b| acc.wrapping_add(b as u64));
                let mut embedding = vec![0.0f32; self.dimension];
                for (i, v) in embedding.iter_mut().enumerate() {
                    *v = ((hash.wrapping_mul(i as u64 + 1)) as f32 % 1000.0) / 1000.0 - 0.5;
                }
                let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm > 0.0 {
                    for x in &mut embedding {
                        *x /= norm;
                    }
                }
                embedding
            })
            .collect())
    }

    fn model_id(&self) -> &str {
        "hash-embedder-v1"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn embeddings_are_deterministic_and_normalized() {
        let embedder = HashEmbedder::new(16);
        let a = embedder.embed(&["hello".to_string()]).await.unwrap();
        let b = embedder.embed(&["hello".to_string()]).await.unwrap();
        assert_eq!(a, b);
        let norm: f32 = a[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn different_text_yields_different_embedding() {
        let embedder = HashEmbedder::new(16);
        let a = embedder.embed(&["hello".to_string()]).await.unwrap();
        let b = embedder.embed(&["goodbye".to_string()]).await.unwrap();
        assert_ne!(a, b);
    }
}
