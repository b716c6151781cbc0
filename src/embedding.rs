//! Embedding provider abstraction and the OpenAI implementation.
//!
//! [`embed_text`] is the entry point the pipelines use. It never fails: when
//! the provider is unconfigured or misbehaves, the caller gets an all-zero
//! vector of the configured dimension and an [`Outcome`](crate::outcome::Outcome) saying so.
//!
//! Also provides the vector helpers used by the document store:
//! - [`vec_to_blob`] / [`blob_to_vec`] — little-endian `f32` BLOB encoding
//! - [`l2_distance`] — Euclidean distance used for nearest-neighbor ranking

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::config::Config;
use crate::outcome::{Generated, ProviderError};
use crate::settings::ApiKeyStore;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier (e.g. `"text-embedding-ada-002"`).
    fn model_name(&self) -> &str;
    /// Length of every vector this provider hands out.
    fn dims(&self) -> usize;
    /// One provider call. May fail; callers go through [`embed_text`].
    async fn embed_raw(&self, text: &str) -> Result<Vec<f32>, ProviderError>;
}

/// Embed `text`, falling back to a zero vector on any provider problem.
///
/// The returned vector always has exactly `provider.dims()` values. A
/// provider answer of the wrong length counts as a failure.
pub async fn embed_text(provider: &dyn EmbeddingProvider, text: &str) -> Generated<Vec<f32>> {
    let dims = provider.dims();

    let err = match provider.embed_raw(text).await {
        Ok(vec) if vec.len() == dims => return Generated::success(vec),
        Ok(vec) => ProviderError::InvalidResponse(format!(
            "expected {} dimensions, got {}",
            dims,
            vec.len()
        )),
        Err(e) => e,
    };

    if let ProviderError::MissingKey = err {
        tracing::warn!("OPENAI_API_KEY not set, returning zero embedding");
    } else {
        tracing::warn!(
            error = %err,
            model = provider.model_name(),
            "embedding failed, returning zero embedding"
        );
    }
    Generated::fallback(vec![0.0; dims], &err)
}

/// Embedding provider backed by `POST {base_url}/embeddings`.
pub struct OpenAIEmbedder {
    client: Client,
    base_url: String,
    model: String,
    dims: usize,
    keys: ApiKeyStore,
}

impl OpenAIEmbedder {
    pub fn new(config: &Config, keys: ApiKeyStore) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.openai.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.openai.base_url.trim_end_matches('/').to_string(),
            model: config.embedding.model.clone(),
            dims: config.embedding.dims,
            keys,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_raw(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let api_key = self.keys.current().await.ok_or(ProviderError::MissingKey)?;

        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let json: serde_json::Value = response.json().await?;
        parse_openai_response(&json)
    }
}

/// Pull `data[0].embedding` out of an embeddings response.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<f32>, ProviderError> {
    let embedding = json
        .get("data")
        .and_then(|d| d.get(0))
        .and_then(|item| item.get("embedding"))
        .and_then(|e| e.as_array())
        .ok_or_else(|| ProviderError::InvalidResponse("missing data[0].embedding".into()))?;

    embedding
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| ProviderError::InvalidResponse("non-numeric embedding value".into()))
        })
        .collect()
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB written by [`vec_to_blob`].
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Euclidean distance between two vectors.
///
/// Vectors of different lengths are infinitely far apart, so a stale entry
/// written under another dimension never outranks a real match. A distance
/// that comes out NaN (non-finite components) is also reported as infinite.
pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::INFINITY;
    }

    let d = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt();

    if d.is_nan() {
        f32::INFINITY
    } else {
        d
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::Outcome;
    use std::path::PathBuf;

    struct Scripted {
        dims: usize,
        reply: fn() -> Result<Vec<f32>, ProviderError>,
    }

    #[async_trait]
    impl EmbeddingProvider for Scripted {
        fn model_name(&self) -> &str {
            "scripted"
        }
        fn dims(&self) -> usize {
            self.dims
        }
        async fn embed_raw(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
            (self.reply)()
        }
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        let p = Scripted {
            dims: 3,
            reply: || Ok(vec![0.1, 0.2, 0.3]),
        };
        let g = embed_text(&p, "hello").await;
        assert_eq!(g.value, vec![0.1, 0.2, 0.3]);
        assert!(g.outcome.is_success());
    }

    #[tokio::test]
    async fn test_wrong_length_is_zero_filled() {
        let p = Scripted {
            dims: 4,
            reply: || Ok(vec![1.0, 2.0]),
        };
        let g = embed_text(&p, "hello").await;
        assert_eq!(g.value, vec![0.0; 4]);
        assert!(matches!(g.outcome, Outcome::Failed(_)));
    }

    #[tokio::test]
    async fn test_missing_key_degrades_to_configured_dims() {
        let mut config = Config::default();
        config.embedding.dims = 16;
        let keys = ApiKeyStore::with_key(None, PathBuf::from("unused.env"));
        let p = OpenAIEmbedder::new(&config, keys).unwrap();

        let long = "long ".repeat(500);
        for text in ["", "short", long.as_str()] {
            let g = embed_text(&p, text).await;
            assert_eq!(g.value.len(), 16);
            assert!(g.value.iter().all(|v| *v == 0.0));
            assert_eq!(g.outcome, Outcome::Degraded);
        }
    }

    #[test]
    fn test_parse_response() {
        let json = serde_json::json!({"data": [{"embedding": [0.5, -1.0]}]});
        assert_eq!(parse_openai_response(&json).unwrap(), vec![0.5, -1.0]);

        let bad = serde_json::json!({"data": []});
        assert!(parse_openai_response(&bad).is_err());
    }

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }

    #[test]
    fn test_l2_distance() {
        assert_eq!(l2_distance(&[0.0, 0.0], &[3.0, 4.0]), 5.0);
        assert_eq!(l2_distance(&[1.0, 1.0], &[1.0, 1.0]), 0.0);
        assert_eq!(l2_distance(&[1.0], &[1.0, 0.0]), f32::INFINITY);
        assert_eq!(l2_distance(&[f32::INFINITY], &[f32::INFINITY]), f32::INFINITY);
        assert_eq!(l2_distance(&[f32::NAN], &[0.0]), f32::INFINITY);
    }
}
