//! The pair of model-backed adapters both pipelines run against.

use anyhow::Result;
use std::sync::Arc;

use crate::analyzer::{ContentAnalyzer, OpenAIAnalyzer};
use crate::config::Config;
use crate::embedding::{EmbeddingProvider, OpenAIEmbedder};
use crate::settings::ApiKeyStore;

#[derive(Clone)]
pub struct Providers {
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub analyzer: Arc<dyn ContentAnalyzer>,
}

impl Providers {
    /// OpenAI-backed adapters sharing one key store.
    pub fn openai(config: &Config, keys: ApiKeyStore) -> Result<Self> {
        Ok(Self {
            embedder: Arc::new(OpenAIEmbedder::new(config, keys.clone())?),
            analyzer: Arc::new(OpenAIAnalyzer::new(config, keys)?),
        })
    }
}
