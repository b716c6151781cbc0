//! Process-wide OpenAI API key.
//!
//! The key is shared by the embedding and analysis adapters, so saving a new
//! one through `POST /settings/openai_key` applies to the next provider call
//! without a restart. It is persisted as `OPENAI_API_KEY=...` in a dotenv
//! file; other lines in that file are preserved.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::OpenAIConfig;

pub const API_KEY_VAR: &str = "OPENAI_API_KEY";

#[derive(Clone, Debug)]
pub struct ApiKeyStore {
    key: Arc<RwLock<Option<String>>>,
    env_file: PathBuf,
}

impl ApiKeyStore {
    /// Resolve the startup key: the process environment wins over the
    /// dotenv file, matching how dotenv loaders leave existing variables
    /// alone.
    pub fn from_config(config: &OpenAIConfig) -> Self {
        let from_env = if config.read_env {
            std::env::var(API_KEY_VAR).ok().and_then(non_empty)
        } else {
            None
        };
        let key = from_env.or_else(|| read_env_value(&config.env_file, API_KEY_VAR));

        if key.is_none() {
            tracing::warn!("{} not set, AI calls will return placeholders", API_KEY_VAR);
        }

        Self {
            key: Arc::new(RwLock::new(key)),
            env_file: config.env_file.clone(),
        }
    }

    pub fn with_key(key: Option<String>, env_file: PathBuf) -> Self {
        Self {
            key: Arc::new(RwLock::new(key.and_then(non_empty))),
            env_file,
        }
    }

    pub async fn current(&self) -> Option<String> {
        self.key.read().await.clone()
    }

    /// Persist `key` to the dotenv file and make it the active key.
    pub async fn save(&self, key: &str) -> Result<()> {
        let key = key.trim();
        if key.is_empty() {
            anyhow::bail!("api_key must not be empty");
        }

        let existing = match tokio::fs::read_to_string(&self.env_file).await {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read env file: {}", self.env_file.display())
                })
            }
        };

        let updated = upsert_env_line(&existing, API_KEY_VAR, key);

        if let Some(parent) = self.env_file.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&self.env_file, updated)
            .await
            .with_context(|| format!("Failed to write env file: {}", self.env_file.display()))?;

        *self.key.write().await = Some(key.to_string());
        tracing::info!(file = %self.env_file.display(), "saved OpenAI API key");
        Ok(())
    }
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Read `name` from a dotenv file. Missing file or missing entry is `None`.
pub fn read_env_value(path: &Path, name: &str) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    content.lines().find_map(|line| {
        let line = line.trim();
        let line = line.strip_prefix("export ").unwrap_or(line);
        let (k, v) = line.split_once('=')?;
        if k.trim() != name {
            return None;
        }
        non_empty(unquote(v.trim()).to_string())
    })
}

fn unquote(v: &str) -> &str {
    for q in ['\'', '"'] {
        if v.len() >= 2 && v.starts_with(q) && v.ends_with(q) {
            return &v[1..v.len() - 1];
        }
    }
    v
}

/// Replace the `name=` line in `existing` or append one.
fn upsert_env_line(existing: &str, name: &str, value: &str) -> String {
    let entry = format!("{}='{}'", name, value);
    let mut replaced = false;

    let mut lines: Vec<String> = existing
        .lines()
        .map(|line| {
            let key = line
                .trim()
                .trim_start_matches("export ")
                .split_once('=')
                .map(|(k, _)| k.trim());
            if key == Some(name) && !replaced {
                replaced = true;
                entry.clone()
            } else {
                line.to_string()
            }
        })
        .collect();

    if !replaced {
        lines.push(entry);
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}
