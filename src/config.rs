use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub openai: OpenAIConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub google: GoogleConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    /// When false the vector table is never created and similarity search
    /// always comes back empty.
    #[serde(default = "default_true")]
    pub vector_search: bool,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            vector_search: true,
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("storage/zhora.db")
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_raw_dir")]
    pub raw_dir: PathBuf,
    #[serde(default = "default_context_dir")]
    pub context_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            raw_dir: default_raw_dir(),
            context_dir: default_context_dir(),
        }
    }
}

fn default_raw_dir() -> PathBuf {
    PathBuf::from("storage/raw")
}
fn default_context_dir() -> PathBuf {
    PathBuf::from("storage/context")
}

/// Settings shared by both OpenAI-backed providers.
#[derive(Debug, Deserialize, Clone)]
pub struct OpenAIConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// File the settings endpoint writes `OPENAI_API_KEY` into.
    #[serde(default = "default_env_file")]
    pub env_file: PathBuf,
    /// Read `OPENAI_API_KEY` from the process environment at startup.
    #[serde(default = "default_true")]
    pub read_env: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            env_file: default_env_file(),
            read_env: true,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_env_file() -> PathBuf {
    PathBuf::from(".env")
}
fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            dims: default_dims(),
        }
    }
}

fn default_embedding_model() -> String {
    "text-embedding-ada-002".to_string()
}
fn default_dims() -> usize {
    1536
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalyzerConfig {
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            model: default_chat_model(),
            system_prompt: default_system_prompt(),
        }
    }
}

fn default_chat_model() -> String {
    "gpt-4o".to_string()
}
fn default_system_prompt() -> String {
    "You are a helpful assistant that analyzes project data.".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: i64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> i64 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Upper bound on extracted text appended to the simulated description.
    #[serde(default = "default_max_excerpt_chars")]
    pub max_excerpt_chars: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_excerpt_chars: default_max_excerpt_chars(),
        }
    }
}

fn default_max_excerpt_chars() -> usize {
    4000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
    /// Largest accepted upload body, in bytes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            cors_origins: default_cors_origins(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}
fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:9999".to_string()]
}
fn default_max_upload_bytes() -> usize {
    512 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct GoogleConfig {
    #[serde(default = "default_client_secret")]
    pub client_secret: PathBuf,
    #[serde(default = "default_token_file")]
    pub token_file: PathBuf,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            client_secret: default_client_secret(),
            token_file: default_token_file(),
            redirect_uri: default_redirect_uri(),
            scopes: default_scopes(),
        }
    }
}

fn default_client_secret() -> PathBuf {
    PathBuf::from("client_secret.json")
}
fn default_token_file() -> PathBuf {
    PathBuf::from("token.json")
}
fn default_redirect_uri() -> String {
    "http://localhost:8000/auth/google/callback".to_string()
}
fn default_scopes() -> Vec<String> {
    vec![
        "https://www.googleapis.com/auth/gmail.readonly".to_string(),
        "https://www.googleapis.com/auth/drive.readonly".to_string(),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_interval_secs(),
            max_backoff_secs: default_max_backoff_secs(),
        }
    }
}

fn default_interval_secs() -> u64 {
    600
}
fn default_max_backoff_secs() -> u64 {
    3600
}

/// Load configuration from `path`.
///
/// A missing file is not an error: the service runs on defaults, matching a
/// first start in an empty directory. A file that exists but fails to parse
/// or validate is an error.
pub fn load_config(path: &Path) -> Result<Config> {
    let config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| "Failed to parse config file")?
    } else {
        tracing::info!(path = %path.display(), "config file not found, using defaults");
        Config::default()
    };

    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }

    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    if config.server.max_upload_bytes == 0 {
        anyhow::bail!("server.max_upload_bytes must be > 0");
    }

    if config.sync.interval_secs == 0 {
        anyhow::bail!("sync.interval_secs must be > 0");
    }

    if config.sync.max_backoff_secs < config.sync.interval_secs {
        anyhow::bail!("sync.max_backoff_secs must be >= sync.interval_secs");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.embedding.dims, 1536);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.sync.interval_secs, 600);
        assert_eq!(config.server.cors_origins, vec!["http://localhost:9999"]);
        assert!(config.db.vector_search);
        validate(&config).unwrap();
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config: Config = toml::from_str(
            r#"
[embedding]
dims = 8

[db]
path = "/tmp/x.db"
"#,
        )
        .unwrap();
        assert_eq!(config.embedding.dims, 8);
        assert_eq!(config.embedding.model, "text-embedding-ada-002");
        assert_eq!(config.db.path, PathBuf::from("/tmp/x.db"));
        assert!(config.db.vector_search);
    }

    #[test]
    fn test_rejects_zero_dims() {
        let config: Config = toml::from_str("[embedding]\ndims = 0\n").unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_rejects_backoff_below_interval() {
        let config: Config =
            toml::from_str("[sync]\ninterval_secs = 60\nmax_backoff_secs = 30\n").unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_missing_file_is_default() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = load_config(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config.analyzer.model, "gpt-4o");
    }
}
