//! Ingestion pipeline.
//!
//! raw bytes → classify → describe → analyze → embed → context snapshot →
//! document row. Provider trouble never stops a run: the file is still
//! stored, with the degraded outcomes recorded in the [`IngestReport`].
//! Only filesystem or database errors fail an ingestion.
//!
//! The snapshot file is written after the document row commits, so a run
//! that fails in the database leaves no snapshot behind.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::analyzer::analyze;
use crate::config::Config;
use crate::embedding::embed_text;
use crate::extract;
use crate::models::{ContextSnapshot, FileKind};
use crate::outcome::Outcome;
use crate::providers::Providers;
use crate::store::DocumentStore;

/// Result of one completed ingestion.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub id: i64,
    pub filename: String,
    pub kind: FileKind,
    pub snapshot_path: PathBuf,
    pub analysis: Outcome,
    pub embedding: Outcome,
}

/// Reduce an uploaded name to a bare file name.
///
/// Directory parts (either separator) are dropped so an upload can only land
/// inside the raw directory. Returns `None` when nothing usable is left.
pub fn stored_name(uploaded: &str) -> Option<String> {
    let name = uploaded
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    match name {
        "" | "." | ".." => None,
        n => Some(n.to_string()),
    }
}

/// Write uploaded bytes under the raw directory. Returns the stored path.
pub async fn save_upload(config: &Config, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
    let Some(name) = stored_name(filename) else {
        bail!("invalid filename: {:?}", filename);
    };

    tokio::fs::create_dir_all(&config.storage.raw_dir)
        .await
        .with_context(|| {
            format!("Failed to create raw directory: {}", config.storage.raw_dir.display())
        })?;

    let path = config.storage.raw_dir.join(&name);
    tokio::fs::write(&path, bytes)
        .await
        .with_context(|| format!("Failed to write upload: {}", path.display()))?;

    tracing::info!(file = %path.display(), bytes = bytes.len(), "stored upload");
    Ok(path)
}

/// Location of the context snapshot for `filename`.
pub fn snapshot_path(config: &Config, filename: &str) -> PathBuf {
    let stem = Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.to_string());
    config.storage.context_dir.join(format!("{}.json", stem))
}

/// Run the pipeline for a file already saved under the raw directory.
pub async fn process_file(
    config: &Config,
    providers: &Providers,
    filename: &str,
) -> Result<IngestReport> {
    let raw_path = config.storage.raw_dir.join(filename);
    let bytes = tokio::fs::read(&raw_path)
        .await
        .with_context(|| format!("Failed to read upload: {}", raw_path.display()))?;

    let kind = FileKind::from_filename(filename);
    tracing::info!(file = filename, kind = kind.as_str(), "processing upload");

    let text = extract::extract_text_lossy(bytes, filename).await;
    let description = extract::describe(
        &raw_path,
        kind,
        text.as_deref(),
        config.ingest.max_excerpt_chars,
    );

    let analysis = analyze(providers.analyzer.as_ref(), &description).await;
    let embedding = embed_text(providers.embedder.as_ref(), &analysis.value).await;

    let snapshot = ContextSnapshot {
        filename: filename.to_string(),
        context: analysis.value,
        timestamp: unix_seconds(),
    };

    let store = DocumentStore::open(config).await?;
    let inserted = store.insert(filename, &snapshot, &embedding.value).await;
    store.close().await;
    let id = inserted?;

    let snapshot_path = snapshot_path(config, filename);
    write_snapshot(&snapshot_path, &snapshot).await?;
    tracing::info!(file = %snapshot_path.display(), "wrote context snapshot");

    tracing::info!(
        id,
        file = filename,
        analysis = ?analysis.outcome,
        embedding = ?embedding.outcome,
        "stored document"
    );

    Ok(IngestReport {
        id,
        filename: filename.to_string(),
        kind,
        snapshot_path,
        analysis: analysis.outcome,
        embedding: embedding.outcome,
    })
}

/// Run [`process_file`] on a detached task.
///
/// The caller may drop the handle; failures are logged, not returned.
pub fn spawn_ingestion(
    config: Arc<Config>,
    providers: Providers,
    filename: String,
) -> JoinHandle<Option<IngestReport>> {
    tokio::spawn(async move {
        match process_file(&config, &providers, &filename).await {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::error!(file = %filename, error = %format!("{:#}", e), "ingestion failed");
                None
            }
        }
    })
}

async fn write_snapshot(path: &Path, snapshot: &ContextSnapshot) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_vec(snapshot)?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("Failed to write context snapshot: {}", path.display()))?;
    Ok(())
}

fn unix_seconds() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stored_name_strips_directories() {
        assert_eq!(stored_name("report.pdf").as_deref(), Some("report.pdf"));
        assert_eq!(stored_name("../../etc/passwd").as_deref(), Some("passwd"));
        assert_eq!(stored_name("C:\\Users\\me\\clip.mov").as_deref(), Some("clip.mov"));
        assert_eq!(stored_name("dir/"), None);
        assert_eq!(stored_name(".."), None);
        assert_eq!(stored_name("   "), None);
    }

    #[test]
    fn test_snapshot_path_uses_stem() {
        let mut config = Config::default();
        config.storage.context_dir = PathBuf::from("ctx");
        assert_eq!(
            snapshot_path(&config, "site-walk.mp4"),
            PathBuf::from("ctx/site-walk.json")
        );
        assert_eq!(
            snapshot_path(&config, "backup.tar.gz"),
            PathBuf::from("ctx/backup.tar.json")
        );
    }

    #[tokio::test]
    async fn test_database_failure_leaves_no_snapshot() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage.raw_dir = tmp.path().join("raw");
        config.storage.context_dir = tmp.path().join("context");
        config.openai.read_env = false;
        // A directory where the database file should be.
        config.db.path = tmp.path().to_path_buf();

        let keys = crate::settings::ApiKeyStore::with_key(None, tmp.path().join(".env"));
        let providers = Providers::openai(&config, keys).unwrap();

        save_upload(&config, "notes.txt", b"pour schedule").await.unwrap();
        assert!(process_file(&config, &providers, "notes.txt").await.is_err());
        assert!(!snapshot_path(&config, "notes.txt").exists());
    }

    #[tokio::test]
    async fn test_save_upload_rejects_empty_name() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage.raw_dir = tmp.path().join("raw");
        assert!(save_upload(&config, "/", b"x").await.is_err());

        let path = save_upload(&config, "../escape.txt", b"x").await.unwrap();
        assert_eq!(path, tmp.path().join("raw").join("escape.txt"));
    }
}
