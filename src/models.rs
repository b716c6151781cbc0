//! Core data models that flow through the ingestion and query pipelines.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Derived-meaning record for one ingested file.
///
/// Written to `<context_dir>/<stem>.json` and, serialized, into the
/// `content` column of the matching document row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub filename: String,
    pub context: String,
    /// Unix seconds with sub-second precision.
    pub timestamp: f64,
}

/// A row of the `documents` table.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: i64,
    pub filename: String,
    /// JSON text of a [`ContextSnapshot`].
    pub content: String,
}

impl Document {
    pub fn snapshot(&self) -> Option<ContextSnapshot> {
        serde_json::from_str(&self.content).ok()
    }

    /// The derived context text, or empty when the stored content is not a
    /// snapshot.
    pub fn context_text(&self) -> String {
        self.snapshot().map(|s| s.context).unwrap_or_default()
    }

    /// Stored content as JSON; content that doesn't parse is returned as a
    /// JSON string so listings never fail on one bad row.
    pub fn content_json(&self) -> serde_json::Value {
        serde_json::from_str(&self.content)
            .unwrap_or_else(|_| serde_json::Value::String(self.content.clone()))
    }
}

/// Coarse, extension-based classification of an uploaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Video,
    Document,
    Unknown,
}

impl FileKind {
    pub fn from_filename(filename: &str) -> Self {
        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match ext.as_deref() {
            Some("mp4" | "mov" | "avi") => FileKind::Video,
            Some("png" | "jpg" | "jpeg" | "pdf") => FileKind::Document,
            _ => FileKind::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Video => "video",
            FileKind::Document => "document",
            FileKind::Unknown => "unknown",
        }
    }
}
