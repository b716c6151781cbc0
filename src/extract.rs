//! Content description for uploaded files.
//!
//! Media understanding is simulated: every file gets a description naming
//! its kind and location. When text can be pulled out of the bytes (PDF, or
//! a file that is already UTF-8 text) a bounded excerpt is appended so the
//! analyzer has something real to summarize.

use std::path::Path;
use thiserror::Error;

use crate::models::FileKind;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
}

/// Extract plain text from `bytes`.
///
/// `Ok(None)` means the format carries no text we know how to read
/// (video, images, arbitrary binaries).
pub fn extract_text(bytes: &[u8], filename: &str) -> Result<Option<String>, ExtractError> {
    let is_pdf = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));

    if is_pdf {
        return pdf_extract::extract_text_from_mem(bytes)
            .map(Some)
            .map_err(|e| ExtractError::Pdf(e.to_string()));
    }

    match std::str::from_utf8(bytes) {
        Ok(text) if !text.contains('\0') => Ok(Some(text.to_string())),
        _ => Ok(None),
    }
}

/// Run [`extract_text`] on a blocking thread.
///
/// Any failure, including a panic inside the PDF parser, yields `None` so the
/// file is still described and stored without an excerpt.
pub async fn extract_text_lossy(bytes: Vec<u8>, filename: &str) -> Option<String> {
    let name = filename.to_string();
    match tokio::task::spawn_blocking(move || extract_text(&bytes, &name)).await {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            tracing::warn!(file = filename, error = %e, "text extraction failed");
            None
        }
        Err(e) => {
            tracing::warn!(file = filename, error = %e, "text extraction aborted");
            None
        }
    }
}

/// Build the text handed to the analyzer for one file.
pub fn describe(path: &Path, kind: FileKind, text: Option<&str>, max_excerpt_chars: usize) -> String {
    let mut description = format!(
        "Simulated content from {} file at {}.",
        kind.as_str(),
        path.display()
    );

    if let Some(text) = text {
        let excerpt: String = text.trim().chars().take(max_excerpt_chars).collect();
        if !excerpt.is_empty() {
            description.push_str("\n\nExtracted text:\n");
            description.push_str(&excerpt);
        }
    }

    description
}
