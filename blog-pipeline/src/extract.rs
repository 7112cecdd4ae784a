//! Document-extraction boundary. Real PDF/image extraction backends
//! live behind this trait; the pipeline only requires that extraction
//! is tolerant and yields an empty string on failure.

use std::path::Path;

use async_trait::async_trait;
use tracing::warn;

#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    /// Extract text from a file. Never errors; unreadable or
    /// unsupported files yield an empty string.
    async fn extract_text(&self, path: &Path) -> String;
}

/// Reads plain-text files. Binary or unreadable files yield empty.
pub struct PlainTextExtractor;

#[async_trait]
impl DocumentExtractor for PlainTextExtractor {
    async fn extract_text(&self, path: &Path) -> String {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => text,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "document extraction failed");
                String::new()
            }
        }
    }
}
