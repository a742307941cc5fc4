use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::{Error, Result};
use crate::traits::TextExtractor;

/// Reads `.txt` files, falling back to lossy UTF-8 decoding.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, path: &Path) -> Result<String> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if ext != "txt" {
            return Err(Error::UnsupportedFormat(if ext.is_empty() {
                path.display().to_string()
            } else {
                ext
            }));
        }
        let bytes = fs::read(path)
            .map_err(|e| Error::Extraction(format!("{}: {e}", path.display())))?;
        let text = match String::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) => {
                debug!(path = %path.display(), "non-UTF-8 input, decoding lossily");
                String::from_utf8_lossy(e.as_bytes()).into_owned()
            }
        };
        Ok(text)
    }
}
