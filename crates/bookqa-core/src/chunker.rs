//! Word-window chunking with overlap.
use crate::config::ChunkingSettings;
use crate::error::{Error, Result};
use crate::types::Chunk;

#[derive(Debug, Clone, Copy)]
pub struct TextChunker {
    chunk_size: usize,
    overlap: usize,
}

impl TextChunker {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::Config("chunk_size must be positive".into()));
        }
        if overlap >= chunk_size {
            return Err(Error::Config(format!(
                "overlap ({overlap}) must be smaller than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self { chunk_size, overlap })
    }

    pub fn from_settings(settings: &ChunkingSettings) -> Result<Self> {
        Self::new(settings.chunk_size, settings.overlap)
    }

    /// Split `text` into windows of `chunk_size` words, each repeating the
    /// last `overlap` words of its predecessor. Stops once a window reaches
    /// the final word.
    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        let words: Vec<(usize, &str)> = text
            .split_whitespace()
            .map(|w| (w.as_ptr() as usize - text.as_ptr() as usize, w))
            .collect();
        let step = self.chunk_size - self.overlap;
        let mut chunks = Vec::new();
        let mut start = 0;
        while start < words.len() {
            let end = (start + self.chunk_size).min(words.len());
            let window = &words[start..end];
            chunks.push(Chunk {
                id: chunks.len(),
                text: window.iter().map(|(_, w)| *w).collect::<Vec<_>>().join(" "),
                source_offset: window[0].0,
            });
            if end == words.len() {
                break;
            }
            start += step;
        }
        chunks
    }
}

pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<Chunk>> {
    Ok(TextChunker::new(chunk_size, overlap)?.chunk(text))
}

/// Wrap already-split text as chunks with dense ids.
pub fn chunks_from_parts(parts: Vec<String>) -> Vec<Chunk> {
    parts
        .into_iter()
        .enumerate()
        .map(|(id, text)| Chunk { id, text, source_offset: 0 })
        .collect()
}
