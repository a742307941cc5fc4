use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::info;

use bookqa_core::error::{Error, Result};
use bookqa_core::traits::VectorStore;
use bookqa_core::types::{Chunk, ChunkFeatures, ChunkId, CorpusMetadata, Embedding, EntryMetadata, IndexEntry};
use bookqa_text::LexicalIndex;

/// An ingested book: chunks, their annotations and embeddings, plus the
/// lexical index built over them. Immutable once constructed.
pub struct BookCorpus {
    chunks: Vec<Chunk>,
    features: Vec<ChunkFeatures>,
    metadata: CorpusMetadata,
    embeddings: Vec<Embedding>,
    dim: Option<usize>,
    lexical: LexicalIndex,
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "version")]
enum CorpusRecord {
    #[serde(rename = "v1")]
    V1 { chunks: Vec<Chunk>, features: Vec<ChunkFeatures>, embeddings: Vec<Embedding> },
}

#[derive(Serialize)]
#[serde(tag = "version")]
enum CorpusRecordRef<'a> {
    #[serde(rename = "v1")]
    V1 { chunks: &'a [Chunk], features: &'a [ChunkFeatures], embeddings: &'a [Embedding] },
}

impl BookCorpus {
    pub fn new(chunks: Vec<Chunk>, features: Vec<ChunkFeatures>, embeddings: Vec<Embedding>) -> Result<Self> {
        if let Some((i, c)) = chunks.iter().enumerate().find(|(i, c)| c.id != *i) {
            return Err(Error::Corpus(format!("chunk at position {i} has id {}", c.id)));
        }
        if features.len() != chunks.len() {
            return Err(Error::Corpus(format!("{} feature sets for {} chunks", features.len(), chunks.len())));
        }
        if embeddings.len() != chunks.len() {
            return Err(Error::Corpus(format!("{} embeddings for {} chunks", embeddings.len(), chunks.len())));
        }
        let dim = embeddings.first().map(Vec::len);
        if let Some(d) = dim {
            if let Some(bad) = embeddings.iter().find(|e| e.len() != d) {
                return Err(Error::DimensionMismatch { expected: d, actual: bad.len() });
            }
        }

        let lexical = LexicalIndex::build(&chunks).map_err(|e| Error::Index(e.to_string()))?;
        let metadata = CorpusMetadata::from_features(&features);
        Ok(Self { chunks, features, metadata, embeddings, dim, lexical })
    }

    pub fn empty() -> Result<Self> {
        Self::new(Vec::new(), Vec::new(), Vec::new())
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn chunk(&self, id: ChunkId) -> Option<&Chunk> {
        self.chunks.get(id)
    }

    pub fn features(&self) -> &[ChunkFeatures] {
        &self.features
    }

    pub fn metadata(&self) -> &CorpusMetadata {
        &self.metadata
    }

    pub fn embeddings(&self) -> &[Embedding] {
        &self.embeddings
    }

    /// Embedding width, or `None` for an empty corpus.
    pub fn dim(&self) -> Option<usize> {
        self.dim
    }

    pub fn lexical(&self) -> &LexicalIndex {
        &self.lexical
    }

    pub fn index_entries(&self) -> Vec<IndexEntry> {
        self.chunks
            .iter()
            .zip(&self.features)
            .zip(&self.embeddings)
            .map(|((chunk, features), vector)| IndexEntry {
                chunk_id: chunk.id,
                vector: vector.clone(),
                metadata: EntryMetadata {
                    text: chunk.text.clone(),
                    has_date: features.has_date(),
                    has_name: features.has_name(),
                },
            })
            .collect()
    }

    /// Upsert every chunk of this corpus into `store`.
    pub async fn populate(&self, store: &dyn VectorStore) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }
        store.store(&self.index_entries()).await
    }

    /// Write the corpus as one versioned JSON record, atomically replacing `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;
        let tmp = NamedTempFile::new_in(dir)?;
        {
            let mut w = BufWriter::new(tmp.as_file());
            let record = CorpusRecordRef::V1 { chunks: &self.chunks, features: &self.features, embeddings: &self.embeddings };
            serde_json::to_writer(&mut w, &record)?;
            w.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| Error::Io(e.error))?;
        info!(path = %path.display(), chunks = self.len(), "saved corpus");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let record: CorpusRecord = serde_json::from_reader(reader)
            .map_err(|e| Error::Corpus(format!("{}: {e}", path.display())))?;
        let CorpusRecord::V1 { chunks, features, embeddings } = record;
        let corpus = Self::new(chunks, features, embeddings)?;
        info!(path = %path.display(), chunks = corpus.len(), dim = ?corpus.dim, "loaded corpus");
        Ok(corpus)
    }
}
