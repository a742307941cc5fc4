//! Content-addressed, disk-backed embedding cache.
//!
//! One JSON file per key (`<blake3 hex>.vec.json`) holding a tagged,
//! versioned record. Writes land in a temporary file in the same directory
//! and are renamed over the target, so a reader sees either the old value,
//! the new value, or nothing.
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use bookqa_core::error::{Error, Result};

const SUFFIX: &str = ".vec.json";

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "lowercase")]
enum CacheRecord {
    V1 { dim: usize, vector: Vec<f32> },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 { 0.0 } else { self.hits as f64 / total as f64 }
    }
}

#[derive(Debug)]
pub struct EmbeddingCache {
    dir: PathBuf,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl EmbeddingCache {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, hits: AtomicU64::new(0), misses: AtomicU64::new(0) })
    }

    /// Open the cache for one embedding model under `root`, so vectors from
    /// different models never share a key space.
    pub fn open_namespaced(root: &Path, embedder_id: &str) -> Result<Self> {
        let ns: String = embedder_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
            .collect();
        Self::open(root.join(ns))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// BLAKE3 digest of the text with surrounding whitespace trimmed and
    /// internal runs collapsed to one space.
    pub fn key_for(text: &str) -> String {
        let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
        blake3::hash(normalized.as_bytes()).to_hex().to_string()
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}{SUFFIX}"))
    }

    pub fn get(&self, key: &str) -> Option<Vec<f32>> {
        match self.read(key) {
            Ok(Some(v)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(v)
            }
            Ok(None) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                warn!(error = %e, "ignoring unreadable cache entry");
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    fn read(&self, key: &str) -> Result<Option<Vec<f32>>> {
        let corrupt = |reason: String| Error::CacheCorruption { key: key.to_string(), reason };
        let raw = match fs::read(self.path_for(key)) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(corrupt(e.to_string())),
        };
        let record: CacheRecord = serde_json::from_slice(&raw).map_err(|e| corrupt(e.to_string()))?;
        match record {
            CacheRecord::V1 { dim, vector } if dim == vector.len() && dim > 0 => Ok(Some(vector)),
            CacheRecord::V1 { dim, vector } => {
                Err(corrupt(format!("declared dim {dim}, found {}", vector.len())))
            }
        }
    }

    /// Store `vector` under `key`, replacing any previous value.
    pub fn put(&self, key: &str, vector: &[f32]) -> Result<()> {
        let record = CacheRecord::V1 { dim: vector.len(), vector: vector.to_vec() };
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        serde_json::to_writer(&mut tmp, &record)?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.path_for(key)).map_err(|e| Error::Io(e.error))?;
        debug!(key, dim = vector.len(), "cached embedding");
        Ok(())
    }

    /// Remove every cache record; returns how many were deleted.
    pub fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let is_record = entry.file_name().to_str().is_some_and(|n| n.ends_with(SUFFIX));
            if is_record && entry.file_type()?.is_file() {
                fs::remove_file(entry.path())?;
                removed += 1;
            }
        }
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        Ok(removed)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats { hits: self.hits.load(Ordering::Relaxed), misses: self.misses.load(Ordering::Relaxed) }
    }
}
