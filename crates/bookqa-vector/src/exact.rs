use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use bookqa_core::error::{Error, Result};
use bookqa_core::traits::VectorStore;
use bookqa_core::types::{cosine_similarity, ChunkId, IndexEntry, SearchFilter, VectorMatch};

#[derive(Default)]
struct State {
    entries: BTreeMap<ChunkId, IndexEntry>,
    dim: Option<usize>,
}

/// In-memory brute-force cosine store. Deterministic; the default backend.
#[derive(Default)]
pub struct ExactBackend {
    state: RwLock<State>,
}

impl ExactBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries; a poisoned lock is reported as `Error::Store`.
    pub fn len(&self) -> Result<usize> {
        Ok(self.state.read().map_err(poisoned)?.entries.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

fn poisoned<T>(_: T) -> Error {
    Error::Store("exact backend lock poisoned".into())
}

pub(crate) fn rank(mut matches: Vec<VectorMatch>, top_k: usize) -> Vec<VectorMatch> {
    matches.sort_by(|a, b| {
        b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal).then(a.chunk_id.cmp(&b.chunk_id))
    });
    matches.truncate(top_k);
    matches
}

#[async_trait]
impl VectorStore for ExactBackend {
    fn is_available(&self) -> bool {
        true
    }

    async fn store(&self, entries: &[IndexEntry]) -> Result<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        let mut dim = state.dim;
        for e in entries {
            match dim {
                Some(d) if d != e.vector.len() => {
                    return Err(Error::DimensionMismatch { expected: d, actual: e.vector.len() })
                }
                Some(_) => {}
                None => dim = Some(e.vector.len()),
            }
        }
        state.dim = dim;
        for e in entries {
            state.entries.insert(e.chunk_id, e.clone());
        }
        Ok(())
    }

    async fn search(&self, query: &[f32], top_k: usize, filter: Option<&SearchFilter>) -> Result<Vec<VectorMatch>> {
        let state = self.state.read().map_err(poisoned)?;
        let Some(dim) = state.dim else { return Ok(Vec::new()) };
        if query.len() != dim {
            return Err(Error::DimensionMismatch { expected: dim, actual: query.len() });
        }
        let matches = state
            .entries
            .values()
            .filter(|e| filter.map_or(true, |f| f.matches(&e.metadata)))
            .map(|e| VectorMatch {
                chunk_id: e.chunk_id,
                score: cosine_similarity(query, &e.vector),
                metadata: e.metadata.clone(),
            })
            .collect();
        Ok(rank(matches, top_k))
    }

    async fn clear(&self) -> Result<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        state.entries.clear();
        state.dim = None;
        Ok(())
    }
}
