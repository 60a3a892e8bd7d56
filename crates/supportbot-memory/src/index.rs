use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Distance metric between two embeddings. Smaller is closer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distance {
    /// Squared Euclidean distance.
    #[default]
    L2,
    /// `1 - cosine similarity`.
    Cosine,
}

impl Distance {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::L2 => "l2",
            Self::Cosine => "cosine",
        }
    }

    #[must_use]
    pub fn between(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::L2 => a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum(),
            Self::Cosine => 1.0 - cosine_similarity(a, b),
        }
    }
}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Distance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "l2" => Ok(Self::L2),
            "cosine" => Ok(Self::Cosine),
            other => Err(format!("unknown distance metric: {other}")),
        }
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub id: String,
    pub content: String,
    pub source: String,
    pub chunk_index: usize,
    pub vector: Vec<f32>,
}

/// Describes how a persisted index was produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexManifest {
    pub embedding_model: String,
    pub dimensions: usize,
    pub distance: Distance,
    /// Hex blake3 hash of the corpus file the index was built from.
    pub corpus_hash: String,
    pub chunk_count: usize,
    /// RFC 3339 timestamp.
    pub built_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub content: String,
    pub source: String,
    pub chunk_index: usize,
    pub distance: f32,
}

/// Read-only snapshot of the index held in memory.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    manifest: IndexManifest,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] if any entry's vector length differs from
    /// the manifest dimensions.
    pub fn new(manifest: IndexManifest, entries: Vec<IndexEntry>) -> Result<Self, StoreError> {
        if let Some(bad) = entries
            .iter()
            .find(|e| e.vector.len() != manifest.dimensions)
        {
            return Err(StoreError::Corrupt(format!(
                "entry {} has {} dimensions, manifest declares {}",
                bad.id,
                bad.vector.len(),
                manifest.dimensions
            )));
        }
        Ok(Self { manifest, entries })
    }

    #[must_use]
    pub fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    #[must_use]
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Top `k` entries by ascending distance; ties keep insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DimensionMismatch`] if the query vector length
    /// differs from the index dimensions.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>, StoreError> {
        if k == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }
        if query.len() != self.manifest.dimensions {
            return Err(StoreError::DimensionMismatch {
                expected: self.manifest.dimensions,
                actual: query.len(),
            });
        }

        let metric = self.manifest.distance;
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, metric.between(query, &e.vector)))
            .collect();
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, distance)| {
                let entry = &self.entries[i];
                ScoredChunk {
                    content: entry.content.clone(),
                    source: entry.source.clone(),
                    chunk_index: entry.chunk_index,
                    distance,
                }
            })
            .collect())
    }
}
