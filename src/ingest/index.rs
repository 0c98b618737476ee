//! In-memory nearest-neighbour index over chunks.
//!
//! A [`VectorIndex`] wraps an HNSW graph from `hora` and keeps the chunks and
//! their vectors next to it, keyed by position. It is built in one go and never
//! updated afterwards; a new ingestion run builds a new index.

use hora::core::ann_index::ANNIndex;
use hora::core::metrics::Metric;
use hora::index::hnsw_idx::HNSWIndex;
use hora::index::hnsw_params::HNSWParams;
use tracing::debug;

use crate::error::IndexError;
use crate::ingest::chunk::Chunk;

/// One lookup result.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit<'a> {
    pub chunk: &'a Chunk,
    /// Euclidean distance between the query and the chunk vector.
    pub distance: f32,
}

/// Chunks with their embeddings, searchable by vector.
pub struct VectorIndex {
    index: HNSWIndex<f32, usize>,
    chunks: Vec<Chunk>,
    vectors: Vec<Vec<f32>>,
    dimension: usize,
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("chunks", &self.chunks.len())
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl VectorIndex {
    /// Build an index with one entry per chunk; `vectors[i]` belongs to `chunks[i]`.
    ///
    /// # Errors
    /// - [`IndexError::LengthMismatch`] when the two inputs differ in length.
    /// - [`IndexError::EmptyVectors`] when there is nothing to index or vectors are empty.
    /// - [`IndexError::DimensionMismatch`] when vectors disagree on their length.
    /// - [`IndexError::Hnsw`] when the graph cannot be built.
    pub fn build(chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>) -> Result<Self, IndexError> {
        if chunks.len() != vectors.len() {
            return Err(IndexError::LengthMismatch {
                chunks: chunks.len(),
                vectors: vectors.len(),
            });
        }

        let dimension = vectors.first().map(Vec::len).unwrap_or(0);
        if dimension == 0 {
            return Err(IndexError::EmptyVectors);
        }

        let mut index = HNSWIndex::new(dimension, &HNSWParams::default());
        for (position, vector) in vectors.iter().enumerate() {
            if vector.len() != dimension {
                return Err(IndexError::DimensionMismatch {
                    position,
                    expected: dimension,
                    got: vector.len(),
                });
            }
            index.add(vector, position).map_err(IndexError::Hnsw)?;
        }
        index.build(Metric::Euclidean).map_err(IndexError::Hnsw)?;

        debug!("Built index of {} vectors ({} dimensions)", vectors.len(), dimension);
        Ok(Self {
            index,
            chunks,
            vectors,
            dimension,
        })
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// The `top_k` chunks nearest to `query`, closest first.
    ///
    /// # Errors
    /// [`IndexError::DimensionMismatch`] when `query` has the wrong length.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchHit<'_>>, IndexError> {
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                position: 0,
                expected: self.dimension,
                got: query.len(),
            });
        }

        let top_k = top_k.min(self.len());
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let mut hits: Vec<SearchHit<'_>> = self
            .index
            .search(query, top_k)
            .into_iter()
            .filter_map(|id| {
                let chunk = self.chunks.get(id)?;
                let distance = euclidean(query, &self.vectors[id]);
                Some(SearchHit { chunk, distance })
            })
            .collect();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        Ok(hits)
    }
}

fn euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::chunk::{ChunkParams, split_text};

    fn chunks(n: usize) -> Vec<Chunk> {
        let text: String = (0..n).map(|i| char::from(b'a' + i as u8)).collect();
        split_text(&text, ChunkParams::new(1, 0).unwrap())
    }

    fn axis(i: usize, dimension: usize) -> Vec<f32> {
        let mut v = vec![0.0; dimension];
        v[i] = 1.0;
        v
    }

    #[test]
    fn test_build_one_entry_per_chunk() {
        let index = VectorIndex::build(chunks(3), (0..3).map(|i| axis(i, 4)).collect()).unwrap();
        assert_eq!(index.len(), 3);
        assert_eq!(index.dimension(), 4);
        assert_eq!(index.chunks()[2].text, "c");
    }

    #[test]
    fn test_search_finds_exact_match_first() {
        let index = VectorIndex::build(chunks(4), (0..4).map(|i| axis(i, 4)).collect()).unwrap();
        let hits = index.search(&axis(2, 4), 2).unwrap();
        assert!(!hits.is_empty());
        assert_eq!(hits[0].chunk.text, "c");
        assert!(hits[0].distance.abs() < 1e-6);
    }

    #[test]
    fn test_search_clamps_top_k() {
        let index = VectorIndex::build(chunks(2), (0..2).map(|i| axis(i, 3)).collect()).unwrap();
        assert!(index.search(&axis(0, 3), 10).unwrap().len() <= 2);
        assert!(index.search(&axis(0, 3), 0).unwrap().is_empty());
    }

    #[test]
    fn test_rejects_mismatched_inputs() {
        let err = VectorIndex::build(chunks(2), vec![axis(0, 3)]).unwrap_err();
        assert_eq!(err, IndexError::LengthMismatch { chunks: 2, vectors: 1 });

        let err = VectorIndex::build(chunks(2), vec![axis(0, 3), axis(0, 4)]).unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { position: 1, .. }));

        let err = VectorIndex::build(Vec::new(), Vec::new()).unwrap_err();
        assert_eq!(err, IndexError::EmptyVectors);
    }

    #[test]
    fn test_query_dimension_is_checked() {
        let index = VectorIndex::build(chunks(1), vec![axis(0, 3)]).unwrap();
        assert!(index.search(&[1.0, 0.0], 1).is_err());
    }
}
