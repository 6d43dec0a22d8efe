//! Exact nearest-neighbour index over a dense `rows × dimension` matrix.

use ndarray::{Array2, ArrayView1, Axis};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexError {
    #[error("vector dimension mismatch: index has {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("flat buffer of {len} values does not hold whole rows of {dimension}")]
    RaggedBuffer { len: usize, dimension: usize },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub ordinal: usize,
    /// squared Euclidean distance to the query
    pub distance: f32,
}

/// Row `i` is the embedding of chunk ordinal `i`; rows are only appended.
#[derive(Debug, Clone)]
pub struct FlatL2Index {
    vectors: Array2<f32>,
}

impl FlatL2Index {
    pub fn new(dimension: usize) -> Self {
        Self {
            vectors: Array2::zeros((0, dimension)),
        }
    }

    /// Rebuild from row-major values, as written by [`FlatL2Index::to_flat`].
    pub fn from_flat(dimension: usize, values: Vec<f32>) -> Result<Self, IndexError> {
        if dimension == 0 || values.len() % dimension != 0 {
            return Err(IndexError::RaggedBuffer {
                len: values.len(),
                dimension,
            });
        }
        let rows = values.len() / dimension;
        let vectors = Array2::from_shape_vec((rows, dimension), values).map_err(|_| {
            IndexError::RaggedBuffer {
                len: rows * dimension,
                dimension,
            }
        })?;
        Ok(Self { vectors })
    }

    pub fn to_flat(&self) -> Vec<f32> {
        self.vectors.iter().copied().collect()
    }

    pub fn dimension(&self) -> usize {
        self.vectors.ncols()
    }

    pub fn len(&self) -> usize {
        self.vectors.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append rows. Every row is checked before any is inserted, so a bad
    /// batch leaves the index untouched.
    pub fn add(&mut self, rows: &[Vec<f32>]) -> Result<(), IndexError> {
        let expected = self.dimension();
        if let Some(bad) = rows.iter().find(|row| row.len() != expected) {
            return Err(IndexError::DimensionMismatch {
                expected,
                actual: bad.len(),
            });
        }

        for row in rows {
            self.vectors
                .push_row(ArrayView1::from(row.as_slice()))
                .map_err(|_| IndexError::DimensionMismatch {
                    expected,
                    actual: row.len(),
                })?;
        }
        Ok(())
    }

    /// Exhaustive k-NN: nearest first, ties broken by lower ordinal.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError> {
        if query.len() != self.dimension() {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension(),
                actual: query.len(),
            });
        }
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let query = ArrayView1::from(query);
        let diffs = &self.vectors - &query;
        let distances = (&diffs * &diffs).sum_axis(Axis(1));

        let mut neighbors: Vec<Neighbor> = distances
            .iter()
            .enumerate()
            .map(|(ordinal, distance)| Neighbor {
                ordinal,
                distance: *distance,
            })
            .collect();
        neighbors.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.ordinal.cmp(&b.ordinal))
        });
        neighbors.truncate(k);
        Ok(neighbors)
    }
}
