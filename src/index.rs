//! Flat L2 Faiss index over the corpus embeddings, plus the persisted
//! embedding matrix (one JSON array per line).
//!
//! The index stores no payloads: search returns row positions, and row i of
//! the index is row i of the corpus.

use anyhow::{Context, Result};
use faiss::{index_factory, Index, IndexImpl, MetricType};
use std::io::{BufRead, BufWriter, Write};
use std::path::Path;

pub struct VectorIndex {
    index: IndexImpl,
    dimension: usize,
}

impl VectorIndex {
    /// Build a flat L2 index from the full embedding matrix.
    pub fn build(dimension: usize, vectors: &[Vec<f32>]) -> Result<Self> {
        if vectors.is_empty() {
            return Err(anyhow::anyhow!("Cannot build index with empty vectors"));
        }
        for vector in vectors {
            if vector.len() != dimension {
                return Err(crate::errors::ServiceError::InvalidDimension {
                    expected: dimension,
                    actual: vector.len(),
                }
                .into());
            }
        }

        let mut index = index_factory(dimension as u32, "Flat", MetricType::L2)?;
        let flat: Vec<f32> = vectors.iter().flat_map(|v| v.iter().copied()).collect();
        index.add(&flat).context("Failed to add vectors to index")?;

        tracing::info!(
            "Built flat L2 index: {} vectors, {} dims",
            vectors.len(),
            dimension
        );

        Ok(Self { index, dimension })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let index = faiss::read_index(path.to_string_lossy())
            .with_context(|| format!("Failed to load index {}", path.display()))?;
        let dimension = index.d() as usize;
        Ok(Self { index, dimension })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        faiss::write_index(&self.index, path.to_string_lossy())
            .with_context(|| format!("Failed to write index {}", path.display()))?;
        tracing::info!("Saved index to {}", path.display());
        Ok(())
    }

    /// Nearest neighbors by L2 distance: `(row, distance)` pairs, best first.
    /// Faiss pads short result sets with invalid labels; those are dropped.
    pub fn search(&mut self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        if query.len() != self.dimension {
            return Err(crate::errors::ServiceError::InvalidDimension {
                expected: self.dimension,
                actual: query.len(),
            }
            .into());
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let result = self.index.search(query, k)?;
        let pairs = result
            .labels
            .into_iter()
            .zip(result.distances)
            .filter_map(|(label, distance)| label.get().map(|row| (row as usize, distance)))
            .collect();
        Ok(pairs)
    }

    pub fn ntotal(&self) -> usize {
        self.index.ntotal() as usize
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Write the embedding matrix as JSON lines.
pub fn write_matrix(path: &Path, vectors: &[Vec<f32>]) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    for vector in vectors {
        serde_json::to_writer(&mut writer, vector)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    tracing::info!("Saved {} embeddings to {}", vectors.len(), path.display());
    Ok(())
}

/// Read an embedding matrix written by [`write_matrix`].
pub fn read_matrix(path: &Path) -> Result<Vec<Vec<f32>>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let reader = std::io::BufReader::new(file);
    let mut vectors = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let vector: Vec<f32> =
            serde_json::from_str(&line).context("Malformed embedding row")?;
        vectors.push(vector);
    }
    Ok(vectors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrix_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("embeddings.jsonl");
        let vectors = vec![vec![0.0_f32, 1.0, 2.0], vec![3.0, 4.0, 5.0]];
        write_matrix(&path, &vectors).unwrap();
        let loaded = read_matrix(&path).unwrap();
        assert_eq!(loaded, vectors);
    }

    #[test]
    fn build_rejects_mismatched_dimensions() {
        let vectors = vec![vec![0.0_f32; 4], vec![0.0_f32; 3]];
        assert!(VectorIndex::build(4, &vectors).is_err());
    }

    #[test]
    fn build_rejects_empty_matrix() {
        assert!(VectorIndex::build(4, &[]).is_err());
    }
}
