use crate::traits::{check_vectors, IndexProvider, VectorIndex};
use crate::{DocumentChunk, IndexError, SearchHit};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const INDEX_FILE: &str = "index.json";

/// Creates [`LocalVectorIndex`]es under `<root>/<scope>/`.
pub struct LocalIndexProvider {
    root: PathBuf,
}

impl LocalIndexProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl IndexProvider for LocalIndexProvider {
    fn name(&self) -> &str {
        "local"
    }

    async fn from_chunks(
        &self,
        scope: &str,
        chunks: Vec<DocumentChunk>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<Arc<dyn VectorIndex>, IndexError> {
        let index = LocalVectorIndex::new(self.root.join(scope), scope, chunks, embeddings)?;
        Ok(Arc::new(index))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    chunk: DocumentChunk,
    vector: Vec<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredIndex {
    scope: String,
    dimension: usize,
    entries: Vec<StoredEntry>,
}

/// In-memory cosine index that persists itself as JSON.
pub struct LocalVectorIndex {
    directory: PathBuf,
    stored: StoredIndex,
}

impl LocalVectorIndex {
    pub fn new(
        directory: PathBuf,
        scope: &str,
        chunks: Vec<DocumentChunk>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<Self, IndexError> {
        let dimension = check_vectors(&chunks, &embeddings)?;
        let entries = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, vector)| StoredEntry { chunk, vector })
            .collect();

        Ok(Self {
            directory,
            stored: StoredIndex {
                scope: scope.to_string(),
                dimension,
                entries,
            },
        })
    }

    pub fn dimension(&self) -> usize {
        self.stored.dimension
    }

    pub fn index_path(&self) -> PathBuf {
        self.directory.join(INDEX_FILE)
    }
}

#[async_trait]
impl VectorIndex for LocalVectorIndex {
    fn scope(&self) -> &str {
        &self.stored.scope
    }

    fn len(&self) -> usize {
        self.stored.entries.len()
    }

    async fn search(&self, query_vector: &[f32], top_k: usize) -> Result<Vec<SearchHit>, IndexError> {
        if query_vector.len() != self.stored.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.stored.dimension,
                actual: query_vector.len(),
            });
        }

        let mut hits: Vec<SearchHit> = self
            .stored
            .entries
            .iter()
            .map(|entry| SearchHit {
                score: cosine_similarity(query_vector, &entry.vector),
                chunk: entry.chunk.clone(),
            })
            .collect();

        hits.sort_by(|left, right| {
            right
                .score
                .total_cmp(&left.score)
                .then(left.chunk.chunk_index.cmp(&right.chunk.chunk_index))
        });
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn persist(&self) -> Result<(), IndexError> {
        tokio::fs::create_dir_all(&self.directory).await?;
        let payload = serde_json::to_vec(&self.stored)?;
        tokio::fs::write(self.index_path(), payload).await?;
        Ok(())
    }
}

pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    let dot = left.iter().zip(right).map(|(a, b)| a * b).sum::<f32>();
    let left_norm = left.iter().map(|value| value * value).sum::<f32>().sqrt();
    let right_norm = right.iter().map(|value| value * value).sum::<f32>().sqrt();
    if left_norm == 0.0 || right_norm == 0.0 {
        return 0.0;
    }
    dot / (left_norm * right_norm)
}
