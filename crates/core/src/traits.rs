use crate::{DocumentChunk, IndexError, SearchHit};
use async_trait::async_trait;
use std::sync::Arc;

/// A populated, searchable index over one document's chunks.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    fn scope(&self) -> &str;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Nearest chunks to `query_vector`, best first.
    async fn search(&self, query_vector: &[f32], top_k: usize) -> Result<Vec<SearchHit>, IndexError>;

    async fn persist(&self) -> Result<(), IndexError>;
}

/// Builds fresh indices, one per ingested document.
#[async_trait]
pub trait IndexProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn from_chunks(
        &self,
        scope: &str,
        chunks: Vec<DocumentChunk>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<Arc<dyn VectorIndex>, IndexError>;
}

/// Checks that chunks and embeddings line up and share one dimension.
pub(crate) fn check_vectors(
    chunks: &[DocumentChunk],
    embeddings: &[Vec<f32>],
) -> Result<usize, IndexError> {
    if chunks.len() != embeddings.len() {
        return Err(IndexError::CountMismatch {
            chunks: chunks.len(),
            embeddings: embeddings.len(),
        });
    }

    let dimension = embeddings.first().map(Vec::len).ok_or(IndexError::Empty)?;
    if let Some(bad) = embeddings.iter().find(|vector| vector.len() != dimension) {
        return Err(IndexError::DimensionMismatch {
            expected: dimension,
            actual: bad.len(),
        });
    }

    Ok(dimension)
}
