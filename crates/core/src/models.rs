use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentFingerprint {
    pub document_id: String,
    pub document_title: String,
    pub source_path: String,
    pub checksum: String,
    pub ingested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub source_path: String,
    pub page: u32,
    pub chunk_index: u64,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub score: f32,
    pub chunk: DocumentChunk,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestionReport {
    pub filename: String,
    pub stored_path: String,
    pub scope: String,
    pub page_count: usize,
    pub chunk_count: usize,
    pub fingerprint: DocumentFingerprint,
}

/// Metadata about the document currently bound to the session.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveDocument {
    pub filename: String,
    pub scope: String,
    pub chunk_count: usize,
    pub ingested_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub embedding_batch_size: usize,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            chunk_size: 1_000,
            chunk_overlap: 100,
            embedding_batch_size: 32,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetrievalOptions {
    pub top_k: usize,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self { top_k: 4 }
    }
}
