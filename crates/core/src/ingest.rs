use crate::chunking::{build_chunks, normalize_whitespace, ChunkingConfig};
use crate::embeddings::Embedder;
use crate::extractor::extract_page_texts_async;
use crate::traits::{IndexProvider, VectorIndex};
use crate::{DocumentChunk, DocumentFingerprint, IngestError, IngestionOptions, IngestionReport};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

pub fn is_pdf_filename(filename: &str) -> bool {
    filename.to_lowercase().ends_with(".pdf")
}

/// The final path component of a client-supplied file name.
pub fn upload_file_name(filename: &str) -> Result<String, IngestError> {
    Path::new(filename)
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| IngestError::MissingFileName(filename.to_string()))
}

/// Per-document index name: the file name up to its first `.`.
pub fn index_scope(file_name: &str) -> String {
    let scope = file_name.split('.').next().unwrap_or_default().trim();
    if scope.is_empty() {
        "document".to_string()
    } else {
        scope.to_string()
    }
}

pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Writes an upload to `<upload_dir>/<file_name>`, replacing any earlier file.
pub async fn store_upload(
    upload_dir: &Path,
    file_name: &str,
    bytes: &[u8],
) -> Result<PathBuf, IngestError> {
    tokio::fs::create_dir_all(upload_dir).await?;
    let path = upload_dir.join(file_name);
    tokio::fs::write(&path, bytes).await?;
    Ok(path)
}

pub fn build_document_fingerprint(path: &Path, bytes: &[u8]) -> Result<DocumentFingerprint, IngestError> {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            IngestError::MissingFileName(format!("path missing filename: {}", path.display()))
        })?;

    Ok(DocumentFingerprint {
        document_id: generate_document_id(path),
        document_title: name.to_string(),
        source_path: path.to_string_lossy().to_string(),
        checksum: digest_bytes(bytes),
        ingested_at: Utc::now(),
    })
}

fn generate_document_id(path: &Path) -> String {
    digest_bytes(path.to_string_lossy().as_bytes())
}

/// load → chunk → embed → index for a document already on disk.
pub struct IngestionPipeline {
    options: IngestionOptions,
    embedder: Arc<dyn Embedder>,
    index_provider: Arc<dyn IndexProvider>,
}

impl IngestionPipeline {
    pub fn new(
        options: IngestionOptions,
        embedder: Arc<dyn Embedder>,
        index_provider: Arc<dyn IndexProvider>,
    ) -> Result<Self, IngestError> {
        ChunkingConfig::from(&options).validate()?;
        Ok(Self {
            options,
            embedder,
            index_provider,
        })
    }

    pub fn options(&self) -> &IngestionOptions {
        &self.options
    }

    pub async fn run(
        &self,
        stored_path: &Path,
        fingerprint: DocumentFingerprint,
    ) -> Result<(IngestionReport, Arc<dyn VectorIndex>), IngestError> {
        let pages = extract_page_texts_async(stored_path.to_path_buf()).await?;
        let page_count = pages.len();
        let chunks = self.chunk_pages(&fingerprint, &pages)?;
        if chunks.is_empty() {
            return Err(IngestError::NoText(fingerprint.source_path));
        }

        debug!(
            path = %stored_path.display(),
            pages = page_count,
            chunks = chunks.len(),
            embedder = self.embedder.name(),
            "embedding chunks"
        );
        let embeddings = self.embed_chunks(&chunks).await?;

        let scope = index_scope(&fingerprint.document_title);
        let chunk_count = chunks.len();
        let index = self
            .index_provider
            .from_chunks(&scope, chunks, embeddings)
            .await?;
        index.persist().await?;

        info!(
            path = %stored_path.display(),
            scope = %scope,
            store = self.index_provider.name(),
            chunk_count,
            "document indexed"
        );

        let report = IngestionReport {
            filename: fingerprint.document_title.clone(),
            stored_path: fingerprint.source_path.clone(),
            scope,
            page_count,
            chunk_count,
            fingerprint,
        };
        Ok((report, index))
    }

    fn chunk_pages(
        &self,
        fingerprint: &DocumentFingerprint,
        pages: &[crate::PageText],
    ) -> Result<Vec<DocumentChunk>, IngestError> {
        let config = ChunkingConfig::from(&self.options);
        let mut cursor = 0u64;
        let mut chunks = Vec::new();

        for page in pages {
            let normalized = normalize_whitespace(&page.text);
            let (page_chunks, next_cursor) =
                build_chunks(fingerprint, page.number, &normalized, config, cursor)?;
            cursor = next_cursor;
            chunks.extend(page_chunks);
        }

        Ok(chunks)
    }

    async fn embed_chunks(&self, chunks: &[DocumentChunk]) -> Result<Vec<Vec<f32>>, IngestError> {
        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let mut embeddings = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.options.embedding_batch_size.max(1)) {
            embeddings.extend(self.embedder.embed_batch(batch).await?);
        }

        if embeddings.len() != chunks.len() {
            return Err(IngestError::Embedding(crate::EmbeddingError::CountMismatch {
                expected: chunks.len(),
                returned: embeddings.len(),
            }));
        }

        Ok(embeddings)
    }
}
