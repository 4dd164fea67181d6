pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod generation;
pub mod ingest;
pub mod models;
pub mod orchestrator;
pub mod service;
pub mod session;
pub mod stores;
pub mod traits;

pub use chunking::{build_chunks, normalize_whitespace, split_text, ChunkingConfig};
pub use embeddings::{CharacterNgramEmbedder, Embedder, OllamaEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{EmbeddingError, GenerationError, IndexError, IngestError, ServiceError};
pub use extractor::{extract_page_texts, LopdfExtractor, PageText, PdfExtractor};
pub use generation::{Generator, OllamaGenerator};
pub use ingest::{index_scope, is_pdf_filename, IngestionPipeline};
pub use models::{
    ActiveDocument, DocumentChunk, DocumentFingerprint, IngestionOptions, IngestionReport,
    RetrievalOptions, SearchHit,
};
pub use orchestrator::{build_prompt, QueryPipeline, SUMMARY_INSTRUCTION};
pub use service::{DocumentService, ServiceConfig};
pub use session::SessionState;
pub use stores::{LocalIndexProvider, QdrantIndexProvider};
pub use traits::{IndexProvider, VectorIndex};

/// Joins an API `path` onto an Ollama base URL, keeping any base path.
pub(crate) fn ollama_url(base_url: &str, path: &str) -> Result<url::Url, url::ParseError> {
    let mut base = url::Url::parse(base_url)?;
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    base.join(path)
}
