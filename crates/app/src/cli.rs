use anyhow::Context;
use clap::{Parser, ValueEnum};
use pdf_qa_core::{
    CharacterNgramEmbedder, DocumentService, Embedder, IndexProvider, IngestionOptions,
    LocalIndexProvider, OllamaEmbedder, OllamaGenerator, QdrantIndexProvider, RetrievalOptions,
    ServiceConfig,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EmbedderKind {
    /// Ollama `/api/embed`.
    Ollama,
    /// Hashed character trigrams, no model server needed.
    Ngram,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum VectorStoreKind {
    /// JSON index files under --index-dir.
    Local,
    /// One Qdrant collection per document.
    Qdrant,
}

#[derive(Debug, Parser)]
#[command(name = "pdf-qa-server", version, about = "Upload a PDF, then summarize it or ask questions about it")]
pub struct Cli {
    /// Address to bind the HTTP server to (host:port).
    #[arg(long, env = "PDF_QA_BIND", default_value = "127.0.0.1:8000")]
    pub bind: String,

    /// Directory uploaded PDFs are written to.
    #[arg(long, env = "PDF_QA_UPLOAD_DIR", default_value = "documents")]
    pub upload_dir: PathBuf,

    /// Directory local vector indices are persisted under.
    #[arg(long, env = "PDF_QA_INDEX_DIR", default_value = "chroma_db")]
    pub index_dir: PathBuf,

    /// Ollama base URL
    #[arg(long, env = "PDF_QA_OLLAMA_URL", default_value = "http://localhost:11434")]
    pub ollama_url: String,

    /// Model used for generation.
    #[arg(long, env = "PDF_QA_MODEL", default_value = "mistral")]
    pub model: String,

    /// Model used for embeddings; defaults to --model.
    #[arg(long, env = "PDF_QA_EMBEDDING_MODEL")]
    pub embedding_model: Option<String>,

    #[arg(long, env = "PDF_QA_EMBEDDER", value_enum, default_value = "ollama")]
    pub embedder: EmbedderKind,

    /// Vector size for the ngram embedder.
    #[arg(long, env = "PDF_QA_EMBEDDING_DIMENSIONS", default_value_t = pdf_qa_core::DEFAULT_EMBEDDING_DIMENSIONS)]
    pub embedding_dimensions: usize,

    /// Max chunks per embedding request.
    #[arg(long, env = "PDF_QA_EMBEDDING_BATCH", default_value_t = 32)]
    pub embedding_batch_size: usize,

    #[arg(long, env = "PDF_QA_VECTOR_STORE", value_enum, default_value = "local")]
    pub vector_store: VectorStoreKind,

    /// Qdrant base URL
    #[arg(long, env = "PDF_QA_QDRANT_URL", default_value = "http://localhost:6333")]
    pub qdrant_url: String,

    /// Qdrant collection name prefix
    #[arg(long, env = "PDF_QA_QDRANT_COLLECTION_PREFIX", default_value = "pdf_qa")]
    pub qdrant_collection_prefix: String,

    /// Chunk length in characters.
    #[arg(long, env = "PDF_QA_CHUNK_SIZE", default_value_t = 1_000)]
    pub chunk_size: usize,

    /// Characters shared by neighbouring chunks.
    #[arg(long, env = "PDF_QA_CHUNK_OVERLAP", default_value_t = 100)]
    pub chunk_overlap: usize,

    /// Chunks retrieved per question.
    #[arg(long, env = "PDF_QA_TOP_K", default_value_t = 4)]
    pub top_k: usize,

    /// Timeout for provider HTTP calls. Unset means wait indefinitely.
    #[arg(long, env = "PDF_QA_REQUEST_TIMEOUT_SECS")]
    pub request_timeout_secs: Option<u64>,

    /// Largest accepted upload body in bytes.
    #[arg(long, env = "PDF_QA_MAX_UPLOAD_BYTES", default_value_t = 50 * 1024 * 1024)]
    pub max_upload_bytes: usize,
}

impl Cli {
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            upload_dir: self.upload_dir.clone(),
            ingestion: IngestionOptions {
                chunk_size: self.chunk_size,
                chunk_overlap: self.chunk_overlap,
                embedding_batch_size: self.embedding_batch_size.max(1),
            },
            retrieval: RetrievalOptions {
                top_k: self.top_k.max(1),
            },
        }
    }

    pub fn build_service(&self) -> anyhow::Result<DocumentService> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = self.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs.max(1)));
        }
        let client = builder.build().context("failed to build http client")?;

        let embedder: Arc<dyn Embedder> = match self.embedder {
            EmbedderKind::Ollama => {
                let model = self.embedding_model.as_deref().unwrap_or(&self.model);
                Arc::new(
                    OllamaEmbedder::new(client.clone(), &self.ollama_url, model)
                        .with_context(|| format!("invalid ollama url {}", self.ollama_url))?,
                )
            }
            EmbedderKind::Ngram => Arc::new(CharacterNgramEmbedder {
                dimensions: self.embedding_dimensions.max(1),
            }),
        };

        let generator = Arc::new(
            OllamaGenerator::new(client.clone(), &self.ollama_url, &self.model)
                .with_context(|| format!("invalid ollama url {}", self.ollama_url))?,
        );

        let index_provider: Arc<dyn IndexProvider> = match self.vector_store {
            VectorStoreKind::Local => Arc::new(LocalIndexProvider::new(&self.index_dir)),
            VectorStoreKind::Qdrant => Arc::new(
                QdrantIndexProvider::new(client, &self.qdrant_url, &self.qdrant_collection_prefix)
                    .with_context(|| format!("invalid qdrant url {}", self.qdrant_url))?,
            ),
        };

        DocumentService::new(self.service_config(), embedder, generator, index_provider)
            .context("invalid ingestion settings")
    }
}
