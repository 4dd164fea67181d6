use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("document produced no text chunks: {0}")]
    NoText(String),

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("vector index failed: {0}")]
    Index(#[from] IndexError),

    #[error("background task failed: {0}")]
    Task(String),
}

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("embedding count {returned} doesn't match input count {expected}")]
    CountMismatch { expected: usize, returned: usize },
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("vector dimension {actual} does not match index dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding count {embeddings} doesn't match chunk count {chunks}")]
    CountMismatch { chunks: usize, embeddings: usize },

    #[error("cannot build an index without chunks")]
    Empty,
}

/// Errors surfaced by [`crate::DocumentService`] to request handlers.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("An error occurred during file processing: {0}")]
    Ingestion(#[source] IngestError),

    #[error("No document has been processed yet. Please upload a PDF.")]
    NotReady,

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("vector search failed: {0}")]
    Index(#[from] IndexError),
}

impl ServiceError {
    /// True when the caller, not a collaborator, is at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidInput(_) | Self::NotReady)
    }
}

impl From<IngestError> for ServiceError {
    fn from(value: IngestError) -> Self {
        Self::Ingestion(value)
    }
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
