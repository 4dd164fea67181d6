//! The per-process context handed to every request handler.

use crate::embeddings::Embedder;
use crate::generation::Generator;
use crate::ingest::{
    build_document_fingerprint, is_pdf_filename, store_upload, upload_file_name, IngestionPipeline,
};
use crate::orchestrator::QueryPipeline;
use crate::session::SessionState;
use crate::traits::IndexProvider;
use crate::{
    ActiveDocument, IngestError, IngestionOptions, IngestionReport, RetrievalOptions, ServiceError,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub upload_dir: PathBuf,
    pub ingestion: IngestionOptions,
    pub retrieval: RetrievalOptions,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("documents"),
            ingestion: IngestionOptions::default(),
            retrieval: RetrievalOptions::default(),
        }
    }
}

pub struct DocumentService {
    config: ServiceConfig,
    ingestion: IngestionPipeline,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    session: SessionState,
}

impl DocumentService {
    pub fn new(
        config: ServiceConfig,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        index_provider: Arc<dyn IndexProvider>,
    ) -> Result<Self, IngestError> {
        let ingestion =
            IngestionPipeline::new(config.ingestion.clone(), embedder.clone(), index_provider)?;

        Ok(Self {
            config,
            ingestion,
            embedder,
            generator,
            session: SessionState::new(),
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// Stores the upload, indexes it and makes it the active document.
    ///
    /// The raw file stays in the upload directory even when indexing fails;
    /// the session only changes once the new index is complete.
    pub async fn ingest(&self, bytes: &[u8], filename: &str) -> Result<IngestionReport, ServiceError> {
        let file_name = upload_file_name(filename)
            .map_err(|error| ServiceError::InvalidInput(error.to_string()))?;
        if !is_pdf_filename(&file_name) {
            return Err(ServiceError::InvalidInput(
                "Invalid file type. Only PDF files are allowed.".to_string(),
            ));
        }

        let path = store_upload(&self.config.upload_dir, &file_name, bytes).await?;
        info!(file = %file_name, path = %path.display(), bytes = bytes.len(), "upload saved");

        let fingerprint = build_document_fingerprint(&path, bytes)?;
        let ingested_at = fingerprint.ingested_at;
        let (report, index) = self.ingestion.run(&path, fingerprint).await?;

        let pipeline = QueryPipeline::new(
            index,
            self.embedder.clone(),
            self.generator.clone(),
            self.config.retrieval,
            ActiveDocument {
                filename: report.filename.clone(),
                scope: report.scope.clone(),
                chunk_count: report.chunk_count,
                ingested_at,
            },
        );

        if let Some(previous) = self.session.set(Arc::new(pipeline)).await {
            warn!(
                previous = %previous.document().filename,
                current = %report.filename,
                "active document replaced"
            );
        }

        Ok(report)
    }

    pub async fn summarize(&self) -> Result<String, ServiceError> {
        self.active_pipeline().await?.summarize().await
    }

    pub async fn answer(&self, question: &str) -> Result<String, ServiceError> {
        self.active_pipeline().await?.answer(question).await
    }

    pub async fn active_document(&self) -> Option<ActiveDocument> {
        self.session
            .get()
            .await
            .map(|pipeline| pipeline.document().clone())
    }

    async fn active_pipeline(&self) -> Result<Arc<QueryPipeline>, ServiceError> {
        self.session.get().await.ok_or(ServiceError::NotReady)
    }
}
