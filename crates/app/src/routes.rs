use axum::extract::multipart::MultipartError;
use axum::extract::rejection::QueryRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use pdf_qa_core::{ActiveDocument, DocumentService, ServiceError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

pub type AppState = Arc<DocumentService>;

pub fn router(service: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/upload_pdf/", post(upload_pdf))
        .route("/summarize/", post(summarize))
        .route("/ask/", post(ask))
        .route("/document/", get(document))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

#[derive(Debug, Serialize)]
struct MessageResponse {
    message: &'static str,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub filename: String,
    pub message: String,
    pub chunks_created: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SummaryResponse {
    pub summary: String,
}

#[derive(Debug, Deserialize)]
pub struct AskParams {
    pub question: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AskResponse {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DocumentResponse {
    pub filename: String,
    pub chunks: usize,
    pub ingested_at: DateTime<Utc>,
}

impl From<ActiveDocument> for DocumentResponse {
    fn from(document: ActiveDocument) -> Self {
        Self {
            filename: document.filename,
            chunks: document.chunk_count,
            ingested_at: document.ingested_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}

/// A failed request: the status to send and the message for the body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(error: ServiceError) -> Self {
        let status = if error.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self {
            status,
            detail: error.to_string(),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(error: MultipartError) -> Self {
        Self {
            status: error.status(),
            detail: error.body_text(),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, detail = %self.detail, "request failed");
        } else {
            warn!(status = %self.status, detail = %self.detail, "request rejected");
        }
        (self.status, Json(ErrorBody { detail: self.detail })).into_response()
    }
}

async fn root() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "PDF Q&A API is running successfully!",
    })
}

async fn upload_pdf(
    State(service): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| ApiError::bad_request("the `file` field carries no filename"))?;
        if !pdf_qa_core::is_pdf_filename(&filename) {
            return Err(ServiceError::InvalidInput(
                "Invalid file type. Only PDF files are allowed.".to_string(),
            )
            .into());
        }

        let bytes = field.bytes().await?;
        let report = service.ingest(&bytes, &filename).await?;
        info!(file = %report.filename, chunks = report.chunk_count, "upload processed");

        return Ok(Json(UploadResponse {
            filename,
            message: "File uploaded and processed successfully!".to_string(),
            chunks_created: report.chunk_count,
        }));
    }

    Err(ApiError::bad_request("multipart body has no `file` field"))
}

async fn summarize(State(service): State<AppState>) -> Result<Json<SummaryResponse>, ApiError> {
    let summary = service.summarize().await?;
    Ok(Json(SummaryResponse { summary }))
}

async fn ask(
    State(service): State<AppState>,
    params: Result<Query<AskParams>, QueryRejection>,
) -> Result<Json<AskResponse>, ApiError> {
    let Query(params) = params?;
    let answer = service.answer(&params.question).await?;
    Ok(Json(AskResponse {
        question: params.question,
        answer,
    }))
}

async fn document(State(service): State<AppState>) -> Result<Json<DocumentResponse>, ApiError> {
    service
        .active_document()
        .await
        .map(|document| Json(document.into()))
        .ok_or_else(|| ServiceError::NotReady.into())
}
