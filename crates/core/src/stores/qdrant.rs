use crate::traits::{check_vectors, IndexProvider, VectorIndex};
use crate::{DocumentChunk, IndexError, SearchHit};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Response};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use url::Url;

/// Creates a fresh Qdrant collection for every ingestion. Earlier collections
/// are left untouched, so an index still bound to the session keeps working
/// when a later build fails.
pub struct QdrantIndexProvider {
    endpoint: Url,
    collection_prefix: String,
    client: Client,
    builds: AtomicU64,
}

impl QdrantIndexProvider {
    pub fn new(
        client: Client,
        endpoint: &str,
        collection_prefix: impl Into<String>,
    ) -> Result<Self, IndexError> {
        let mut endpoint = Url::parse(endpoint)?;
        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }

        Ok(Self {
            endpoint,
            collection_prefix: collection_prefix.into(),
            client,
            builds: AtomicU64::new(0),
        })
    }

    /// `<prefix>_<scope>`, with characters Qdrant rejects replaced by `_`.
    pub fn collection_name(&self, scope: &str) -> String {
        let scope: String = scope
            .chars()
            .map(|ch| {
                if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                    ch
                } else {
                    '_'
                }
            })
            .collect();
        format!("{}_{}", self.collection_prefix, scope)
    }

    /// A collection name no earlier build of this provider has used.
    fn next_collection_name(&self, scope: &str) -> String {
        let build = self.builds.fetch_add(1, Ordering::Relaxed);
        format!(
            "{}_{:x}{:04x}",
            self.collection_name(scope),
            Utc::now().timestamp_millis(),
            build
        )
    }

    async fn create_collection(&self, collection: &str, dimension: usize) -> Result<(), IndexError> {
        let response = self
            .client
            .put(self.endpoint.join(&format!("collections/{collection}"))?)
            .json(&json!({
                "vectors": { "size": dimension, "distance": "Cosine" },
            }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(backend_error(response).await);
        }

        Ok(())
    }

    /// Builds the index in a new collection.
    pub async fn build(
        &self,
        scope: &str,
        chunks: Vec<DocumentChunk>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<QdrantVectorIndex, IndexError> {
        let dimension = check_vectors(&chunks, &embeddings)?;
        let collection = self.next_collection_name(scope);
        self.create_collection(&collection, dimension).await?;

        let points = chunks
            .iter()
            .zip(embeddings.iter())
            .map(|(chunk, embedding)| {
                Ok(json!({
                    "id": chunk.chunk_index,
                    "vector": embedding,
                    "payload": serde_json::to_value(chunk)?,
                }))
            })
            .collect::<Result<Vec<_>, IndexError>>()?;

        let response = self
            .client
            .put(
                self.endpoint
                    .join(&format!("collections/{collection}/points?wait=true"))?,
            )
            .json(&json!({ "points": points }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response).await);
        }

        tracing::debug!(%collection, points = chunks.len(), "qdrant collection ready");
        Ok(QdrantVectorIndex {
            search_url: self
                .endpoint
                .join(&format!("collections/{collection}/points/search"))?,
            client: self.client.clone(),
            collection,
            scope: scope.to_string(),
            dimension,
            len: chunks.len(),
        })
    }
}

#[async_trait]
impl IndexProvider for QdrantIndexProvider {
    fn name(&self) -> &str {
        "qdrant"
    }

    async fn from_chunks(
        &self,
        scope: &str,
        chunks: Vec<DocumentChunk>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<Arc<dyn VectorIndex>, IndexError> {
        Ok(Arc::new(self.build(scope, chunks, embeddings).await?))
    }
}

pub struct QdrantVectorIndex {
    search_url: Url,
    client: Client,
    collection: String,
    scope: String,
    dimension: usize,
    len: usize,
}

impl QdrantVectorIndex {
    pub fn collection(&self) -> &str {
        &self.collection
    }
}

#[async_trait]
impl VectorIndex for QdrantVectorIndex {
    fn scope(&self) -> &str {
        &self.scope
    }

    fn len(&self) -> usize {
        self.len
    }

    async fn search(&self, query_vector: &[f32], top_k: usize) -> Result<Vec<SearchHit>, IndexError> {
        if query_vector.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: query_vector.len(),
            });
        }

        let response = self
            .client
            .post(self.search_url.clone())
            .json(&json!({
                "vector": query_vector,
                "limit": top_k,
                "with_payload": true,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response).await);
        }

        let parsed: Value = response.json().await?;
        parse_hits(&parsed)
    }

    async fn persist(&self) -> Result<(), IndexError> {
        // Qdrant persists upserted points itself.
        Ok(())
    }
}

fn parse_hits(parsed: &Value) -> Result<Vec<SearchHit>, IndexError> {
    let hits = parsed
        .pointer("/result")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut result = Vec::with_capacity(hits.len());
    for hit in hits {
        let score = hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0);
        let payload = hit.get("payload").cloned().unwrap_or(Value::Null);
        let chunk: DocumentChunk = serde_json::from_value(payload)?;
        result.push(SearchHit {
            score: score as f32,
            chunk,
        });
    }

    Ok(result)
}

async fn backend_error(response: Response) -> IndexError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    IndexError::BackendResponse {
        backend: "qdrant".to_string(),
        details: format!("{status}: {body}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn chunk(index: u64, text: &str) -> DocumentChunk {
        DocumentChunk {
            chunk_id: format!("chunk-{index}"),
            document_id: "doc".to_string(),
            source_path: "documents/report.pdf".to_string(),
            page: 1,
            chunk_index: index,
            text: text.to_string(),
        }
    }

    #[test]
    fn collection_names_are_sanitized() {
        let provider =
            QdrantIndexProvider::new(Client::new(), "http://localhost:6333", "pdf_qa").unwrap();
        assert_eq!(provider.collection_name("report"), "pdf_qa_report");
        assert_eq!(provider.collection_name("q3 report/final"), "pdf_qa_q3_report_final");
    }

    #[test]
    fn every_build_gets_its_own_collection() {
        let provider =
            QdrantIndexProvider::new(Client::new(), "http://localhost:6333", "pdf_qa").unwrap();

        let first = provider.next_collection_name("report");
        let second = provider.next_collection_name("report");

        assert_ne!(first, second);
        assert!(first.starts_with("pdf_qa_report_"));
        assert!(second.starts_with("pdf_qa_report_"));
    }

    #[tokio::test]
    async fn failed_rebuild_leaves_the_live_collection_searchable() {
        let mut server = mockito::Server::new_async().await;
        let create = server
            .mock("PUT", Matcher::Regex(r"^/collections/pdf_qa_report_[0-9a-f]+$".to_string()))
            .with_status(200)
            .with_body(r#"{"result": true, "status": "ok"}"#)
            .expect(2)
            .create_async()
            .await;
        let upsert_ok = server
            .mock("PUT", Matcher::Regex(r"^/collections/pdf_qa_report_[0-9a-f]+/points".to_string()))
            .with_status(200)
            .with_body(r#"{"result": {"status": "completed"}, "status": "ok"}"#)
            .create_async()
            .await;
        let delete = server
            .mock("DELETE", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let provider = QdrantIndexProvider::new(Client::new(), &server.url(), "pdf_qa").unwrap();
        let live = provider
            .build("report", vec![chunk(0, "The sky is blue.")], vec![vec![1.0, 0.0]])
            .await
            .unwrap();

        upsert_ok.remove_async().await;
        let upsert_failing = server
            .mock("PUT", Matcher::Regex(r"^/collections/pdf_qa_report_[0-9a-f]+/points".to_string()))
            .with_status(500)
            .with_body("disk full")
            .create_async()
            .await;

        let rebuilt = provider
            .build("report", vec![chunk(0, "Grass is green.")], vec![vec![0.0, 1.0]])
            .await;
        assert!(matches!(rebuilt, Err(IndexError::BackendResponse { .. })));

        let search = server
            .mock("POST", format!("/collections/{}/points/search", live.collection()).as_str())
            .with_status(200)
            .with_body(
                json!({
                    "result": [{ "id": 0, "score": 0.99, "payload": chunk(0, "The sky is blue.") }],
                    "status": "ok"
                })
                .to_string(),
            )
            .create_async()
            .await;

        let hits = live.search(&[1.0, 0.0], 4).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.text, "The sky is blue.");

        create.assert_async().await;
        upsert_failing.assert_async().await;
        search.assert_async().await;
        delete.assert_async().await;
    }

    #[test]
    fn search_payloads_become_hits() {
        let response = json!({
            "result": [
                {
                    "id": 0,
                    "score": 0.92,
                    "payload": {
                        "chunk_id": "abc",
                        "document_id": "doc",
                        "source_path": "documents/report.pdf",
                        "page": 2,
                        "chunk_index": 0,
                        "text": "The sky is blue."
                    }
                }
            ],
            "status": "ok"
        });

        let hits = parse_hits(&response).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.page, 2);
        assert_eq!(hits[0].chunk.text, "The sky is blue.");
        assert!((hits[0].score - 0.92).abs() < 1e-6);
    }

    #[test]
    fn missing_payload_is_a_serialization_error() {
        let response = json!({ "result": [{ "id": 1, "score": 0.1 }] });
        assert!(matches!(
            parse_hits(&response),
            Err(IndexError::Serialization(_))
        ));
    }
}
