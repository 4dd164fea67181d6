//! Text generation providers.

use crate::error::GenerationError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

/// Maps a prompt to generated text. The output is returned untouched.
#[async_trait]
pub trait Generator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

#[derive(Debug, Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

/// Completions from an Ollama server's `/api/generate` endpoint, non-streaming.
pub struct OllamaGenerator {
    client: Client,
    endpoint: Url,
    model: String,
}

impl OllamaGenerator {
    pub fn new(client: Client, base_url: &str, model: impl Into<String>) -> Result<Self, GenerationError> {
        Ok(Self {
            client,
            endpoint: crate::ollama_url(base_url, "api/generate")?,
            model: model.into(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        tracing::debug!(endpoint = %self.endpoint, model = %self.model, "sending generation request");

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&OllamaGenerateRequest {
                model: &self.model,
                prompt,
                stream: false,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::BackendResponse {
                backend: "ollama".to_string(),
                details: format!("{status}: {body}"),
            });
        }

        let parsed: OllamaGenerateResponse = response.json().await?;
        Ok(parsed.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_endpoint_keeps_base_path() {
        let generator =
            OllamaGenerator::new(Client::new(), "http://gpu-box:11434/ollama", "mistral").unwrap();
        assert_eq!(
            generator.endpoint.as_str(),
            "http://gpu-box:11434/ollama/api/generate"
        );
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        assert!(matches!(
            OllamaGenerator::new(Client::new(), "not a url", "mistral"),
            Err(GenerationError::Url(_))
        ));
    }

    #[test]
    fn request_is_non_streaming() {
        let body = serde_json::to_value(OllamaGenerateRequest {
            model: "mistral",
            prompt: "hi",
            stream: false,
        })
        .unwrap();
        assert_eq!(body["stream"], serde_json::json!(false));
        assert_eq!(body["model"], "mistral");
    }

    #[tokio::test]
    async fn unreachable_ollama_is_an_http_error() {
        let generator = OllamaGenerator::new(Client::new(), "http://127.0.0.1:9", "mistral").unwrap();
        assert!(matches!(
            generator.generate("hello").await,
            Err(GenerationError::Http(_))
        ));
    }
}
