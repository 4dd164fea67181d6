use crate::embeddings::Embedder;
use crate::generation::Generator;
use crate::traits::VectorIndex;
use crate::{ActiveDocument, RetrievalOptions, SearchHit, ServiceError};
use std::sync::Arc;
use tracing::debug;

pub const SUMMARY_INSTRUCTION: &str = "Provide a concise, comprehensive summary of the document covering all key points. Do not include any information that is not in the document.";

const CONTEXT_PREAMBLE: &str = "Use the following pieces of context to answer the question at the end. If you don't know the answer, just say that you don't know, don't try to make up an answer.";

/// retrieve → prompt → generate, bound to one document's index.
pub struct QueryPipeline {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    options: RetrievalOptions,
    document: ActiveDocument,
}

impl QueryPipeline {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        options: RetrievalOptions,
        document: ActiveDocument,
    ) -> Self {
        Self {
            index,
            embedder,
            generator,
            options,
            document,
        }
    }

    pub fn document(&self) -> &ActiveDocument {
        &self.document
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    pub async fn retrieve(&self, query: &str) -> Result<Vec<SearchHit>, ServiceError> {
        let query_vector = self.embedder.embed(query).await?;
        let hits = self
            .index
            .search(&query_vector, self.options.top_k.max(1))
            .await?;
        debug!(scope = self.index.scope(), hits = hits.len(), "retrieved chunks");
        Ok(hits)
    }

    pub async fn answer(&self, question: &str) -> Result<String, ServiceError> {
        if question.trim().is_empty() {
            return Err(ServiceError::InvalidInput(
                "question must not be empty".to_string(),
            ));
        }

        let hits = self.retrieve(question).await?;
        self.generate(&hits, question).await
    }

    pub async fn summarize(&self) -> Result<String, ServiceError> {
        let hits = self.retrieve(SUMMARY_INSTRUCTION).await?;
        self.generate(&hits, SUMMARY_INSTRUCTION).await
    }

    async fn generate(&self, hits: &[SearchHit], question: &str) -> Result<String, ServiceError> {
        let prompt = build_prompt(hits, question);
        let output = self.generator.generate(&prompt).await?;
        debug!(
            generator = self.generator.name(),
            prompt_chars = prompt.len(),
            output_chars = output.len(),
            "generation finished"
        );
        Ok(output)
    }
}

pub fn build_prompt(hits: &[SearchHit], question: &str) -> String {
    let context = hits
        .iter()
        .map(|hit| hit.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    format!("{CONTEXT_PREAMBLE}\n\n{context}\n\nQuestion: {question}\nHelpful Answer:")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::LocalVectorIndex;
    use crate::{CharacterNgramEmbedder, DocumentChunk, GenerationError};
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingGenerator {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Generator for RecordingGenerator {
        fn name(&self) -> &str {
            "recording"
        }

        async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok("  raw output, untouched  ".to_string())
        }
    }

    fn chunk(index: u64, text: &str) -> DocumentChunk {
        DocumentChunk {
            chunk_id: format!("chunk-{index}"),
            document_id: "doc".to_string(),
            source_path: "documents/atlas.pdf".to_string(),
            page: 1,
            chunk_index: index,
            text: text.to_string(),
        }
    }

    async fn pipeline(top_k: usize, generator: Arc<RecordingGenerator>) -> QueryPipeline {
        let embedder = CharacterNgramEmbedder::default();
        let texts = [
            "The sky is blue on a clear day.",
            "Grass is green in spring.",
            "Bananas are yellow when ripe.",
        ];
        let chunks: Vec<_> = texts
            .iter()
            .enumerate()
            .map(|(index, text)| chunk(index as u64, text))
            .collect();
        let vectors = texts.iter().map(|text| embedder.embed_text(text)).collect();
        let index = LocalVectorIndex::new(PathBuf::from("unused"), "atlas", chunks, vectors).unwrap();

        QueryPipeline::new(
            Arc::new(index),
            Arc::new(embedder),
            generator,
            RetrievalOptions { top_k },
            ActiveDocument {
                filename: "atlas.pdf".to_string(),
                scope: "atlas".to_string(),
                chunk_count: 3,
                ingested_at: chrono::Utc::now(),
            },
        )
    }

    #[test]
    fn prompt_holds_context_then_question() {
        let hits = vec![
            SearchHit {
                score: 0.9,
                chunk: chunk(0, "first chunk"),
            },
            SearchHit {
                score: 0.5,
                chunk: chunk(1, "second chunk"),
            },
        ];

        let prompt = build_prompt(&hits, "What is here?");

        let first = prompt.find("first chunk").unwrap();
        let second = prompt.find("second chunk").unwrap();
        let question = prompt.find("Question: What is here?").unwrap();
        assert!(first < second && second < question);
        assert!(prompt.ends_with("Helpful Answer:"));
    }

    #[tokio::test]
    async fn answer_retrieves_the_closest_chunks() {
        let generator = Arc::new(RecordingGenerator::default());
        let pipeline = pipeline(1, generator.clone()).await;

        let answer = pipeline.answer("What color is the sky?").await.unwrap();

        assert_eq!(answer, "  raw output, untouched  ");
        let prompts = generator.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("The sky is blue"));
        assert!(!prompts[0].contains("Bananas"));
    }

    #[tokio::test]
    async fn summarize_uses_the_fixed_instruction() {
        let generator = Arc::new(RecordingGenerator::default());
        let pipeline = pipeline(4, generator.clone()).await;

        pipeline.summarize().await.unwrap();

        let prompts = generator.prompts.lock().unwrap();
        assert!(prompts[0].contains(SUMMARY_INSTRUCTION));
        assert!(prompts[0].contains("Grass is green"));
    }

    #[tokio::test]
    async fn empty_questions_never_reach_the_generator() {
        let generator = Arc::new(RecordingGenerator::default());
        let pipeline = pipeline(4, generator.clone()).await;

        assert!(matches!(
            pipeline.answer("   ").await,
            Err(ServiceError::InvalidInput(_))
        ));
        assert!(generator.prompts.lock().unwrap().is_empty());
    }
}
