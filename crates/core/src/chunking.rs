use crate::error::IngestError;
use crate::models::{DocumentChunk, DocumentFingerprint, IngestionOptions};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        ChunkingConfig::from(&IngestionOptions::default())
    }
}

impl From<&IngestionOptions> for ChunkingConfig {
    fn from(value: &IngestionOptions) -> Self {
        Self {
            chunk_size: value.chunk_size,
            chunk_overlap: value.chunk_overlap,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.chunk_size == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk size must be greater than zero".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap {} must be smaller than chunk size {}",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }

    fn step(&self) -> usize {
        self.chunk_size - self.chunk_overlap
    }
}

/// Collapses every run of Unicode whitespace (including U+00A0) into one space.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Splits `text` into windows of `chunk_size` characters, each starting
/// `chunk_size - chunk_overlap` characters after the previous one.
///
/// Every chunk but the last is exactly `chunk_size` long, and the last one
/// always ends at the end of the text. Lengths count `char`s, not bytes.
pub fn split_text(text: &str, config: ChunkingConfig) -> Result<Vec<String>, IngestError> {
    config.validate()?;

    let chars: Vec<char> = text.chars().collect();
    let mut chunks = Vec::new();
    if chars.is_empty() {
        return Ok(chunks);
    }

    let mut start = 0;
    loop {
        let end = (start + config.chunk_size).min(chars.len());
        chunks.push(chars[start..end].iter().collect::<String>());
        if end == chars.len() {
            break;
        }
        start += config.step();
    }

    Ok(chunks)
}

/// Chunks one page of a document, numbering chunks from `global_index`.
///
/// Returns the chunks and the next free index.
pub fn build_chunks(
    document: &DocumentFingerprint,
    page: u32,
    page_text: &str,
    config: ChunkingConfig,
    global_index: u64,
) -> Result<(Vec<DocumentChunk>, u64), IngestError> {
    let mut chunks = Vec::new();
    let mut cursor = global_index;

    for text in split_text(page_text, config)? {
        if text.trim().is_empty() {
            continue;
        }

        chunks.push(DocumentChunk {
            chunk_id: make_chunk_id(&document.document_id, page, cursor, &text),
            document_id: document.document_id.clone(),
            source_path: document.source_path.clone(),
            page,
            chunk_index: cursor,
            text,
        });

        cursor = cursor.saturating_add(1);
    }

    Ok((chunks, cursor))
}

fn make_chunk_id(document_id: &str, page: u32, index: u64, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document_id.as_bytes());
    hasher.update(page.to_le_bytes());
    hasher.update(index.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(chunk_size: usize, chunk_overlap: usize) -> ChunkingConfig {
        ChunkingConfig {
            chunk_size,
            chunk_overlap,
        }
    }

    fn reassemble(chunks: &[String], overlap: usize) -> String {
        let mut text = String::new();
        for (index, chunk) in chunks.iter().enumerate() {
            if index == 0 {
                text.push_str(chunk);
            } else {
                text.extend(chunk.chars().skip(overlap));
            }
        }
        text
    }

    #[test]
    fn whitespace_is_normalized() {
        let input = "A  \t  lot\nof   spacing";
        let normalized = normalize_whitespace(input);
        assert_eq!(normalized, "A lot of spacing");
    }

    #[test]
    fn removing_overlaps_reconstructs_the_text() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(23);
        for (size, overlap) in [(10, 3), (100, 10), (1_000, 100), (7, 1), (64, 63)] {
            let chunks = split_text(&text, config(size, overlap)).unwrap();
            assert_eq!(reassemble(&chunks, overlap), text, "size={size} overlap={overlap}");

            let (last, full) = chunks.split_last().unwrap();
            assert!(full.iter().all(|chunk| chunk.chars().count() == size));
            assert!(last.chars().count() <= size);
            assert!(last.chars().count() > overlap || chunks.len() == 1);
        }
    }

    #[test]
    fn neighbouring_chunks_share_the_overlap() {
        let text: String = ('a'..='z').cycle().take(95).collect();
        let chunks = split_text(&text, config(20, 5)).unwrap();

        for pair in chunks.windows(2) {
            let tail: String = pair[0].chars().skip(15).collect();
            let head: String = pair[1].chars().take(5).collect();
            assert_eq!(tail, head);
        }
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = split_text("The sky is blue.", config(1_000, 100)).unwrap();
        assert_eq!(chunks, vec!["The sky is blue.".to_string()]);

        let exact: String = "x".repeat(50);
        let chunks = split_text(&exact, config(50, 10)).unwrap();
        assert_eq!(chunks, vec![exact]);
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(split_text("", config(10, 2)).unwrap().is_empty());
    }

    #[test]
    fn overlap_not_smaller_than_size_is_rejected() {
        assert!(matches!(
            split_text("abc", config(10, 10)),
            Err(IngestError::InvalidChunkConfig(_))
        ));
        assert!(matches!(
            split_text("abc", config(0, 0)),
            Err(IngestError::InvalidChunkConfig(_))
        ));
        assert!(config(10, 0).validate().is_ok());
    }

    #[test]
    fn multibyte_text_is_split_on_char_boundaries() {
        let text = "héllo wörld ünïcode ✓✓✓ 日本語のテキスト";
        let chunks = split_text(text, config(6, 2)).unwrap();
        assert!(chunks.iter().all(|chunk| chunk.chars().count() <= 6));
        assert_eq!(reassemble(&chunks, 2), text);
    }

    #[test]
    fn non_breaking_spaces_collapse_with_other_whitespace() {
        assert_eq!(
            normalize_whitespace("total:\u{a0}42\u{a0}\u{a0}EUR \n\tdue"),
            "total: 42 EUR due"
        );
    }

    #[test]
    fn build_chunks_numbers_chunks_across_pages() {
        let document = DocumentFingerprint {
            document_id: "doc-1".to_string(),
            document_title: "Test".to_string(),
            source_path: "/tmp/test.pdf".to_string(),
            checksum: "checksum".to_string(),
            ingested_at: chrono::Utc::now(),
        };

        let (first, cursor) =
            build_chunks(&document, 1, &"a".repeat(25), config(10, 2), 0).unwrap();
        let (second, cursor) = build_chunks(&document, 2, "tail", config(10, 2), cursor).unwrap();

        assert_eq!(first.len(), 3);
        assert_eq!(second.len(), 1);
        assert_eq!(cursor, 4);
        assert_eq!(second[0].page, 2);
        assert_eq!(second[0].chunk_index, 3);
        assert_eq!(second[0].document_id, "doc-1");
        assert_ne!(first[0].chunk_id, first[1].chunk_id);
    }
}
