use crate::error::IngestError;
use lopdf::Document;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

pub trait PdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError>;
}

#[derive(Default)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
        let document = Document::load(path).map_err(|error| IngestError::PdfParse(error.to_string()))?;

        let extracted = document
            .get_pages()
            .into_keys()
            .map(|page_no| (page_no, document.extract_text(&[page_no])));

        readable_pages(path, extracted)
    }
}

/// Keeps pages with text. A page that fails to extract is logged and skipped;
/// only a document with no readable page at all is an error.
fn readable_pages<E: std::fmt::Display>(
    path: &Path,
    extracted: impl IntoIterator<Item = (u32, Result<String, E>)>,
) -> Result<Vec<PageText>, IngestError> {
    let mut pages = Vec::new();
    for (page_no, result) in extracted {
        let text = match result {
            Ok(text) => text,
            Err(error) => {
                warn!(path = %path.display(), page = page_no, %error, "skipping unreadable page");
                continue;
            }
        };

        if !text.trim().is_empty() {
            pages.push(PageText {
                number: page_no,
                text,
            });
        }
    }

    if pages.is_empty() {
        return Err(IngestError::PdfParse(format!(
            "pdf had no readable page text: {}",
            path.display()
        )));
    }

    Ok(pages)
}

pub fn extract_page_texts(path: &Path) -> Result<Vec<PageText>, IngestError> {
    LopdfExtractor.extract_pages(path)
}

/// Runs [`extract_page_texts`] on the blocking pool.
pub async fn extract_page_texts_async(path: PathBuf) -> Result<Vec<PageText>, IngestError> {
    tokio::task::spawn_blocking(move || extract_page_texts(&path))
        .await
        .map_err(|error| IngestError::Task(error.to_string()))?
}

/// PDF builders for tests, shared with dependent crates via `test-fixtures`.
#[cfg(any(test, feature = "test-fixtures"))]
pub mod fixtures {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    /// Builds a PDF with one page per entry of `pages`.
    pub fn text_pdf(pages: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        });

        let mut kids: Vec<Object> = Vec::new();
        for text in pages {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![72.into(), 720.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let encoded = content.encode().expect("content encodes");
            let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).expect("pdf serializes");
        bytes
    }
}
