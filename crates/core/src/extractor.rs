use crate::error::IngestError;
use lopdf::Document;
use std::path::Path;
use tracing::{debug, info, warn};

/// Text of one PDF page. Pages without text never appear, so numbers may skip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

pub trait PdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
        let document =
            Document::load(path).map_err(|error| IngestError::PdfParse(error.to_string()))?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = match document.extract_text(&[page_no]) {
                Ok(text) => text,
                Err(error) => {
                    debug!(page = page_no, %error, "skipping unreadable page");
                    continue;
                }
            };

            let trimmed = text.trim();
            if !trimmed.is_empty() {
                pages.push(PageText {
                    number: page_no,
                    text: trimmed.to_string(),
                });
            }
        }

        Ok(pages)
    }
}

/// Extracts page text, collapsing any file-level failure to zero pages.
pub fn extract_page_texts(extractor: &impl PdfExtractor, path: &Path) -> Vec<PageText> {
    match extractor.extract_pages(path) {
        Ok(pages) => {
            info!(path = %path.display(), pages = pages.len(), "extracted pdf text");
            pages
        }
        Err(error) => {
            warn!(path = %path.display(), %error, "pdf extraction failed");
            Vec::new()
        }
    }
}
