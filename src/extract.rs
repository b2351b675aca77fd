//! Turning documents on disk into ordered page texts.

use std::path::Path;

use tracing::debug;

use crate::error::{Error, Result};

/// Page separator understood by [`PlainTextExtractor`].
pub const FORM_FEED: char = '\x0c';

/// Extracts the text of a document, one entry per page in page order.
pub trait TextExtractor: Send + Sync {
    fn extract_pages(&self, path: &Path) -> Result<Vec<String>>;
}

/// PDF text extraction backed by `lopdf`.
///
/// Pages whose content stream cannot be decoded come back as empty
/// strings so page numbering stays aligned with the document.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtractor;

impl TextExtractor for PdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<String>> {
        let document =
            lopdf::Document::load(path).map_err(|e| Error::Extraction {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let pages = document
            .get_pages()
            .into_keys()
            .map(|number| {
                document.extract_text(&[number]).unwrap_or_else(|e| {
                    debug!(
                        path = %path.display(),
                        page = number,
                        error = %e,
                        "page has no extractable text"
                    );
                    String::new()
                })
            })
            .collect();

        Ok(pages)
    }
}

/// UTF-8 text files, with form feeds separating pages.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<String>> {
        let bytes = std::fs::read(path)?;
        let content =
            String::from_utf8(bytes).map_err(|e| Error::Extraction {
                path: path.to_path_buf(),
                reason: format!("not valid UTF-8: {e}"),
            })?;
        Ok(content.split(FORM_FEED).map(str::to_string).collect())
    }
}

/// Picks an extractor from the file extension.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExtractorRegistry {
    pdf: PdfExtractor,
    text: PlainTextExtractor,
}

/// File extensions the registry can handle, lower-case.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "txt", "md"];

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn supports(path: &Path) -> bool {
        extension(path)
            .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
    }

    fn extractor_for(&self, path: &Path) -> Option<&dyn TextExtractor> {
        match extension(path)?.as_str() {
            "pdf" => Some(&self.pdf),
            "txt" | "md" => Some(&self.text),
            _ => None,
        }
    }
}

impl TextExtractor for ExtractorRegistry {
    fn extract_pages(&self, path: &Path) -> Result<Vec<String>> {
        let extractor =
            self.extractor_for(path).ok_or_else(|| Error::Extraction {
                path: path.to_path_buf(),
                reason: "unsupported file type".to_string(),
            })?;
        extractor.extract_pages(path)
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_splits_on_form_feed() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("brochure.txt");
        std::fs::write(&path, "page one\x0cpage two\x0c").unwrap();

        let pages = PlainTextExtractor.extract_pages(&path).unwrap();
        assert_eq!(pages, vec!["page one", "page two", ""]);
    }

    #[test]
    fn plain_text_rejects_invalid_utf8() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bad.txt");
        std::fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();

        let err = PlainTextExtractor.extract_pages(&path).unwrap_err();
        assert!(matches!(err, Error::Extraction { .. }));
    }

    #[test]
    fn pdf_that_is_not_a_pdf_fails_extraction() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("fake.pdf");
        std::fs::write(&path, "<html>not a pdf</html>").unwrap();

        let err = PdfExtractor.extract_pages(&path).unwrap_err();
        match err {
            Error::Extraction { path: p, .. } => assert_eq!(p, path),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn registry_dispatches_by_extension() {
        let tmp = tempfile::tempdir().unwrap();
        let md = tmp.path().join("Notes.MD");
        std::fs::write(&md, "# Amenities\npool").unwrap();

        let registry = ExtractorRegistry::new();
        let pages = registry.extract_pages(&md).unwrap();
        assert_eq!(pages, vec!["# Amenities\npool"]);

        let png = tmp.path().join("plan.png");
        std::fs::write(&png, "binary").unwrap();
        assert!(matches!(
            registry.extract_pages(&png),
            Err(Error::Extraction { .. })
        ));
    }

    #[test]
    fn supports_known_extensions_only() {
        assert!(ExtractorRegistry::supports(Path::new("a.pdf")));
        assert!(ExtractorRegistry::supports(Path::new("a.PDF")));
        assert!(ExtractorRegistry::supports(Path::new("dir/b.txt")));
        assert!(!ExtractorRegistry::supports(Path::new("c.docx")));
        assert!(!ExtractorRegistry::supports(Path::new("no_extension")));
    }
}
