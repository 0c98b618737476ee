//! Uploaded documents and text extraction.
//!
//! A [`Document`] is the raw upload: a display name, a [`DocumentKind`] and the bytes.
//! An [`Extractor`] turns it into text units (one per PDF page, one for a text file).
//! Extraction never panics into the caller; a PDF parser panic is reported as
//! [`ExtractError::Pdf`].

use std::error::Error;
use std::fs;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;

use tracing::debug;

use crate::error::ExtractError;

/// Formats the pipeline knows how to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    /// UTF-8 text, extracted as a single unit.
    PlainText,
}

impl DocumentKind {
    /// Guess the kind from a file extension (case-insensitive).
    ///
    /// # Errors
    /// [`ExtractError::Unsupported`] for anything other than `pdf`, `txt` or `md`.
    pub fn from_path(path: &Path) -> Result<Self, ExtractError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "pdf" => Ok(DocumentKind::Pdf),
            "txt" | "md" | "markdown" => Ok(DocumentKind::PlainText),
            _ => Err(ExtractError::Unsupported(path.display().to_string())),
        }
    }
}

/// One uploaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    name: String,
    kind: DocumentKind,
    bytes: Vec<u8>,
}

impl Document {
    pub fn new(name: impl Into<String>, kind: DocumentKind, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            kind,
            bytes,
        }
    }

    /// Read a document from disk, deriving its kind from the extension.
    ///
    /// # Errors
    /// - The extension is not supported.
    /// - The file cannot be read.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, Box<dyn Error>> {
        let path = path.as_ref();
        let kind = DocumentKind::from_path(path)?;
        let bytes = fs::read(path)?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        debug!("Read {} ({:?}, {} bytes)", name, kind, bytes.len());
        Ok(Self::new(name, kind, bytes))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Turns a document into text units, in reading order.
pub trait Extractor: Send + Sync {
    /// # Errors
    /// The whole document is unreadable. Callers treat that as empty text.
    fn extract_units(&self, document: &Document) -> Result<Vec<String>, ExtractError>;
}

/// `pdf-extract` for PDFs, lossy UTF-8 decoding for text files.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardExtractor;

impl Extractor for StandardExtractor {
    fn extract_units(&self, document: &Document) -> Result<Vec<String>, ExtractError> {
        match document.kind() {
            DocumentKind::PlainText => {
                Ok(vec![String::from_utf8_lossy(document.bytes()).into_owned()])
            }
            DocumentKind::Pdf => extract_pdf_pages(document.bytes()),
        }
    }
}

fn extract_pdf_pages(bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
    // pdf-extract panics on some malformed inputs.
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem_by_pages(bytes)
    }));

    match outcome {
        Ok(Ok(pages)) => Ok(pages),
        Ok(Err(e)) => Err(ExtractError::Pdf(e.to_string())),
        Err(_) => Err(ExtractError::Pdf("the PDF parser panicked".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    #[test]
    fn test_kind_from_extension() {
        assert_eq!(
            DocumentKind::from_path(Path::new("paper.PDF")).unwrap(),
            DocumentKind::Pdf
        );
        assert_eq!(
            DocumentKind::from_path(Path::new("notes.md")).unwrap(),
            DocumentKind::PlainText
        );
        assert!(matches!(
            DocumentKind::from_path(Path::new("slides.pptx")),
            Err(ExtractError::Unsupported(_))
        ));
        assert!(DocumentKind::from_path(Path::new("README")).is_err());
    }

    #[test]
    fn test_document_from_path() {
        let mut file = Builder::new().suffix(".txt").tempfile().unwrap();
        write!(file, "plain words").unwrap();

        let document = Document::from_path(file.path()).unwrap();
        assert_eq!(document.kind(), DocumentKind::PlainText);
        assert_eq!(document.bytes(), b"plain words");
        assert!(document.name().ends_with(".txt"));
    }

    #[test]
    fn test_plain_text_is_one_unit() {
        let document = Document::new(
            "a.txt",
            DocumentKind::PlainText,
            b"line one\nline two".to_vec(),
        );
        let units = StandardExtractor.extract_units(&document).unwrap();
        assert_eq!(units, vec!["line one\nline two".to_string()]);
    }

    #[test]
    fn test_garbage_pdf_is_an_error_not_a_panic() {
        let document = Document::new("broken.pdf", DocumentKind::Pdf, b"not a pdf at all".to_vec());
        let result = StandardExtractor.extract_units(&document);
        assert!(matches!(result, Err(ExtractError::Pdf(_))));
    }
}
