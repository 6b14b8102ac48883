//! Document loading: file read, unlock, per-page text, concatenation

use crate::error::ExtractionError;
use crate::pdf::lopdf_text::extract_pages_lopdf;
use crate::pdf::qpdf::QpdfWrapper;
use crate::pdf::reader::{bind_pdfium, extract_pages_pdfium, LayoutConfig};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Separator placed between page texts
pub const PAGE_SEPARATOR: &str = "\n\n";

/// Which text backend reads the unlocked document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractorBackend {
    /// PDFium when the library can be bound, lopdf otherwise
    #[default]
    Auto,
    Pdfium,
    Lopdf,
}

impl FromStr for ExtractorBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "pdfium" => Ok(Self::Pdfium),
            "lopdf" => Ok(Self::Lopdf),
            other => Err(format!(
                "unknown backend '{}', expected auto, pdfium or lopdf",
                other
            )),
        }
    }
}

impl fmt::Display for ExtractorBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Auto => "auto",
            Self::Pdfium => "pdfium",
            Self::Lopdf => "lopdf",
        })
    }
}

/// Text extracted from one SAP PDF. Immutable once built.
#[derive(Debug, Clone)]
pub struct Document {
    /// Where the bytes came from (file path)
    pub source: String,
    pub page_count: u32,
    /// Text of each page, in page order
    pub pages: Vec<String>,
    /// Concatenated body
    pub text: String,
    /// Whether the file was password protected
    pub was_encrypted: bool,
    /// Backend that actually produced the text
    pub backend: ExtractorBackend,
}

impl Document {
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

/// Concatenate page texts in page order, separated by a paragraph break.
/// Blank pages contribute nothing.
pub fn join_pages(pages: &[String]) -> String {
    pages
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(PAGE_SEPARATOR)
}

/// Extracts document text from PDF files
#[derive(Debug, Clone, Default)]
pub struct TextExtractor {
    backend: ExtractorBackend,
    layout: LayoutConfig,
}

impl TextExtractor {
    pub fn new(backend: ExtractorBackend) -> Self {
        Self {
            backend,
            layout: LayoutConfig::default(),
        }
    }

    /// Read a PDF from disk and extract its text
    pub fn extract<P: AsRef<Path>>(
        &self,
        path: P,
        password: Option<&str>,
    ) -> Result<Document, ExtractionError> {
        let path = path.as_ref();
        let source = path.display().to_string();

        if !path.exists() {
            return Err(ExtractionError::NotFound { path: source });
        }

        let data = std::fs::read(path).map_err(|e| ExtractionError::Io {
            path: source.clone(),
            source: e,
        })?;

        tracing::info!(path = %source, bytes = data.len(), "Extracting text from PDF");
        self.extract_bytes(&data, source, password)
    }

    /// Extract text from PDF bytes already in memory
    pub fn extract_bytes(
        &self,
        data: &[u8],
        source: String,
        password: Option<&str>,
    ) -> Result<Document, ExtractionError> {
        if data.len() < 4 || &data[0..4] != b"%PDF" {
            return Err(ExtractionError::InvalidPdf {
                reason: "Not a valid PDF file".to_string(),
            });
        }

        let unlocked = QpdfWrapper::unlock(data, password)?;
        tracing::info!(
            pages = unlocked.page_count,
            encrypted = unlocked.was_encrypted,
            "Opened PDF"
        );

        let (pages, backend) = self.extract_pages(&unlocked.data)?;
        let text = join_pages(&pages);

        if text.is_empty() {
            tracing::warn!(path = %source, "No text could be extracted from the PDF");
            return Err(ExtractionError::NoTextLayer {
                pages: unlocked.page_count,
            });
        }

        tracing::info!(
            chars = text.chars().count(),
            backend = %backend,
            "Successfully extracted document text"
        );

        Ok(Document {
            source,
            page_count: unlocked.page_count,
            pages,
            text,
            was_encrypted: unlocked.was_encrypted,
            backend,
        })
    }

    fn extract_pages(
        &self,
        data: &[u8],
    ) -> Result<(Vec<String>, ExtractorBackend), ExtractionError> {
        match self.backend {
            ExtractorBackend::Lopdf => Ok((extract_pages_lopdf(data)?, ExtractorBackend::Lopdf)),
            ExtractorBackend::Pdfium => {
                let pdfium = bind_pdfium()?;
                let pages = extract_pages_pdfium(&pdfium, data, &self.layout)?;
                Ok((pages, ExtractorBackend::Pdfium))
            }
            ExtractorBackend::Auto => match bind_pdfium() {
                Ok(pdfium) => match extract_pages_pdfium(&pdfium, data, &self.layout) {
                    Ok(pages) => Ok((pages, ExtractorBackend::Pdfium)),
                    Err(e) => {
                        tracing::warn!(error = %e, "PDFium extraction failed, falling back to lopdf");
                        Ok((extract_pages_lopdf(data)?, ExtractorBackend::Lopdf))
                    }
                },
                Err(e) => {
                    tracing::debug!(error = %e, "PDFium unavailable, using lopdf");
                    Ok((extract_pages_lopdf(data)?, ExtractorBackend::Lopdf))
                }
            },
        }
    }
}
