//! PDF processing layer
//!
//! Password handling goes through qpdf; page text comes from PDFium
//! (layout-aware) or lopdf (pure Rust fallback).

mod extractor;
mod lopdf_text;
mod qpdf;
mod reader;

pub use extractor::{join_pages, Document, ExtractorBackend, TextExtractor, PAGE_SEPARATOR};
pub use lopdf_text::extract_pages_lopdf;
pub use qpdf::{QpdfWrapper, UnlockedPdf};
pub use reader::{bind_pdfium, extract_pages_pdfium, layout_page_text, Glyph, LayoutConfig};
