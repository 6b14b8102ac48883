//! Content-stream text extraction with lopdf
//!
//! Used when the PDFium library is not available on the host. Reading order
//! follows the content stream, which matches the visual order for the
//! word-processor exports SAPs are usually produced from.

use crate::error::ExtractionError;
use lopdf::Document;

/// Extract the text of every page, in page order.
///
/// `data` must already be decrypted.
pub fn extract_pages_lopdf(data: &[u8]) -> Result<Vec<String>, ExtractionError> {
    let doc = Document::load_mem(data).map_err(|e| ExtractionError::Backend {
        backend: "lopdf",
        reason: format!("Failed to load document: {}", e),
    })?;

    let page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
    let mut texts = Vec::with_capacity(page_numbers.len());

    for page_num in page_numbers {
        let text = match doc.extract_text(&[page_num]) {
            Ok(text) => normalize_page_text(&text),
            Err(e) => {
                // A page with an unreadable content stream counts as blank
                tracing::warn!(page = page_num, error = %e, "lopdf could not read page text");
                String::new()
            }
        };
        tracing::debug!(page = page_num, chars = text.len(), "lopdf page extracted");
        texts.push(text);
    }

    Ok(texts)
}

/// Trim trailing whitespace per line and collapse runs of blank lines into a
/// single paragraph break.
fn normalize_page_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut blank_run = 0;

    for line in raw.lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            blank_run += 1;
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
            if blank_run > 0 {
                out.push('\n');
            }
        }
        blank_run = 0;
        out.push_str(line);
    }

    out
}
