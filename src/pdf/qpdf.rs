//! qpdf FFI wrapper for password handling
//!
//! Text backends get a plain, unencrypted copy of the document: qpdf opens
//! the file with the caller's password and rewrites it without encryption.

use crate::error::ExtractionError;
use qpdf::QPdf;

/// Wrapper for qpdf operations via FFI
pub struct QpdfWrapper;

/// A document that text backends can read without a password
#[derive(Debug)]
pub struct UnlockedPdf {
    /// Plain PDF bytes
    pub data: Vec<u8>,
    /// Whether the input carried encryption
    pub was_encrypted: bool,
    pub page_count: u32,
}

/// Map qpdf errors, telling a missing password apart from a wrong one
fn map_qpdf_error(e: qpdf::QPdfError, password: Option<&str>) -> ExtractionError {
    match e.error_code() {
        qpdf::QPdfErrorCode::InvalidPassword => match password {
            Some(_) => ExtractionError::IncorrectPassword,
            None => ExtractionError::PasswordRequired,
        },
        _ => ExtractionError::InvalidPdf {
            reason: format!("qpdf: {}", e),
        },
    }
}

fn open_qpdf(data: &[u8], password: Option<&str>) -> Result<QPdf, ExtractionError> {
    match password {
        Some(pwd) => QPdf::read_from_memory_encrypted(data, pwd),
        None => QPdf::read_from_memory(data),
    }
    .map_err(|e| map_qpdf_error(e, password))
}

impl QpdfWrapper {
    /// Open a PDF and, if it is encrypted, rewrite it without encryption
    ///
    /// # Arguments
    /// * `input_data` - Raw PDF bytes
    /// * `password` - Password for encrypted PDFs (user or owner password)
    ///
    /// # Returns
    /// The unlocked document and its page count. Unencrypted input is passed
    /// through unchanged.
    pub fn unlock(input_data: &[u8], password: Option<&str>) -> Result<UnlockedPdf, ExtractionError> {
        let qpdf = open_qpdf(input_data, password)?;
        let page_count = qpdf
            .get_num_pages()
            .map_err(|e| map_qpdf_error(e, password))?;

        if !qpdf.is_encrypted() {
            return Ok(UnlockedPdf {
                data: input_data.to_vec(),
                was_encrypted: false,
                page_count,
            });
        }

        let mut writer = qpdf.writer();
        writer.preserve_encryption(false);
        let data = writer
            .write_to_memory()
            .map_err(|e| map_qpdf_error(e, password))?;

        tracing::debug!(page_count, "decrypted PDF in memory");

        Ok(UnlockedPdf {
            data,
            was_encrypted: true,
            page_count,
        })
    }
}
