//! Error types for SAP Analyzer
//!
//! Each pipeline stage has its own error type so callers can decide which
//! failures abort a run (extraction) and which are recorded per question
//! (prompt construction, model calls, evaluation).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for SAP Analyzer
pub type Result<T> = std::result::Result<T, Error>;

/// Failures while turning a PDF file into document text
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// PDF file not found
    #[error("PDF not found: {path}")]
    NotFound { path: String },

    /// File exists but could not be read
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Invalid PDF file
    #[error("Invalid PDF file: {reason}")]
    InvalidPdf { reason: String },

    /// PDF is password protected and no password was provided
    #[error("PDF is password protected")]
    PasswordRequired,

    /// Incorrect password provided
    #[error("Incorrect password")]
    IncorrectPassword,

    /// The text backend (PDFium, lopdf or qpdf) failed
    #[error("{backend} error: {reason}")]
    Backend {
        backend: &'static str,
        reason: String,
    },

    /// No page carries an extractable text layer (e.g. scanned images)
    #[error("No extractable text in {pages} page(s); the document may be scanned without OCR")]
    NoTextLayer { pages: u32 },
}

/// Failures while rendering a prompt template
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PromptConstructionError {
    /// Template lacks a placeholder the builder must fill
    #[error("Template is missing required placeholder {{{name}}}")]
    MissingPlaceholder { name: String },

    /// Template references a placeholder that has no value
    #[error("Template references unknown placeholder {{{name}}}")]
    UnresolvedPlaceholder { name: String },

    /// A lone `{` or `}` that is neither a placeholder nor an escape
    #[error("Unbalanced brace at byte {position}")]
    UnbalancedBrace { position: usize },
}

/// Failures talking to the language-model endpoint
#[derive(Error, Debug)]
pub enum ModelCallError {
    /// The request did not complete within the configured timeout
    #[error("Model call timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    /// Connection or protocol failure
    #[error("Model request failed: {reason}")]
    Transport { reason: String },

    /// Endpoint answered with a non-success status
    #[error("Model endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Endpoint answered but the body was not a completion
    #[error("Failed to decode model response: {reason}")]
    Decode { reason: String },

    /// Completion contained no text
    #[error("Model returned an empty response")]
    EmptyResponse,

    /// Endpoint URL could not be parsed
    #[error("Invalid model endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
}

impl ModelCallError {
    /// Whether another attempt could plausibly succeed
    pub fn is_transient(&self) -> bool {
        match self {
            ModelCallError::Timeout { .. } | ModelCallError::Transport { .. } => true,
            ModelCallError::Status { status, .. } => *status == 429 || *status >= 500,
            ModelCallError::Decode { .. }
            | ModelCallError::EmptyResponse
            | ModelCallError::InvalidEndpoint { .. } => false,
        }
    }
}

impl From<reqwest::Error> for ModelCallError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ModelCallError::Decode {
                reason: err.to_string(),
            }
        } else {
            ModelCallError::Transport {
                reason: err.to_string(),
            }
        }
    }
}

/// Failures while scoring an answer
#[derive(Error, Debug)]
pub enum EvaluationError {
    /// The judge's own model call failed
    #[error("Judge model call failed: {0}")]
    Model(#[from] ModelCallError),

    /// The rubric prompt could not be rendered
    #[error("Judge prompt could not be built: {0}")]
    Prompt(#[from] PromptConstructionError),

    /// Judge output is not a verdict object
    #[error("Judge response is not a valid verdict: {reason}")]
    Decode { reason: String },

    /// Verdict omits one of the rubric criteria
    #[error("Judge verdict is missing criterion {criterion}")]
    MissingCriterion { criterion: String },

    /// Score outside the rubric scale
    #[error("Score {score} for {criterion} is outside {min}-{max}")]
    ScoreOutOfRange {
        criterion: String,
        score: f64,
        min: f64,
        max: f64,
    },
}

/// Error types for SAP Analyzer
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Prompt(#[from] PromptConstructionError),

    #[error(transparent)]
    Model(#[from] ModelCallError),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Stable short name of the failure class, used in logs and error markers
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Extraction(_) => "extraction",
            Error::Prompt(_) => "prompt_construction",
            Error::Model(_) => "model_call",
            Error::Evaluation(_) => "evaluation",
            Error::Io(_) => "io",
            Error::Serialization(_) => "serialization",
        }
    }

    /// Marker recorded in the session output in place of a missing result
    pub fn marker(&self) -> ErrorMarker {
        ErrorMarker {
            kind: self.kind().to_string(),
            message: self.to_string(),
        }
    }
}

/// Serializable record of a non-fatal failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorMarker {
    pub kind: String,
    pub message: String,
}

impl std::fmt::Display for ErrorMarker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}
