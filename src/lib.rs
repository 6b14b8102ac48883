//! SAP Analyzer Library
//!
//! Answers a fixed set of review questions about a clinical trial
//! Statistical Analysis Plan (SAP) PDF:
//! - `pdf`: text extraction, including password-protected files
//! - `prompt`: prompt templates and document truncation
//! - `analysis`: asks each question and judges the answers
//! - `judge`: rubric scoring of answers by a second model call
//! - `session`: interactive follow-up questions
//! - `runner`: drives a full run and writes the session output

pub mod analysis;
pub mod answer;
pub mod config;
pub mod error;
pub mod judge;
pub mod model;
pub mod output;
pub mod pdf;
pub mod prompt;
pub mod questions;
pub mod runner;
pub mod session;

pub use analysis::{Analyzer, QuestionOutcome};
pub use answer::Answer;
pub use config::{AnalysisConfig, RunConfig};
pub use error::{Error, Result};
pub use judge::{AnswerJudge, Criterion, Evaluation, EvaluationRecord};
pub use model::{GenerationParams, HttpModel, LanguageModel, ModelConfig};
pub use output::{RunMetadata, SessionOutput};
pub use pdf::{Document, ExtractorBackend, TextExtractor};
pub use questions::{Question, QuestionSet};
pub use runner::{run, RunReport, RunState};
pub use session::{run_interactive, SessionSummary};
