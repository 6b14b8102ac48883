//! Run configuration

use std::path::PathBuf;

use crate::judge::DEFAULT_JUDGE_CONTEXT_CHARS;
use crate::model::GenerationParams;
use crate::pdf::ExtractorBackend;
use crate::prompt::DEFAULT_MAX_DOCUMENT_CHARS;
use crate::questions::QuestionSet;

/// Settings for the orchestrator and judge
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Fixed questions asked in batch mode
    pub question_set: QuestionSet,
    /// Sampling for answering calls
    pub answer_params: GenerationParams,
    /// Sampling for judge calls (default: cooler than answering)
    pub judge_params: GenerationParams,
    /// Document budget per prompt (default: 8000 characters)
    pub max_document_chars: usize,
    /// Document excerpt given to the judge (default: 4000 characters)
    pub judge_context_chars: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            question_set: QuestionSet::Standard,
            answer_params: GenerationParams::default(),
            judge_params: GenerationParams {
                temperature: 0.1,
                max_tokens: 768,
            },
            max_document_chars: DEFAULT_MAX_DOCUMENT_CHARS,
            judge_context_chars: DEFAULT_JUDGE_CONTEXT_CHARS,
        }
    }
}

/// Everything a single run needs besides the model client
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub pdf_path: PathBuf,
    pub password: Option<String>,
    /// Where the session output file is written (created when missing)
    pub output_dir: PathBuf,
    pub backend: ExtractorBackend,
    /// Enter the interactive loop after batch analysis
    pub interactive: bool,
    pub analysis: AnalysisConfig,
}

impl RunConfig {
    pub fn new(pdf_path: impl Into<PathBuf>) -> Self {
        Self {
            pdf_path: pdf_path.into(),
            password: None,
            output_dir: PathBuf::from("output"),
            backend: ExtractorBackend::Auto,
            interactive: true,
            analysis: AnalysisConfig::default(),
        }
    }
}
