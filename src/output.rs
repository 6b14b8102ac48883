//! Session output file

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::analysis::QuestionOutcome;
use crate::error::Result;
use crate::pdf::{Document, ExtractorBackend};
use crate::questions::QuestionSet;

/// Run-level metadata written next to the results
#[derive(Debug, Clone, Serialize)]
pub struct RunMetadata {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    /// File name of the analyzed PDF
    pub source: String,
    pub page_count: u32,
    pub backend: ExtractorBackend,
    pub model: String,
    pub question_set: QuestionSet,
    /// Characters of extracted text
    pub document_chars: usize,
    /// Prompts carried a truncated excerpt of the document
    pub truncated: bool,
}

impl RunMetadata {
    pub fn new(
        document: &Document,
        model: &str,
        question_set: QuestionSet,
        truncated: bool,
    ) -> Self {
        let source = Path::new(&document.source)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| document.source.clone());

        Self {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            source,
            page_count: document.page_count,
            backend: document.backend,
            model: model.to_string(),
            question_set,
            document_chars: document.char_count(),
            truncated,
        }
    }
}

/// Everything persisted for one run
#[derive(Debug, Clone, Serialize)]
pub struct SessionOutput {
    pub run: RunMetadata,
    pub results: BTreeMap<String, QuestionOutcome>,
}

impl SessionOutput {
    pub fn new(run: RunMetadata, results: BTreeMap<String, QuestionOutcome>) -> Self {
        Self { run, results }
    }

    /// `sap_analysis_<stem>_<YYYYmmdd_HHMMSS>.json`
    pub fn file_name(&self) -> String {
        let stem = Path::new(&self.run.source)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        format!(
            "sap_analysis_{}_{}.json",
            stem,
            self.run.generated_at.format("%Y%m%d_%H%M%S")
        )
    }

    /// Write pretty-printed JSON into `dir`, creating it when missing
    pub fn write_to_dir(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(self.file_name());
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;

        tracing::info!(
            path = %path.display(),
            results = self.results.len(),
            "Session output written"
        );
        Ok(path)
    }
}
