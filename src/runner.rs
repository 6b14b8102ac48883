//! Run driver
//!
//! Drives one run through `Idle -> Extracting -> Analyzing -> Interactive ->
//! Terminated`. Extraction failure aborts the run; everything after it is
//! best effort and ends with the session output on disk.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncWrite};

use crate::analysis::Analyzer;
use crate::config::RunConfig;
use crate::error::{ExtractionError, Result};
use crate::model::LanguageModel;
use crate::output::{RunMetadata, SessionOutput};
use crate::pdf::{Document, TextExtractor};
use crate::session::{run_interactive, SessionSummary};

/// Phase of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Extracting,
    Analyzing,
    Interactive,
    Terminated,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunState::Idle => "idle",
            RunState::Extracting => "extracting",
            RunState::Analyzing => "analyzing",
            RunState::Interactive => "interactive",
            RunState::Terminated => "terminated",
        })
    }
}

impl RunState {
    /// Whether `self -> next` is a legal transition
    pub fn can_advance_to(self, next: RunState) -> bool {
        matches!(
            (self, next),
            (RunState::Idle, RunState::Extracting)
                | (RunState::Extracting, RunState::Analyzing)
                | (RunState::Extracting, RunState::Terminated)
                | (RunState::Analyzing, RunState::Interactive)
                | (RunState::Analyzing, RunState::Terminated)
                | (RunState::Interactive, RunState::Terminated)
        )
    }
}

#[derive(Debug)]
struct StateMachine {
    state: RunState,
}

impl StateMachine {
    fn new() -> Self {
        Self {
            state: RunState::Idle,
        }
    }

    fn advance(&mut self, next: RunState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        tracing::info!(from = %self.state, to = %next, "Run state changed");
        self.state = next;
    }
}

/// What a completed run produced
#[derive(Debug, Clone)]
pub struct RunReport {
    pub output_path: PathBuf,
    pub answered: usize,
    pub failed: usize,
    /// Present when the interactive phase ran
    pub session: Option<SessionSummary>,
}

async fn extract(config: &RunConfig) -> std::result::Result<Document, ExtractionError> {
    let extractor = TextExtractor::new(config.backend);
    let path = config.pdf_path.clone();
    let password = config.password.clone();

    tokio::task::spawn_blocking(move || extractor.extract(&path, password.as_deref()))
        .await
        .map_err(|e| ExtractionError::Backend {
            backend: "task",
            reason: format!("Task join error: {}", e),
        })?
}

/// Execute a full run: extract, analyze, write output, then optionally enter
/// the interactive loop on `input`/`output`.
pub async fn run<R, W>(
    config: &RunConfig,
    model: Arc<dyn LanguageModel>,
    input: R,
    output: W,
) -> Result<RunReport>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut machine = StateMachine::new();

    machine.advance(RunState::Extracting);
    let document = match extract(config).await {
        Ok(document) => document,
        Err(e) => {
            tracing::error!(kind = "extraction", error = %e, "Extraction failed");
            machine.advance(RunState::Terminated);
            return Err(e.into());
        }
    };

    machine.advance(RunState::Analyzing);
    let analyzer = Analyzer::new(model, &config.analysis);
    let results = analyzer.analyze(&document).await;
    let answered = results.values().filter(|o| o.is_answered()).count();
    let failed = results.len() - answered;

    let run = RunMetadata::new(
        &document,
        analyzer.model_name(),
        config.analysis.question_set,
        analyzer.truncates(&document),
    );
    let output_path = SessionOutput::new(run, results).write_to_dir(&config.output_dir)?;

    let session = if config.interactive {
        machine.advance(RunState::Interactive);
        Some(run_interactive(&analyzer, &document, input, output).await?)
    } else {
        None
    };

    machine.advance(RunState::Terminated);
    Ok(RunReport {
        output_path,
        answered,
        failed,
        session,
    })
}
