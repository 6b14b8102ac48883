//! Interactive question loop

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::analysis::{Analyzer, QuestionOutcome};
use crate::judge::{format_evaluation, EvaluationRecord};
use crate::pdf::Document;
use crate::questions::Question;

/// Input that ends the session, compared case-insensitively
pub const EXIT_COMMAND: &str = "exit";

const BANNER: &str = "Interactive SAP analysis. Ask any question about the document.
Type 'exit' to finish.

Disclaimer: answers are generated by a language model and may be incomplete or
wrong. Verify every statement against the SAP before relying on it.
";

const PROMPT: &str = "\nYour question: ";

/// Counts for a finished session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    /// Questions asked
    pub turns: usize,
    pub answered: usize,
    pub failed: usize,
}

/// Read questions from `input` until `exit` or end of input, answering each
/// against `document` and writing the answer and its evaluation to `output`.
pub async fn run_interactive<R, W>(
    analyzer: &Analyzer,
    document: &Document,
    input: R,
    mut output: W,
) -> std::io::Result<SessionSummary>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut summary = SessionSummary::default();

    output.write_all(BANNER.as_bytes()).await?;

    loop {
        output.write_all(PROMPT.as_bytes()).await?;
        output.flush().await?;

        let Some(line) = lines.next_line().await? else {
            output.write_all(b"\n").await?;
            tracing::debug!("End of input, leaving interactive session");
            break;
        };

        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if text.eq_ignore_ascii_case(EXIT_COMMAND) {
            output.write_all(b"Goodbye.\n").await?;
            break;
        }

        summary.turns += 1;
        let question = Question::ad_hoc(text);
        let outcome = analyzer.ask(&question, document).await;
        if outcome.is_answered() {
            summary.answered += 1;
        } else {
            summary.failed += 1;
        }
        output.write_all(render_outcome(&outcome).as_bytes()).await?;
    }

    output.flush().await?;
    tracing::info!(
        turns = summary.turns,
        answered = summary.answered,
        failed = summary.failed,
        "Interactive session ended"
    );
    Ok(summary)
}

fn render_outcome(outcome: &QuestionOutcome) -> String {
    match outcome {
        QuestionOutcome::Answered {
            answer, evaluation, ..
        } => {
            let evaluation = match evaluation {
                EvaluationRecord::Scored(evaluation) => format_evaluation(evaluation),
                EvaluationRecord::Unscored { error } => {
                    format!("Evaluation unavailable ({})\n", error)
                }
            };
            format!("\nAnswer:\n{}\n\n{}", answer.content, evaluation)
        }
        QuestionOutcome::Failed { error, .. } => format!("\nError: {}\n", error),
    }
}
