//! Rubric-based answer evaluation
//!
//! The judge asks the model to grade an answer on five criteria, each on a
//! 0-5 scale. The expected verdict shape is sent to the model as a JSON
//! Schema and the reply is decoded strictly: unknown fields, missing
//! criteria and out-of-range scores are rejected rather than repaired.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::answer::Answer;
use crate::error::{ErrorMarker, EvaluationError};
use crate::model::{GenerationParams, LanguageModel, ModelRequest};
use crate::prompt::{truncate_document, PromptTemplate};
use crate::questions::Question;

pub const SCORE_MIN: f64 = 0.0;
pub const SCORE_MAX: f64 = 5.0;

/// Default document context given to the judge, in characters
pub const DEFAULT_JUDGE_CONTEXT_CHARS: usize = 4000;

const JUDGE_SYSTEM_TEMPLATE: &str = "You are an expert reviewer of clinical trial Statistical Analysis Plans.
Grade the answer below against each criterion on a scale from 0 (absent or wrong) to 5 (excellent):

{criteria}

Reply with a single JSON object and nothing else. It must validate against this JSON Schema:

{schema}

Give every criterion a score and a one-sentence justification.";

const JUDGE_USER_TEMPLATE: &str = "Question:
{question}

Answer:
{answer}

Document excerpt:
{context}";

/// Rubric criterion
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    Relevance,
    Accuracy,
    Completeness,
    Clarity,
    RegulatoryCompliance,
}

impl Criterion {
    pub const ALL: [Criterion; 5] = [
        Criterion::Relevance,
        Criterion::Accuracy,
        Criterion::Completeness,
        Criterion::Clarity,
        Criterion::RegulatoryCompliance,
    ];

    /// Key used in verdicts and output files
    pub fn as_str(self) -> &'static str {
        match self {
            Criterion::Relevance => "relevance",
            Criterion::Accuracy => "accuracy",
            Criterion::Completeness => "completeness",
            Criterion::Clarity => "clarity",
            Criterion::RegulatoryCompliance => "regulatory_compliance",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Criterion::Relevance => "Relevance",
            Criterion::Accuracy => "Accuracy",
            Criterion::Completeness => "Completeness",
            Criterion::Clarity => "Clarity",
            Criterion::RegulatoryCompliance => "Regulatory compliance",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Criterion::Relevance => "the answer addresses the question that was asked",
            Criterion::Accuracy => "statements agree with the document and sound statistics",
            Criterion::Completeness => "all points the question asks about are covered",
            Criterion::Clarity => "the answer is well organized and unambiguous",
            Criterion::RegulatoryCompliance => {
                "the answer reflects ICH/FDA E9 expectations where they apply"
            }
        }
    }
}

/// Score and justification for one criterion, as sent by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct CriterionVerdict {
    /// Score from 0 to 5 inclusive
    #[schemars(range(min = 0, max = 5))]
    pub score: f64,
    /// One sentence explaining the score
    #[serde(default)]
    pub justification: String,
}

/// Per-criterion scores, as sent by the model.
///
/// Every criterion is required by the schema; decoding still accepts a gap
/// so it can be reported as `MissingCriterion`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct VerdictScores {
    #[schemars(required)]
    pub relevance: Option<CriterionVerdict>,
    #[schemars(required)]
    pub accuracy: Option<CriterionVerdict>,
    #[schemars(required)]
    pub completeness: Option<CriterionVerdict>,
    #[schemars(required)]
    pub clarity: Option<CriterionVerdict>,
    #[schemars(required)]
    pub regulatory_compliance: Option<CriterionVerdict>,
}

impl VerdictScores {
    fn take(&mut self, criterion: Criterion) -> Option<CriterionVerdict> {
        match criterion {
            Criterion::Relevance => self.relevance.take(),
            Criterion::Accuracy => self.accuracy.take(),
            Criterion::Completeness => self.completeness.take(),
            Criterion::Clarity => self.clarity.take(),
            Criterion::RegulatoryCompliance => self.regulatory_compliance.take(),
        }
    }
}

/// Raw judge reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct JudgeVerdict {
    pub scores: VerdictScores,
    /// Overall feedback on the answer
    pub feedback: String,
    #[serde(default)]
    pub strengths: Vec<String>,
    /// Areas for improvement
    #[serde(default)]
    pub improvements: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionScore {
    pub score: f64,
    pub justification: String,
}

/// Validated evaluation of one answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub scores: BTreeMap<Criterion, CriterionScore>,
    /// Mean of the criterion scores
    pub overall: f64,
    pub feedback: String,
    pub strengths: Vec<String>,
    pub improvements: Vec<String>,
}

impl Evaluation {
    pub fn score(&self, criterion: Criterion) -> Option<f64> {
        self.scores.get(&criterion).map(|s| s.score)
    }
}

impl TryFrom<JudgeVerdict> for Evaluation {
    type Error = EvaluationError;

    fn try_from(mut verdict: JudgeVerdict) -> Result<Self, Self::Error> {
        let mut scores = BTreeMap::new();
        for criterion in Criterion::ALL {
            let entry = verdict
                .scores
                .take(criterion)
                .ok_or_else(|| EvaluationError::MissingCriterion {
                    criterion: criterion.as_str().to_string(),
                })?;
            if !entry.score.is_finite() || !(SCORE_MIN..=SCORE_MAX).contains(&entry.score) {
                return Err(EvaluationError::ScoreOutOfRange {
                    criterion: criterion.as_str().to_string(),
                    score: entry.score,
                    min: SCORE_MIN,
                    max: SCORE_MAX,
                });
            }
            scores.insert(
                criterion,
                CriterionScore {
                    score: entry.score,
                    justification: entry.justification.trim().to_string(),
                },
            );
        }

        let overall = scores.values().map(|s| s.score).sum::<f64>() / scores.len() as f64;
        Ok(Evaluation {
            scores,
            overall,
            feedback: verdict.feedback.trim().to_string(),
            strengths: verdict.strengths,
            improvements: verdict.improvements,
        })
    }
}

/// Evaluation attached to an answer; always exactly one per answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EvaluationRecord {
    Scored(Evaluation),
    Unscored { error: ErrorMarker },
}

impl EvaluationRecord {
    pub fn unscored(error: &EvaluationError) -> Self {
        EvaluationRecord::Unscored {
            error: ErrorMarker {
                kind: "evaluation".to_string(),
                message: error.to_string(),
            },
        }
    }

    pub fn evaluation(&self) -> Option<&Evaluation> {
        match self {
            EvaluationRecord::Scored(evaluation) => Some(evaluation),
            EvaluationRecord::Unscored { .. } => None,
        }
    }
}

impl From<Result<Evaluation, EvaluationError>> for EvaluationRecord {
    fn from(result: Result<Evaluation, EvaluationError>) -> Self {
        match result {
            Ok(evaluation) => EvaluationRecord::Scored(evaluation),
            Err(e) => EvaluationRecord::unscored(&e),
        }
    }
}

/// JSON Schema of [`JudgeVerdict`], pretty-printed
pub fn verdict_schema() -> String {
    let schema = schemars::schema_for!(JudgeVerdict);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

/// Strip an optional Markdown code fence around a JSON reply
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip the info string (`json`, `JSON`, ...), which may share the line with the body
    let body = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    let body = body.trim();
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Decode and validate a judge reply
pub fn parse_verdict(text: &str) -> Result<Evaluation, EvaluationError> {
    let body = strip_code_fence(text);
    let verdict: JudgeVerdict =
        serde_json::from_str(body).map_err(|e| EvaluationError::Decode {
            reason: e.to_string(),
        })?;
    Evaluation::try_from(verdict)
}

/// Human-readable rendering used by the interactive session
pub fn format_evaluation(evaluation: &Evaluation) -> String {
    let mut out = String::from("Evaluation:\n");
    for (criterion, score) in &evaluation.scores {
        let _ = write!(out, "  {:<22} {:.1}/5", criterion.label(), score.score);
        if !score.justification.is_empty() {
            let _ = write!(out, "  {}", score.justification);
        }
        out.push('\n');
    }
    let _ = writeln!(out, "  {:<22} {:.2}/5", "Overall", evaluation.overall);

    if !evaluation.strengths.is_empty() {
        out.push_str("\nStrengths:\n");
        for s in &evaluation.strengths {
            let _ = writeln!(out, "  - {}", s);
        }
    }
    if !evaluation.improvements.is_empty() {
        out.push_str("\nAreas for improvement:\n");
        for s in &evaluation.improvements {
            let _ = writeln!(out, "  - {}", s);
        }
    }
    if !evaluation.feedback.is_empty() {
        let _ = write!(out, "\nFeedback: {}\n", evaluation.feedback);
    }
    out
}

/// Scores answers with a secondary model call
#[derive(Clone)]
pub struct AnswerJudge {
    model: Arc<dyn LanguageModel>,
    params: GenerationParams,
    max_context_chars: usize,
    system: PromptTemplate,
    user: PromptTemplate,
}

impl AnswerJudge {
    pub fn new(model: Arc<dyn LanguageModel>, params: GenerationParams, max_context_chars: usize) -> Self {
        Self {
            model,
            params,
            max_context_chars,
            system: PromptTemplate::new(JUDGE_SYSTEM_TEMPLATE, &["criteria", "schema"]),
            user: PromptTemplate::new(JUDGE_USER_TEMPLATE, &["question", "answer"]),
        }
    }

    /// Build the rubric request for `answer`
    pub fn request(
        &self,
        question: &Question,
        answer: &Answer,
        context: Option<&str>,
    ) -> Result<ModelRequest, EvaluationError> {
        let criteria = Criterion::ALL
            .iter()
            .map(|c| format!("- {} ({}): {}", c.label(), c.as_str(), c.description()))
            .collect::<Vec<_>>()
            .join("\n");
        let schema = verdict_schema();
        let system = self
            .system
            .render(&[("criteria", criteria.as_str()), ("schema", schema.as_str())])?;

        let excerpt = context.map(|text| truncate_document(text, self.max_context_chars));
        let context = excerpt
            .as_ref()
            .map(|e| &*e.text)
            .unwrap_or("(not provided)");
        let user = self.user.render(&[
            ("question", &*question.prompt),
            ("answer", answer.content.as_str()),
            ("context", context),
        ])?;

        Ok(ModelRequest {
            system,
            user,
            params: self.params,
        })
    }

    /// Grade `answer`; the document text, when given, lets the judge check accuracy
    pub async fn evaluate(
        &self,
        question: &Question,
        answer: &Answer,
        context: Option<&str>,
    ) -> Result<Evaluation, EvaluationError> {
        let request = self.request(question, answer, context)?;
        let reply = self.model.generate(&request).await?;
        let evaluation = parse_verdict(&reply)?;
        tracing::debug!(
            question = %question.id,
            overall = evaluation.overall,
            "Answer evaluated"
        );
        Ok(evaluation)
    }
}
