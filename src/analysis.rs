//! Analysis orchestrator
//!
//! Runs each question through prompt construction, the answering model and
//! the judge. A failing question is recorded and logged, never fatal.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::answer::Answer;
use crate::config::AnalysisConfig;
use crate::error::{Error, ErrorMarker, Result};
use crate::judge::{AnswerJudge, EvaluationRecord};
use crate::model::{GenerationParams, LanguageModel, ModelRequest};
use crate::pdf::Document;
use crate::prompt::PromptBuilder;
use crate::questions::Question;

/// Result of asking one question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QuestionOutcome {
    Answered {
        question: String,
        answer: Answer,
        evaluation: EvaluationRecord,
    },
    Failed {
        question: String,
        error: ErrorMarker,
    },
}

impl QuestionOutcome {
    pub fn is_answered(&self) -> bool {
        matches!(self, QuestionOutcome::Answered { .. })
    }

    pub fn answer(&self) -> Option<&Answer> {
        match self {
            QuestionOutcome::Answered { answer, .. } => Some(answer),
            QuestionOutcome::Failed { .. } => None,
        }
    }
}

/// Asks questions about one document
pub struct Analyzer {
    model: Arc<dyn LanguageModel>,
    prompts: PromptBuilder,
    judge: AnswerJudge,
    params: GenerationParams,
    questions: Vec<Question>,
}

impl Analyzer {
    pub fn new(model: Arc<dyn LanguageModel>, config: &AnalysisConfig) -> Self {
        let judge = AnswerJudge::new(
            Arc::clone(&model),
            config.judge_params,
            config.judge_context_chars,
        );
        Self {
            model,
            prompts: PromptBuilder::new(config.max_document_chars),
            judge,
            params: config.answer_params,
            questions: config.question_set.questions(),
        }
    }

    /// Use a custom prompt builder
    pub fn with_prompts(mut self, prompts: PromptBuilder) -> Self {
        self.prompts = prompts;
        self
    }

    /// Fixed questions asked by [`Analyzer::analyze`], in order
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Whether prompts for `document` carry a truncated excerpt
    pub fn truncates(&self, document: &Document) -> bool {
        document.char_count() > self.prompts.max_document_chars()
    }

    /// Build the prompt and call the answering model
    pub async fn answer(&self, question: &Question, document: &Document) -> Result<Answer> {
        let prompt = self.prompts.build(question, &document.text)?;
        if prompt.truncated {
            tracing::debug!(
                question = %question.id,
                kept = prompt.included_chars,
                total = prompt.document_chars,
                "Document truncated for prompt"
            );
        }

        let request = ModelRequest {
            system: prompt.system,
            user: prompt.user,
            params: self.params,
        };
        let text = self.model.generate(&request).await?;
        Ok(Answer::from_response(
            question.id.as_ref(),
            &text,
            prompt.truncated,
        ))
    }

    /// Answer and judge a single question
    pub async fn ask(&self, question: &Question, document: &Document) -> QuestionOutcome {
        let answer = match self.answer(question, document).await {
            Ok(answer) => answer,
            Err(e) => return failed(question, &e),
        };

        let evaluation = self
            .judge
            .evaluate(question, &answer, Some(&document.text))
            .await;
        if let Err(e) = &evaluation {
            tracing::warn!(
                question = %question.id,
                kind = "evaluation",
                error = %e,
                "Answer left unscored"
            );
        }

        QuestionOutcome::Answered {
            question: question.text().to_string(),
            answer,
            evaluation: evaluation.into(),
        }
    }

    /// Ask every fixed question, in catalog order
    pub async fn analyze(&self, document: &Document) -> BTreeMap<String, QuestionOutcome> {
        let mut results = BTreeMap::new();
        for (i, question) in self.questions.iter().enumerate() {
            tracing::info!(
                question = %question.id,
                "Analyzing question {}/{}",
                i + 1,
                self.questions.len()
            );
            let outcome = self.ask(question, document).await;
            results.insert(question.id.to_string(), outcome);
        }

        let answered = results.values().filter(|o| o.is_answered()).count();
        tracing::info!(
            answered,
            failed = results.len() - answered,
            "Batch analysis finished"
        );
        results
    }
}

fn failed(question: &Question, error: &Error) -> QuestionOutcome {
    tracing::warn!(
        question = %question.id,
        kind = error.kind(),
        error = %error,
        "Question failed"
    );
    QuestionOutcome::Failed {
        question: question.text().to_string(),
        error: error.marker(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::Criterion;
    use crate::model::fakes::{uniform_verdict, ScriptedModel};
    use crate::pdf::ExtractorBackend;
    use crate::questions::{Question, QuestionSet, SAFETY_ANALYSIS};
    use pretty_assertions::assert_eq;

    const ANSWER: &str = "1. Outcome: HbA1c change at week 26\n2. Methods: ANCOVA";

    fn document(text: &str) -> Document {
        Document {
            source: "plan.pdf".to_string(),
            page_count: 1,
            pages: vec![text.to_string()],
            text: text.to_string(),
            was_encrypted: false,
            backend: ExtractorBackend::Lopdf,
        }
    }

    fn scripted() -> ScriptedModel {
        ScriptedModel::new()
            .reply_when("Answer:", uniform_verdict(4.0))
            .otherwise(ANSWER)
    }

    #[tokio::test]
    async fn test_analyze_answers_every_question() {
        let model = Arc::new(scripted());
        let analyzer = Analyzer::new(model.clone(), &AnalysisConfig::default());

        let results = analyzer.analyze(&document("Primary endpoint: HbA1c")).await;
        assert_eq!(results.len(), 5);
        for question in analyzer.questions() {
            let outcome = &results[question.id.as_ref()];
            let QuestionOutcome::Answered {
                answer, evaluation, ..
            } = outcome
            else {
                panic!("{} not answered", question.id);
            };
            assert_eq!(answer.content, ANSWER);
            let evaluation = evaluation.evaluation().unwrap();
            assert_eq!(evaluation.scores.len(), Criterion::ALL.len());
        }
        // one answering call and one judge call per question
        assert_eq!(model.call_count(), 10);
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_mapping_size() {
        let model = Arc::new(
            ScriptedModel::new()
                .reply_when("Answer:", uniform_verdict(3.0))
                .fail_when("Safety analysis")
                .otherwise(ANSWER),
        );
        let config = AnalysisConfig {
            question_set: QuestionSet::Extended,
            ..Default::default()
        };
        let analyzer = Analyzer::new(model, &config);

        let results = analyzer.analyze(&document("text")).await;
        assert_eq!(results.len(), 6);
        match &results["safety_analysis"] {
            QuestionOutcome::Failed { error, .. } => assert_eq!(error.kind, "model_call"),
            other => panic!("expected failure, got {:?}", other),
        }
        assert!(results["safety_analysis"].answer().is_none());
        assert!(results["data_integrity"].is_answered());
        assert_eq!(
            results["data_integrity"].answer().map(|a| a.content.as_str()),
            Some(ANSWER)
        );
    }

    #[tokio::test]
    async fn test_prompt_failure_fails_each_question_only() {
        let model = Arc::new(scripted());
        let prompts = PromptBuilder::new(1000).with_templates("no doc", "{question}");
        let analyzer =
            Analyzer::new(model.clone(), &AnalysisConfig::default()).with_prompts(prompts);

        let results = analyzer.analyze(&document("text")).await;
        assert_eq!(results.len(), analyzer.questions().len());
        for outcome in results.values() {
            match outcome {
                QuestionOutcome::Failed { error, .. } => {
                    assert_eq!(error.kind, "prompt_construction")
                }
                other => panic!("expected prompt failure, got {:?}", other),
            }
        }
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn test_ad_hoc_outcome_records_user_text() {
        let analyzer = Analyzer::new(Arc::new(scripted()), &AnalysisConfig::default());
        let question = Question::ad_hoc("Is there an interim analysis?");

        let outcome = analyzer.ask(&question, &document("text")).await;
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["question"], "Is there an interim analysis?");
        assert_eq!(json["answer"]["question_id"], "ad_hoc");
    }

    #[tokio::test]
    async fn test_judge_failure_leaves_answer_unscored() {
        let model = Arc::new(
            ScriptedModel::new()
                .reply_when("Answer:", "not json")
                .otherwise(ANSWER),
        );
        let analyzer = Analyzer::new(model, &AnalysisConfig::default());

        let outcome = analyzer.ask(&SAFETY_ANALYSIS, &document("text")).await;
        match outcome {
            QuestionOutcome::Answered { evaluation, .. } => {
                assert!(matches!(evaluation, EvaluationRecord::Unscored { .. }))
            }
            other => panic!("expected answer, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_response_is_failure() {
        let model = Arc::new(ScriptedModel::new());
        let analyzer = Analyzer::new(model, &AnalysisConfig::default());

        let outcome = analyzer.ask(&SAFETY_ANALYSIS, &document("text")).await;
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"]["kind"], "model_call");
    }

    #[tokio::test]
    async fn test_analysis_is_idempotent() {
        let analyzer = Analyzer::new(Arc::new(scripted()), &AnalysisConfig::default());
        let doc = document("Sample size: 300 per arm");

        let first = analyzer.analyze(&doc).await;
        let second = analyzer.analyze(&doc).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_truncation_flag_reaches_answer() {
        let config = AnalysisConfig {
            max_document_chars: 10,
            ..Default::default()
        };
        let analyzer = Analyzer::new(Arc::new(scripted()), &config);
        let doc = document("word ".repeat(20).trim_end());
        assert!(analyzer.truncates(&doc));

        let answer = analyzer.answer(&SAFETY_ANALYSIS, &doc).await.unwrap();
        assert!(answer.context_truncated);
    }
}
