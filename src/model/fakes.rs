//! In-memory model fakes (testing only)
//!
//! `ScriptedModel` answers by substring match on the user prompt and records
//! every request, so tests can drive the orchestrator, judge and interactive
//! loop without a model server.

use std::sync::Mutex;

use async_trait::async_trait;

use super::{LanguageModel, ModelRequest};
use crate::error::ModelCallError;
use crate::judge::Criterion;

#[derive(Debug, Clone)]
enum Reply {
    Text(String),
    Fail,
}

/// Deterministic model driven by substring rules. First matching rule wins.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    rules: Vec<(String, Reply)>,
    fallback: Option<String>,
    calls: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply with `text` when the user prompt contains `needle`
    pub fn reply_when(mut self, needle: impl Into<String>, text: impl Into<String>) -> Self {
        self.rules.push((needle.into(), Reply::Text(text.into())));
        self
    }

    /// Fail with a transport error when the user prompt contains `needle`
    pub fn fail_when(mut self, needle: impl Into<String>) -> Self {
        self.rules.push((needle.into(), Reply::Fail));
        self
    }

    /// Reply for prompts no rule matches; without it they get `EmptyResponse`
    pub fn otherwise(mut self, text: impl Into<String>) -> Self {
        self.fallback = Some(text.into());
        self
    }

    /// Requests received so far, in order
    pub fn calls(&self) -> Vec<ModelRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: &ModelRequest) -> Result<String, ModelCallError> {
        self.calls.lock().unwrap().push(request.clone());

        let reply = self
            .rules
            .iter()
            .find(|(needle, _)| request.user.contains(needle.as_str()))
            .map(|(_, reply)| reply.clone())
            .or_else(|| self.fallback.clone().map(Reply::Text));

        match reply {
            Some(Reply::Text(text)) => Ok(text),
            Some(Reply::Fail) => Err(ModelCallError::Transport {
                reason: "scripted failure".to_string(),
            }),
            None => Err(ModelCallError::EmptyResponse),
        }
    }
}

/// A well-formed judge verdict giving every criterion `score`
pub fn uniform_verdict(score: f64) -> String {
    let scores: serde_json::Map<String, serde_json::Value> = Criterion::ALL
        .iter()
        .map(|c| {
            (
                c.as_str().to_string(),
                serde_json::json!({
                    "score": score,
                    "justification": format!("{} judged {}", c.label(), score),
                }),
            )
        })
        .collect();

    serde_json::json!({
        "scores": scores,
        "feedback": "Answer is grounded in the SAP text.",
        "strengths": ["Cites the relevant section"],
        "improvements": ["Quote the estimand definition"],
    })
    .to_string()
}
