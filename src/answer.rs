//! Model answers and their structured sections

use serde::{Deserialize, Serialize};

/// A model answer to one question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    /// Question this answers
    pub question_id: String,
    /// Full model text
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub methods: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpretation: Option<String>,
    /// FDA E9 compliance verdict and reasoning
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compliance: Option<String>,
    /// The prompt carried a truncated document
    #[serde(default)]
    pub context_truncated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Outcome,
    Methods,
    Interpretation,
    Compliance,
}

impl Answer {
    /// Build an answer from raw model text, picking out the numbered
    /// `Outcome` / `Methods` / `Interpretation` / `FDA E9 Compliance` sections
    /// when present.
    pub fn from_response(question_id: impl Into<String>, text: &str, context_truncated: bool) -> Self {
        let content = text.trim().to_string();
        let mut answer = Self {
            question_id: question_id.into(),
            content,
            outcome: None,
            methods: None,
            interpretation: None,
            compliance: None,
            context_truncated,
        };

        for (section, body) in split_sections(&answer.content) {
            let slot = match section {
                Section::Outcome => &mut answer.outcome,
                Section::Methods => &mut answer.methods,
                Section::Interpretation => &mut answer.interpretation,
                Section::Compliance => &mut answer.compliance,
            };
            if slot.is_none() && !body.is_empty() {
                *slot = Some(body);
            }
        }

        answer
    }

    /// Whether any structured section was recognised
    pub fn is_structured(&self) -> bool {
        self.outcome.is_some()
            || self.methods.is_some()
            || self.interpretation.is_some()
            || self.compliance.is_some()
    }
}

/// Recognise a heading line such as `1. Outcome: ...`, `**Methods**:` or
/// `### FDA E9 Compliance - Yes`. Returns the section and any inline text.
fn parse_heading(line: &str) -> Option<(Section, &str)> {
    let line = line
        .trim_start_matches(|c: char| c == '#' || c == '*' || c == '-' || c.is_whitespace());
    let line = line.trim_start_matches(|c: char| c.is_ascii_digit());
    let line = line.trim_start_matches(['.', ')']).trim_start();

    let (key, rest) = match line.split_once(':') {
        Some((key, rest)) => (key, rest),
        None => return None,
    };
    let key = key.trim().trim_matches('*').trim().to_ascii_lowercase();

    let section = match key.as_str() {
        "outcome" | "outcomes" | "primary outcome" => Section::Outcome,
        "method" | "methods" | "methodology" => Section::Methods,
        "interpretation" => Section::Interpretation,
        "fda e9 compliance" | "e9 compliance" | "ich e9 compliance" | "compliance" => {
            Section::Compliance
        }
        _ => return None,
    };
    Some((section, rest.trim_start_matches('*').trim()))
}

fn split_sections(text: &str) -> Vec<(Section, String)> {
    let mut sections = Vec::new();
    let mut current: Option<(Section, Vec<&str>)> = None;

    for line in text.lines() {
        if let Some((section, inline)) = parse_heading(line) {
            if let Some((prev, body)) = current.take() {
                sections.push((prev, body.join("\n").trim().to_string()));
            }
            let mut body = Vec::new();
            if !inline.is_empty() {
                body.push(inline);
            }
            current = Some((section, body));
        } else if let Some((_, body)) = current.as_mut() {
            body.push(line.trim_end());
        }
    }

    if let Some((section, body)) = current {
        sections.push((section, body.join("\n").trim().to_string()));
    }
    sections
}
