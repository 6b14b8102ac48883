//! Prompt templates and the SAP prompt builder
//!
//! Templates use `{name}` placeholders; `{{` and `}}` produce literal braces.

use crate::error::PromptConstructionError;
use crate::questions::Question;
use std::borrow::Cow;

/// Default document budget, in characters
pub const DEFAULT_MAX_DOCUMENT_CHARS: usize = 8000;

pub const SYSTEM_TEMPLATE: &str = "You are a clinical trial SAP analysis assistant.
Use the following Statistical Analysis Plan to answer all questions.

------START OF DOCUMENT------
{document}
------END OF DOCUMENT------

When the question concerns the primary efficacy outcome, safety analysis,
statistical methodology or FDA E9 compliance, respond with this structure:
1. Outcome:
2. Methods:
3. Interpretation:
4. FDA E9 Compliance: Yes/No and why

Guidelines:
- Be precise and specific
- Cite the relevant sections of the document where possible
- Highlight potential concerns or limitations
- If the document does not contain the information, say so plainly";

pub const QUESTION_TEMPLATE: &str = "Question: {title}

{question}

Answer the question asked, not the SAP in general. Support each point with
details from the document.";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment<'a> {
    Literal(String),
    Placeholder(&'a str),
}

/// A prompt template with the placeholders it must contain
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    text: Cow<'static, str>,
    required: Vec<&'static str>,
}

impl PromptTemplate {
    pub fn new(text: impl Into<Cow<'static, str>>, required: &[&'static str]) -> Self {
        Self {
            text: text.into(),
            required: required.to_vec(),
        }
    }

    /// Placeholder names in order of appearance
    pub fn placeholders(&self) -> Result<Vec<&str>, PromptConstructionError> {
        Ok(parse_segments(&self.text)?
            .into_iter()
            .filter_map(|s| match s {
                Segment::Placeholder(name) => Some(name),
                Segment::Literal(_) => None,
            })
            .collect())
    }

    /// Check that the template parses and carries every required placeholder
    pub fn validate(&self) -> Result<(), PromptConstructionError> {
        let present = self.placeholders()?;
        match self.required.iter().find(|name| !present.contains(*name)) {
            Some(name) => Err(PromptConstructionError::MissingPlaceholder {
                name: name.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Substitute `values` into the template
    pub fn render(&self, values: &[(&str, &str)]) -> Result<String, PromptConstructionError> {
        self.validate()?;

        let mut out = String::with_capacity(self.text.len());
        for segment in parse_segments(&self.text)? {
            match segment {
                Segment::Literal(text) => out.push_str(&text),
                Segment::Placeholder(name) => {
                    let value = values
                        .iter()
                        .find(|(key, _)| *key == name)
                        .map(|(_, value)| *value)
                        .ok_or_else(|| PromptConstructionError::UnresolvedPlaceholder {
                            name: name.to_string(),
                        })?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }
}

fn parse_segments(text: &str) -> Result<Vec<Segment<'_>>, PromptConstructionError> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let bytes = text.as_bytes();
    let mut i = 0;
    let mut start = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'{' if bytes.get(i + 1) == Some(&b'{') => {
                literal.push_str(&text[start..i]);
                literal.push('{');
                i += 2;
                start = i;
            }
            b'}' if bytes.get(i + 1) == Some(&b'}') => {
                literal.push_str(&text[start..i]);
                literal.push('}');
                i += 2;
                start = i;
            }
            b'{' => {
                let close = text[i + 1..]
                    .find('}')
                    .map(|offset| i + 1 + offset)
                    .ok_or(PromptConstructionError::UnbalancedBrace { position: i })?;
                let name = &text[i + 1..close];
                if name.is_empty() || !name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
                {
                    return Err(PromptConstructionError::UnbalancedBrace { position: i });
                }
                literal.push_str(&text[start..i]);
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Placeholder(name));
                i = close + 1;
                start = i;
            }
            b'}' => return Err(PromptConstructionError::UnbalancedBrace { position: i }),
            _ => i += 1,
        }
    }

    literal.push_str(&text[start..]);
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

/// Document text cut to a character budget
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Excerpt<'a> {
    pub text: Cow<'a, str>,
    pub truncated: bool,
    pub total_chars: usize,
    pub kept_chars: usize,
}

/// Keep the head of `text` within `max_chars`, cutting at whitespace when
/// possible. A truncated excerpt ends with a note for the model.
pub fn truncate_document(text: &str, max_chars: usize) -> Excerpt<'_> {
    let total_chars = text.chars().count();
    if total_chars <= max_chars {
        return Excerpt {
            text: Cow::Borrowed(text),
            truncated: false,
            total_chars,
            kept_chars: total_chars,
        };
    }

    let hard_end = text
        .char_indices()
        .nth(max_chars)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len());
    let head = &text[..hard_end];
    // Back off to a word boundary unless that would discard most of the budget
    let head = match head.rfind(char::is_whitespace) {
        Some(idx) if idx >= hard_end / 2 => &head[..idx],
        _ => head,
    }
    .trim_end();

    let kept_chars = head.chars().count();
    let note = format!(
        "\n\n[Document truncated: showing the first {} of {} characters. \
Later sections are not included, so say so if the answer may depend on them.]",
        kept_chars, total_chars
    );

    Excerpt {
        text: Cow::Owned(format!("{}{}", head, note)),
        truncated: true,
        total_chars,
        kept_chars,
    }
}

/// A rendered prompt ready for the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltPrompt {
    pub system: String,
    pub user: String,
    pub truncated: bool,
    pub document_chars: usize,
    pub included_chars: usize,
}

/// Assembles system and user prompts for a question
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    system: PromptTemplate,
    question: PromptTemplate,
    max_document_chars: usize,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DOCUMENT_CHARS)
    }
}

impl PromptBuilder {
    pub fn new(max_document_chars: usize) -> Self {
        Self {
            system: PromptTemplate::new(SYSTEM_TEMPLATE, &["document"]),
            question: PromptTemplate::new(QUESTION_TEMPLATE, &["question"]),
            max_document_chars,
        }
    }

    /// Replace the templates. The system template must contain `{document}`,
    /// the question template `{question}`; `{title}` is optional.
    pub fn with_templates(
        mut self,
        system: impl Into<Cow<'static, str>>,
        question: impl Into<Cow<'static, str>>,
    ) -> Self {
        self.system = PromptTemplate::new(system, &["document"]);
        self.question = PromptTemplate::new(question, &["question"]);
        self
    }

    pub fn max_document_chars(&self) -> usize {
        self.max_document_chars
    }

    pub fn build(
        &self,
        question: &Question,
        document: &str,
    ) -> Result<BuiltPrompt, PromptConstructionError> {
        let excerpt = truncate_document(document, self.max_document_chars);
        let system = self.system.render(&[("document", &*excerpt.text)])?;
        let user = self.question.render(&[
            ("title", &*question.title),
            ("question", &*question.prompt),
        ])?;

        Ok(BuiltPrompt {
            system,
            user,
            truncated: excerpt.truncated,
            document_chars: excerpt.total_chars,
            included_chars: excerpt.kept_chars,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::questions::PRIMARY_EFFICACY;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn test_render_substitutes_and_unescapes() {
        let template = PromptTemplate::new("Q: {question} -> {{json}}", &["question"]);
        assert_eq!(
            template.render(&[("question", "sample size?")]).unwrap(),
            "Q: sample size? -> {json}"
        );
    }

    #[test]
    fn test_placeholders_in_order() {
        let template = PromptTemplate::new("{a} and {b_2} and {a}", &[]);
        assert_eq!(template.placeholders().unwrap(), vec!["a", "b_2", "a"]);
    }

    #[test]
    fn test_missing_required_placeholder() {
        let template = PromptTemplate::new("No document here", &["document"]);
        assert_eq!(
            template.render(&[("document", "text")]),
            Err(PromptConstructionError::MissingPlaceholder {
                name: "document".to_string()
            })
        );
    }

    #[test]
    fn test_unresolved_placeholder() {
        let template = PromptTemplate::new("{document} {protocol_id}", &["document"]);
        assert_eq!(
            template.render(&[("document", "text")]),
            Err(PromptConstructionError::UnresolvedPlaceholder {
                name: "protocol_id".to_string()
            })
        );
    }

    #[rstest]
    #[case("open { brace", 5)]
    #[case("close } brace", 6)]
    #[case("{not a name}", 0)]
    #[case("{}", 0)]
    fn test_unbalanced_braces(#[case] text: &'static str, #[case] position: usize) {
        let template = PromptTemplate::new(text, &[]);
        assert_eq!(
            template.validate(),
            Err(PromptConstructionError::UnbalancedBrace { position })
        );
    }

    #[test]
    fn test_value_braces_are_not_reparsed() {
        let template = PromptTemplate::new("{document}", &["document"]);
        assert_eq!(
            template.render(&[("document", "{\"a\": 1}")]).unwrap(),
            "{\"a\": 1}"
        );
    }

    #[test]
    fn test_default_templates_are_valid() {
        PromptTemplate::new(SYSTEM_TEMPLATE, &["document"])
            .validate()
            .unwrap();
        PromptTemplate::new(QUESTION_TEMPLATE, &["question"])
            .validate()
            .unwrap();
    }

    #[test]
    fn test_short_document_untouched() {
        let excerpt = truncate_document("Primary endpoint: HbA1c", 100);
        assert!(!excerpt.truncated);
        assert_eq!(excerpt.text, "Primary endpoint: HbA1c");
        assert_eq!(excerpt.kept_chars, 23);
    }

    #[test]
    fn test_truncation_cuts_at_word_and_notes() {
        let text = "alpha beta gamma delta epsilon";
        let excerpt = truncate_document(text, 13);
        assert!(excerpt.truncated);
        assert_eq!(excerpt.total_chars, 30);
        assert_eq!(excerpt.kept_chars, 10);
        assert!(excerpt.text.starts_with("alpha beta\n\n[Document truncated"));
        assert!(excerpt.text.contains("first 10 of 30 characters"));
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let text = "αβγδεζηθικλμ";
        let excerpt = truncate_document(text, 5);
        assert!(excerpt.text.starts_with("αβγδε\n"));
        assert_eq!(excerpt.kept_chars, 5);
    }

    #[test]
    fn test_build_includes_document_and_question() {
        let builder = PromptBuilder::new(1000);
        let prompt = builder
            .build(&PRIMARY_EFFICACY, "3.1 Primary Efficacy Outcome\nChange in HbA1c")
            .unwrap();

        assert!(prompt.system.contains("Change in HbA1c"));
        assert!(prompt.system.contains("------END OF DOCUMENT------"));
        assert!(prompt.user.starts_with("Question: Primary efficacy outcome"));
        assert!(prompt.user.contains("The estimand and analysis population"));
        assert!(!prompt.truncated);
    }

    #[test]
    fn test_build_ad_hoc_states_question_once() {
        let question = Question::ad_hoc("How are dropouts imputed?");
        let prompt = PromptBuilder::new(1000).build(&question, "text").unwrap();

        assert!(prompt.user.starts_with("Question: Follow-up question"));
        assert_eq!(prompt.user.matches("How are dropouts imputed?").count(), 1);
    }

    #[test]
    fn test_build_flags_truncation() {
        let builder = PromptBuilder::new(20);
        let document = "word ".repeat(100);
        let prompt = builder.build(&PRIMARY_EFFICACY, &document).unwrap();
        assert!(prompt.truncated);
        assert_eq!(prompt.document_chars, 500);
        assert!(prompt.system.contains("[Document truncated"));
    }

    #[test]
    fn test_build_rejects_malformed_template() {
        let builder = PromptBuilder::new(100).with_templates("no placeholder", QUESTION_TEMPLATE);
        assert!(matches!(
            builder.build(&PRIMARY_EFFICACY, "text"),
            Err(PromptConstructionError::MissingPlaceholder { .. })
        ));
    }
}
