//! Fixed SAP question catalog

use serde::Serialize;
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

/// Identifier used for questions typed in the interactive session
pub const AD_HOC_ID: &str = "ad_hoc";

/// Title shown in the prompt for questions typed in the interactive session
pub const AD_HOC_TITLE: &str = "Follow-up question";

/// A question put to the model about the document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    /// Stable key in the session output
    pub id: Cow<'static, str>,
    /// Human-readable title
    pub title: Cow<'static, str>,
    /// Focus instructions rendered into the user prompt
    pub prompt: Cow<'static, str>,
}

impl Question {
    const fn fixed(id: &'static str, title: &'static str, prompt: &'static str) -> Self {
        Self {
            id: Cow::Borrowed(id),
            title: Cow::Borrowed(title),
            prompt: Cow::Borrowed(prompt),
        }
    }

    /// Wrap free-form user input
    pub fn ad_hoc(text: impl Into<String>) -> Self {
        Self {
            id: Cow::Borrowed(AD_HOC_ID),
            title: Cow::Borrowed(AD_HOC_TITLE),
            prompt: Cow::Owned(text.into()),
        }
    }

    pub fn is_ad_hoc(&self) -> bool {
        self.id == AD_HOC_ID
    }

    /// Text recorded with the outcome: the user's words for ad-hoc
    /// questions, the title otherwise
    pub fn text(&self) -> &str {
        if self.is_ad_hoc() {
            &self.prompt
        } else {
            &self.title
        }
    }
}

pub const PRIMARY_EFFICACY: Question = Question::fixed(
    "primary_efficacy_outcome",
    "Primary efficacy outcome",
    "Identify the primary efficacy outcome of the trial.
Focus on:
1. The primary endpoint and how and when it is measured
2. The estimand and analysis population
3. The primary statistical model and hypothesis being tested
4. How intercurrent events and missing data affect the primary analysis",
);

pub const SECONDARY_EFFICACY: Question = Question::fixed(
    "secondary_efficacy_outcomes",
    "Secondary efficacy outcomes",
    "Analyze the secondary efficacy outcomes described in the SAP.
Focus on:
1. Key secondary endpoints
2. Statistical methods for secondary outcomes
3. Multiplicity control across endpoints
4. Potential limitations or challenges",
);

pub const SAFETY_ANALYSIS: Question = Question::fixed(
    "safety_analysis",
    "Safety analysis",
    "Analyze the safety aspects of the clinical trial.
Focus on:
1. Safety endpoints and the safety population
2. Adverse event reporting and coding
3. Safety monitoring plan
4. Statistical methods for safety analysis",
);

pub const STATISTICAL_METHODOLOGY: Question = Question::fixed(
    "statistical_methodology",
    "Statistical methodology",
    "Analyze the statistical methodology described in the SAP.
Focus on:
1. Sample size calculation and its assumptions
2. Statistical tests planned
3. Handling of missing data
4. Interim analysis plan",
);

pub const FDA_E9_COMPLIANCE: Question = Question::fixed(
    "fda_e9_compliance",
    "FDA E9 compliance",
    "Assess whether the SAP follows the ICH/FDA E9 statistical principles for clinical trials.
Focus on:
1. Pre-specification of hypotheses, endpoints and analysis sets
2. Control of type I error
3. Handling of missing data and sensitivity analyses
4. Any deviations from E9 and their justification",
);

pub const DATA_INTEGRITY: Question = Question::fixed(
    "data_integrity",
    "Data integrity",
    "Evaluate the data integrity and quality aspects of the SAP.
Focus on:
1. Data collection methods
2. Data cleaning and validation procedures
3. Handling of outliers and missing data
4. Compliance with Good Clinical Practice (GCP) guidelines",
);

/// Which fixed questions a run asks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionSet {
    /// Primary and secondary efficacy, safety, methodology, E9 compliance
    #[default]
    Standard,
    /// Standard plus data integrity
    Extended,
}

impl QuestionSet {
    pub fn questions(self) -> Vec<Question> {
        let mut questions = vec![
            PRIMARY_EFFICACY,
            SECONDARY_EFFICACY,
            SAFETY_ANALYSIS,
            STATISTICAL_METHODOLOGY,
            FDA_E9_COMPLIANCE,
        ];
        if self == QuestionSet::Extended {
            questions.push(DATA_INTEGRITY);
        }
        questions
    }
}

impl FromStr for QuestionSet {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "extended" => Ok(Self::Extended),
            other => Err(format!(
                "unknown question set '{}', expected standard or extended",
                other
            )),
        }
    }
}

impl fmt::Display for QuestionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Standard => "standard",
            Self::Extended => "extended",
        })
    }
}
