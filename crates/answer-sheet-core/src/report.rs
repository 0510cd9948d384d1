//! Turning a grading response into the displayed result report
//!
//! Nothing here re-derives correctness: verdicts come from the grading
//! service, the report only classifies and formats them.

use crate::api::{GradingDetail, GradingResponse, SheetsResult};
use crate::template::Field;
use serde::{Serialize, Serializer};
use tracing::warn;

/// Grading strategy applied to one field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckMethod {
    Exact,
    Boolean,
    Number,
    NumericSequence,
    PartialMatch,
    Keywords,
    /// `similarity_<threshold>`
    Similarity(u32),
    FuzzyStrict,
    FuzzySoft,
    Semantic,
    Ai,
    AiError,
    None,
    Other(String),
}

impl CheckMethod {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "exact" => CheckMethod::Exact,
            "boolean" => CheckMethod::Boolean,
            "number" => CheckMethod::Number,
            "numeric_sequence" => CheckMethod::NumericSequence,
            "partial_match" => CheckMethod::PartialMatch,
            "keywords" => CheckMethod::Keywords,
            "fuzzy_strict" => CheckMethod::FuzzyStrict,
            "fuzzy_soft" => CheckMethod::FuzzySoft,
            "semantic" => CheckMethod::Semantic,
            "ai" => CheckMethod::Ai,
            "ai_error" => CheckMethod::AiError,
            "none" | "" => CheckMethod::None,
            other => match other
                .strip_prefix("similarity_")
                .and_then(|n| n.parse().ok())
            {
                Some(threshold) => CheckMethod::Similarity(threshold),
                None => CheckMethod::Other(other.to_string()),
            },
        }
    }

    /// Wire name as sent by the grading service
    pub fn as_wire(&self) -> String {
        match self {
            CheckMethod::Exact => "exact".into(),
            CheckMethod::Boolean => "boolean".into(),
            CheckMethod::Number => "number".into(),
            CheckMethod::NumericSequence => "numeric_sequence".into(),
            CheckMethod::PartialMatch => "partial_match".into(),
            CheckMethod::Keywords => "keywords".into(),
            CheckMethod::Similarity(n) => format!("similarity_{}", n),
            CheckMethod::FuzzyStrict => "fuzzy_strict".into(),
            CheckMethod::FuzzySoft => "fuzzy_soft".into(),
            CheckMethod::Semantic => "semantic".into(),
            CheckMethod::Ai => "ai".into(),
            CheckMethod::AiError => "ai_error".into(),
            CheckMethod::None => "none".into(),
            CheckMethod::Other(s) => s.clone(),
        }
    }

    /// Human-readable method name. Plain exact matches and unchecked
    /// fields are not labelled.
    pub fn label(&self) -> Option<String> {
        let label = match self {
            CheckMethod::Exact | CheckMethod::None => return None,
            CheckMethod::Boolean => "Boolean value".to_string(),
            CheckMethod::Number => "Number".to_string(),
            CheckMethod::NumericSequence => "Numeric sequence".to_string(),
            CheckMethod::PartialMatch => "Partial match".to_string(),
            CheckMethod::Keywords => "Keywords".to_string(),
            CheckMethod::Similarity(n) => format!("Similarity {}", n),
            CheckMethod::FuzzyStrict => "Fuzzy match (strict)".to_string(),
            CheckMethod::FuzzySoft => "Fuzzy match (soft)".to_string(),
            CheckMethod::Semantic => "Semantic".to_string(),
            CheckMethod::Ai => "AI".to_string(),
            CheckMethod::AiError => "AI error".to_string(),
            CheckMethod::Other(s) => s.clone(),
        };
        Some(label)
    }
}

impl Serialize for CheckMethod {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_wire())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreBand {
    High,
    Medium,
    Low,
}

impl ScoreBand {
    pub fn for_percentage(percentage: u32) -> Self {
        if percentage >= 80 {
            ScoreBand::High
        } else if percentage >= 60 {
            ScoreBand::Medium
        } else {
            ScoreBand::Low
        }
    }
}

/// Rounded share of correct answers; an empty test scores 0
pub fn percentage(correct: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    (f64::from(correct) / f64::from(total) * 100.0).round() as u32
}

/// Outcome of exporting results to the spreadsheet
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SheetsStatus {
    Saved { message: Option<String> },
    Failed { error: String },
}

impl SheetsStatus {
    /// A response without a sheets result counts as a failed save.
    pub fn from_result(result: Option<&SheetsResult>) -> Self {
        match result {
            Some(r) if r.success => SheetsStatus::Saved {
                message: r.message.clone().filter(|m| !m.is_empty()),
            },
            Some(r) => SheetsStatus::Failed {
                error: r.error.clone().unwrap_or_default(),
            },
            None => SheetsStatus::Failed {
                error: String::new(),
            },
        }
    }
}

/// What the AI grader said about one answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AiVerdict {
    /// e.g. "87.5%", or "N/A" when no confidence was reported
    pub confidence: String,
    pub explanation: Option<String>,
    pub error: Option<String>,
}

impl AiVerdict {
    fn from_detail(detail: &GradingDetail) -> Self {
        let confidence = match detail.ai_confidence {
            Some(c) if c != 0.0 && c.is_finite() => format!("{:.1}%", c * 100.0),
            _ => "N/A".to_string(),
        };
        Self {
            confidence,
            explanation: detail.ai_explanation.clone().filter(|s| !s.is_empty()),
            error: detail.ai_error.clone().filter(|s| !s.is_empty()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRow {
    /// 1-based question number
    pub number: usize,
    pub field_id: Option<String>,
    pub student_answer: String,
    pub correct_variants: Vec<String>,
    pub is_correct: bool,
    pub method: CheckMethod,
    pub method_label: Option<String>,
    pub ai: Option<AiVerdict>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultReport {
    pub correct_count: u32,
    pub total_count: u32,
    pub percentage: u32,
    pub band: ScoreBand,
    pub rows: Vec<ReportRow>,
    pub sheets: SheetsStatus,
    /// Present when the AI grader looked at any answer
    pub ai_summary: Option<String>,
}

impl ResultReport {
    /// Build the report, pairing each detail with a field id.
    ///
    /// A detail that names its field keeps it; otherwise it is paired with
    /// the template field at the same position.
    pub fn reconcile(response: &GradingResponse, fields: &[Field]) -> Self {
        let rows = response
            .details
            .iter()
            .enumerate()
            .map(|(index, detail)| {
                let field_id = detail.field_id.clone().or_else(|| {
                    let paired = fields.get(index).map(|f| f.id.clone());
                    warn!(index, ?paired, "Grading detail has no field id, pairing by position");
                    paired
                });
                let method = CheckMethod::parse(detail.check_method.as_deref().unwrap_or("none"));
                ReportRow {
                    number: index + 1,
                    field_id,
                    student_answer: detail.student_answer.clone().unwrap_or_default(),
                    correct_variants: detail.correct_variants.clone(),
                    is_correct: detail.is_correct,
                    method_label: method.label(),
                    method,
                    ai: detail
                        .checked_by_ai
                        .then(|| AiVerdict::from_detail(detail)),
                }
            })
            .collect();

        let percentage = percentage(response.correct_count, response.total_count);
        let ai_summary = (response.ai_check_count > 0).then(|| {
            format!(
                "AI checked {} of {} answers",
                response.ai_check_count, response.total_count
            )
        });

        Self {
            correct_count: response.correct_count,
            total_count: response.total_count,
            percentage,
            band: ScoreBand::for_percentage(percentage),
            rows,
            sheets: SheetsStatus::from_result(response.sheets_result.as_ref()),
            ai_summary,
        }
    }
}
