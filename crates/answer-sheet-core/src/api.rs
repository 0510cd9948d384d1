//! Contract with the test backend
//!
//! The engine never performs I/O. Each operation that needs the backend hands
//! out an [`ApiCall`]: the request to perform plus a [`Ticket`] that must be
//! returned with the response. A component only accepts the ticket it issued
//! last, so a late answer to a superseded request is dropped.

use crate::error::FetchError;
use crate::template::{opt_string_or_number, string_or_number, TemplateSummary};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use urlencoding::encode;

/// Identifies one outstanding request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ticket(pub u64);

/// Hands out tickets in increasing order
#[derive(Debug, Default)]
pub struct TicketCounter {
    last: u64,
}

impl TicketCounter {
    pub fn issue(&mut self) -> Ticket {
        self.last += 1;
        Ticket(self.last)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiRequest {
    pub method: Method,
    /// Path and query, relative to the configured API base
    pub path: String,
    pub body: Option<Value>,
}

impl ApiRequest {
    fn get(path: String) -> Self {
        Self {
            method: Method::Get,
            path,
            body: None,
        }
    }

    pub fn url(&self, api_base: &str) -> String {
        format!("{}{}", api_base.trim_end_matches('/'), self.path)
    }
}

/// A request paired with the ticket its response must carry
#[derive(Debug, Clone, PartialEq)]
pub struct ApiCall {
    pub ticket: Ticket,
    pub request: ApiRequest,
}

/// Scope shared by the topic and template filters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchoolScope<'a> {
    pub city_code: &'a str,
    pub school_code: &'a str,
    pub class_level: u32,
    pub subject_id: &'a str,
}

impl SchoolScope<'_> {
    fn query(&self) -> String {
        format!(
            "city_code={}&school_code={}&class_level={}&subject_id={}",
            encode(self.city_code),
            encode(self.school_code),
            self.class_level,
            encode(self.subject_id)
        )
    }
}

pub fn load_template(template_id: &str) -> ApiRequest {
    ApiRequest::get(format!("/load_template/{}", encode(template_id)))
}

pub fn list_templates() -> ApiRequest {
    ApiRequest::get("/list_templates".to_string())
}

/// Site-wide class list used by the flat picker
pub fn static_classes() -> ApiRequest {
    ApiRequest::get("/static/classes.json".to_string())
}

pub fn classes_by_school(city_code: &str, school_code: &str) -> ApiRequest {
    ApiRequest::get(format!(
        "/api/classes/by-school/{}/{}",
        encode(city_code),
        encode(school_code)
    ))
}

pub fn subjects(class_level: u32) -> ApiRequest {
    ApiRequest::get(format!("/api/subjects?class_level={}", class_level))
}

pub fn topics(scope: &SchoolScope<'_>) -> ApiRequest {
    ApiRequest::get(format!("/api/topics/by-school?{}", scope.query()))
}

pub fn filtered_templates(scope: &SchoolScope<'_>, topic: &str) -> ApiRequest {
    ApiRequest::get(format!(
        "/api/templates/filter?{}&topic={}",
        scope.query(),
        encode(topic)
    ))
}

pub fn check_answers(request: &GradingRequest) -> Result<ApiRequest, FetchError> {
    Ok(ApiRequest {
        method: Method::Post,
        path: "/check_answers".to_string(),
        body: Some(serde_json::to_value(request)?),
    })
}

/// Unwrap a `{success, <key>: [...]}` envelope
fn decode_envelope<T: DeserializeOwned>(value: Value, key: &str) -> Result<Vec<T>, FetchError> {
    let success = value.get("success").and_then(Value::as_bool).unwrap_or(false);
    if !success {
        let message = value
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("Request was not successful");
        return Err(FetchError::Rejected(message.to_string()));
    }

    match value.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(list) => Ok(serde_json::from_value(list.clone())?),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawLevel {
    Num(u32),
    Str(String),
}

/// `GET /api/classes/by-school/..` → class levels
pub fn decode_classes(value: Value) -> Result<Vec<u32>, FetchError> {
    decode_envelope::<RawLevel>(value, "classes")?
        .into_iter()
        .map(|raw| match raw {
            RawLevel::Num(n) => Ok(n),
            RawLevel::Str(s) => s
                .trim()
                .parse()
                .map_err(|_| FetchError::Decode(format!("Invalid class level: {}", s))),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
}

pub fn decode_subjects(value: Value) -> Result<Vec<Subject>, FetchError> {
    decode_envelope(value, "subjects")
}

pub fn decode_topics(value: Value) -> Result<Vec<String>, FetchError> {
    decode_envelope(value, "topics")
}

pub fn decode_filtered_templates(value: Value) -> Result<Vec<TemplateSummary>, FetchError> {
    decode_envelope(value, "templates")
}

/// `GET /list_templates` returns a bare array
pub fn decode_template_list(value: Value) -> Result<Vec<TemplateSummary>, FetchError> {
    Ok(serde_json::from_value(value)?)
}

/// `GET /static/classes.json` returns a bare array of labels
pub fn decode_static_classes(value: Value) -> Result<Vec<String>, FetchError> {
    Ok(serde_json::from_value(value)?)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StudentInfo {
    #[serde(rename = "studentName")]
    pub student_name: String,
    #[serde(rename = "studentClass")]
    pub student_class: String,
}

/// Body of `POST /check_answers`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GradingRequest {
    pub template_id: String,
    pub answers: BTreeMap<String, String>,
    pub student_info: StudentInfo,
    pub sheet_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SheetsResult {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// One graded field. Order follows the template's field order.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GradingDetail {
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub field_id: Option<String>,
    #[serde(default)]
    pub student_answer: Option<String>,
    #[serde(default)]
    pub correct_variants: Vec<String>,
    #[serde(default)]
    pub is_correct: bool,
    #[serde(default)]
    pub check_method: Option<String>,
    #[serde(default)]
    pub checked_by_ai: bool,
    #[serde(default)]
    pub ai_confidence: Option<f64>,
    #[serde(default)]
    pub ai_explanation: Option<String>,
    #[serde(default)]
    pub ai_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GradingResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub correct_count: u32,
    #[serde(default)]
    pub total_count: u32,
    #[serde(default)]
    pub ai_check_count: u32,
    #[serde(default)]
    pub details: Vec<GradingDetail>,
    #[serde(default)]
    pub sheets_result: Option<SheetsResult>,
}

impl GradingResponse {
    /// Decode a grading body, turning an explicit failure into an error
    pub fn decode(value: Value) -> Result<Self, FetchError> {
        let response: GradingResponse = serde_json::from_value(value)?;
        if let Some(error) = response.error {
            return Err(FetchError::Rejected(error));
        }
        if !response.success {
            return Err(FetchError::Rejected("Grading failed".to_string()));
        }
        Ok(response)
    }
}
