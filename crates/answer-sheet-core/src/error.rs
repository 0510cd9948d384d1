//! Error types for backend calls, validation, templates and surfaces

use thiserror::Error;

/// Failure of a request to the test backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request failed ({status}): {message}")]
    Status { status: u16, message: String },

    #[error("Malformed response: {0}")]
    Decode(String),

    /// The backend answered 2xx but flagged the operation as failed
    #[error("{0}")]
    Rejected(String),
}

impl FetchError {
    /// Build a status error from a non-2xx body, preferring its `error` field
    pub fn from_status(status: u16, body: Option<&serde_json::Value>) -> Self {
        let message = body
            .and_then(|b| b.get("error"))
            .and_then(|e| e.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP {}", status));
        FetchError::Status { status, message }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(e: serde_json::Error) -> Self {
        FetchError::Decode(e.to_string())
    }
}

/// Missing or invalid user input. The display text is shown to the student as-is.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Enter your full name")]
    MissingName,

    #[error("Select a class")]
    MissingClass,

    #[error("Select a test")]
    MissingTemplate,

    #[error("Option is not available: {0}")]
    UnknownOption(String),

    #[error("Selection belongs to step {expected}, wizard is at step {actual}")]
    WrongStep { expected: u8, actual: u8 },

    #[error("This choice is not offered on this page")]
    WrongMode,
}

/// Template authoring errors detected when a session starts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Template has no page images")]
    NoPages,

    #[error("Field {field_id} refers to page {page}, but the template has {page_count} page(s)")]
    FieldPageOutOfRange {
        field_id: String,
        page: usize,
        page_count: usize,
    },

    #[error("Field id {0} is used more than once")]
    DuplicateFieldId(String),

    #[error("Failed to parse template: {0}")]
    Decode(String),
}

/// Failure reported by an overlay surface implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Overlay surface error: {0}")]
pub struct SurfaceError(pub String);

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Surface(#[from] SurfaceError),

    #[error("No test is in progress")]
    NoActiveSession,

    #[error("A submission is already in progress")]
    SubmissionInFlight,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_error_prefers_body_message() {
        let body = json!({"error": "Template not found"});
        let err = FetchError::from_status(404, Some(&body));
        assert_eq!(
            err,
            FetchError::Status {
                status: 404,
                message: "Template not found".to_string()
            }
        );
        assert_eq!(err.to_string(), "Request failed (404): Template not found");
    }

    #[test]
    fn test_status_error_without_body() {
        let err = FetchError::from_status(502, None);
        assert_eq!(err.to_string(), "Request failed (502): HTTP 502");
    }

    #[test]
    fn test_validation_messages_are_distinct() {
        let messages = [
            ValidationError::MissingName.to_string(),
            ValidationError::MissingClass.to_string(),
            ValidationError::MissingTemplate.to_string(),
        ];
        assert_ne!(messages[0], messages[1]);
        assert_ne!(messages[1], messages[2]);
        assert_ne!(messages[0], messages[2]);
    }
}
