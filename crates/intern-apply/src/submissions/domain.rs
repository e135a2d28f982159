use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Caller-supplied request to run the automation worker once.
///
/// `profile` is opaque to the server beyond being non-empty; the worker
/// decides what it means (a category string, or a richer object).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRequest {
    #[serde(default)]
    pub profile: Value,
    #[serde(
        default,
        rename = "cover",
        alias = "coverLetter",
        alias = "cover_letter"
    )]
    pub cover_letter: String,
}

impl SubmissionRequest {
    pub fn new(profile: impl Into<Value>, cover_letter: impl Into<String>) -> Self {
        Self {
            profile: profile.into(),
            cover_letter: cover_letter.into(),
        }
    }

    /// Checks both required fields before anything is launched.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if is_blank(&self.profile) {
            return Err(ValidationError::MissingProfile);
        }
        if self.cover_letter.trim().is_empty() {
            return Err(ValidationError::MissingCoverLetter);
        }
        Ok(())
    }

    /// Single self-contained argument handed to the worker process.
    pub fn to_worker_argument(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Profile and cover letter required: profile is missing or empty")]
    MissingProfile,
    #[error("Profile and cover letter required: cover letter is missing or empty")]
    MissingCoverLetter,
}
