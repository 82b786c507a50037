use thiserror::Error;

#[derive(Error, Debug)]
pub enum UpworkError {
    #[error("Embedded payload not found: {marker}")]
    PayloadNotFound { marker: String },

    #[error("Embedded payload is malformed: {reason}")]
    PayloadMalformed { reason: String },

    #[error("Field rule '{rule}' failed: {reason}")]
    FieldRuleFailure { rule: String, reason: String },

    #[error("Unusable job document: {reason}")]
    Document { reason: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Job not found: {id}")]
    JobNotFound { id: String },

    #[error("Rate limit exceeded, try again later")]
    RateLimited,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yml::Error),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),
}

impl UpworkError {
    pub(crate) fn not_found(marker: impl Into<String>) -> Self {
        Self::PayloadNotFound {
            marker: marker.into(),
        }
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::PayloadMalformed {
            reason: reason.into(),
        }
    }

    pub(crate) fn rule(rule: &str, reason: impl Into<String>) -> Self {
        Self::FieldRuleFailure {
            rule: rule.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, UpworkError>;
