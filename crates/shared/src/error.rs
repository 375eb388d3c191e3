use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NotFound,
    Validation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// A bridge line that could not be turned into a frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("empty frame")]
    Empty,
    #[error("frame `{line}` has {actual} fields, expected {expected}")]
    FieldCount {
        line: String,
        expected: usize,
        actual: usize,
    },
    #[error("unknown frame tag `{tag}` in `{line}`")]
    UnknownTag { line: String, tag: String },
    #[error("unknown verb `{0}`")]
    UnknownVerb(String),
    #[error("unknown call result `{0}`")]
    UnknownResult(String),
    #[error("field `{0}` contains a separator or line break")]
    InvalidField(String),
}
