use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A typed error reported by the optimization service
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Error {
    #[serde(rename = "error")]
    pub error_type: ErrorType,
    #[serde(default)]
    pub message: String,
    /// Location returned alongside the error (e.g. an existing trial)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub location: String,
}

impl Error {
    pub fn new(error_type: ErrorType, message: impl Into<String>) -> Self {
        Self {
            error_type,
            message: message.into(),
            location: String::new(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "remote error: {}", self.error_type.as_str())
        } else {
            f.write_str(&self.message)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ErrorType {
    Unauthorized,
    ExperimentNameInvalid,
    ExperimentNameConflict,
    ExperimentInvalid,
    ExperimentNotFound,
    ExperimentStopped,
    TrialInvalid,
    TrialUnavailable,
    TrialAlreadyReported,
    TrialNotFound,
    /// The request never produced a service response (connection, decoding)
    Transport,
    Unexpected(String),
}

impl ErrorType {
    pub fn as_str(&self) -> &str {
        match self {
            ErrorType::Unauthorized => "unauthorized",
            ErrorType::ExperimentNameInvalid => "experiment-name-invalid",
            ErrorType::ExperimentNameConflict => "experiment-name-conflict",
            ErrorType::ExperimentInvalid => "experiment-invalid",
            ErrorType::ExperimentNotFound => "experiment-not-found",
            ErrorType::ExperimentStopped => "experiment-stopped",
            ErrorType::TrialInvalid => "trial-invalid",
            ErrorType::TrialUnavailable => "trial-unavailable",
            ErrorType::TrialAlreadyReported => "trial-already-reported",
            ErrorType::TrialNotFound => "trial-not-found",
            ErrorType::Transport => "transport",
            ErrorType::Unexpected(s) => s,
        }
    }
}

impl From<String> for ErrorType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "unauthorized" => ErrorType::Unauthorized,
            "experiment-name-invalid" => ErrorType::ExperimentNameInvalid,
            "experiment-name-conflict" => ErrorType::ExperimentNameConflict,
            "experiment-invalid" => ErrorType::ExperimentInvalid,
            "experiment-not-found" => ErrorType::ExperimentNotFound,
            "experiment-stopped" => ErrorType::ExperimentStopped,
            "trial-invalid" => ErrorType::TrialInvalid,
            "trial-unavailable" => ErrorType::TrialUnavailable,
            "trial-already-reported" => ErrorType::TrialAlreadyReported,
            "trial-not-found" => ErrorType::TrialNotFound,
            "transport" => ErrorType::Transport,
            _ => ErrorType::Unexpected(value),
        }
    }
}

impl From<ErrorType> for String {
    fn from(value: ErrorType) -> Self {
        value.as_str().to_string()
    }
}
