//! Error types for generation, rendering and synchronization

use thiserror::Error;

use crate::quantity::QuantityError;
use crate::remote;
use crate::template::TemplateError;

/// Result alias used throughout the library
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by the library
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or incomplete user input (manifests, scenarios, selectors)
    #[error("{0}")]
    Input(String),

    /// A template failed to parse or execute
    #[error(transparent)]
    Render(#[from] TemplateError),

    /// The remote optimization service rejected a request
    #[error(transparent)]
    Remote(#[from] remote::Error),

    /// A resource quantity could not be parsed
    #[error(transparent)]
    Quantity(#[from] QuantityError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create an input error from any displayable message
    pub fn input(message: impl Into<String>) -> Self {
        Error::Input(message.into())
    }

    /// Prefix the error message with additional context
    pub fn context(self, context: impl std::fmt::Display) -> Self {
        match self {
            Error::Input(message) => Error::Input(format!("{context}: {message}")),
            other => Error::Input(format!("{context}: {other}")),
        }
    }
}
