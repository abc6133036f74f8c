//! Error types for gi-engine.

use thiserror::Error;

/// Main error type for engine-level operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration could not be parsed.
    #[error("Config error: {0}")]
    Config(#[source] serde_json::Error),
}

/// Error returned by a knowledge callback.
///
/// The engine never propagates these; they are wrapped into a
/// [`HandlerFault`](crate::HandlerFault) and reported.
#[derive(Debug, Clone, Error)]
pub enum KnowledgeError {
    /// Handler-defined failure.
    #[error("{0}")]
    Failed(String),

    /// Context access failed inside the callback.
    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    /// JSON conversion failed inside the callback.
    #[error("JSON error: {0}")]
    Json(String),

    /// The callback panicked.
    #[error("panicked: {0}")]
    Panicked(String),
}

impl KnowledgeError {
    /// Create a handler-defined failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

impl From<serde_json::Error> for KnowledgeError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e.to_string())
    }
}

/// Errors from reading or writing [`Context`](crate::Context) fields.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContextError {
    /// `append` hit a field that holds something other than an array.
    #[error("field '{field}' is not an array")]
    NotAnArray { field: String },

    /// A typed read or write could not convert the value.
    #[error("field '{field}' conversion failed: {message}")]
    Conversion { field: String, message: String },

    /// A context can only be built from a JSON object.
    #[error("context must be built from a JSON object")]
    NotAnObject,
}

/// Result type alias using EngineError.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Result type for knowledge callbacks.
pub type KnowledgeResult<T> = std::result::Result<T, KnowledgeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_config_error_keeps_its_source() {
        let parse = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = EngineError::Config(parse);

        assert!(err.to_string().starts_with("Config error: "));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_context_error_converts_into_knowledge_error() {
        let err: KnowledgeError = ContextError::NotAnObject.into();
        assert!(matches!(err, KnowledgeError::Context(ContextError::NotAnObject)));
    }
}
