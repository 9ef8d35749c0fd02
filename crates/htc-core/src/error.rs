//! Error types for the HTC engine
//!
//! All fallible operations return `Result<T, Error>`.
//! Every error is fatal to the run that produced it; there is no
//! warning tier here (the verifier owns warnings).

use thiserror::Error;

use crate::parser::tokenizer::Span;

/// HTC error types
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Parser expected one construct and found another
    #[error("{message} (at {span})")]
    Syntax { message: String, span: Span },

    /// Script is well-formed token-wise but structurally unusable
    #[error("{0}")]
    Structure(String),

    /// Assertion cannot be applied to the message it was given
    #[error("Evaluation error: {0}")]
    Evaluation(String),

    /// Static verification found errors
    #[error("Verification failed: {0}")]
    Verification(String),
}

impl Error {
    pub(crate) fn syntax(message: impl Into<String>, span: &Span) -> Self {
        Error::Syntax {
            message: message.into(),
            span: span.clone(),
        }
    }
}

/// Result type alias for HTC operations
pub type Result<T> = std::result::Result<T, Error>;
