//! AST error types

use refit_foundation::RefitError;
use thiserror::Error;

/// AST operation errors
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AstError {
    #[error("Parse error: {message}")]
    Parse { message: String },

    #[error("Analysis error: {message}")]
    Analysis { message: String },

    #[error("Unsupported syntax: {feature}")]
    UnsupportedSyntax { feature: String },
}

impl AstError {
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    pub fn analysis(message: impl Into<String>) -> Self {
        Self::Analysis {
            message: message.into(),
        }
    }

    pub fn unsupported_syntax(feature: impl Into<String>) -> Self {
        Self::UnsupportedSyntax {
            feature: feature.into(),
        }
    }
}

impl From<AstError> for RefitError {
    fn from(err: AstError) -> Self {
        match err {
            AstError::UnsupportedSyntax { feature } => RefitError::unsupported(feature),
            other => RefitError::unsupported(other.to_string()),
        }
    }
}

/// Result type alias for AST operations
pub type AstResult<T> = Result<T, AstError>;
