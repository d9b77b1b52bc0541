//! 图构建错误
//!
//! Errors that abort building the graph of one function. Internal invariant
//! violations are not represented here; they panic.

use crate::util::span::TokenPosition;
use thiserror::Error;

/// Diagnosed failure while building a flow graph
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BuildError {
    /// Compile error attributed to a source position
    #[error("{script}:{position}: error: {message}")]
    Compile {
        script: String,
        position: TokenPosition,
        message: String,
    },

    /// Stable name that does not resolve to an entity
    #[error("unresolved {kind} '{name}'")]
    Unresolved { kind: &'static str, name: String },

    /// Expression required to be constant is not
    #[error("not a constant expression at {position}: {message}")]
    NotConstant { position: TokenPosition, message: String },

    /// Construct the builder cannot inline
    #[error("inlining bailed out: {reason}")]
    InlineBailout { reason: String },

    /// Function has no body to translate
    #[error("function '{function}' has no body")]
    MissingBody { function: String },
}

impl BuildError {
    /// Attach a script and position to errors that have neither
    pub fn at(
        self,
        script: &str,
        position: TokenPosition,
    ) -> BuildError {
        match self {
            BuildError::Unresolved { kind, name } => BuildError::Compile {
                script: script.to_string(),
                position,
                message: format!("unresolved {} '{}'", kind, name),
            },
            other => other,
        }
    }
}

/// Result of graph construction steps
pub type BuildResult<T> = Result<T, BuildError>;
