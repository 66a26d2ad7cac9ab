//! Error types for html2doc.
//!
//! Library crates use [`Html2DocError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all html2doc operations.
#[derive(Debug, thiserror::Error)]
pub enum Html2DocError {
    /// Configuration loading or validation error. Fatal to the whole batch.
    #[error("config error: {message}")]
    Config { message: String },

    /// A configured input document does not exist.
    #[error("input file not found: {}", path.display())]
    InputNotFound { path: PathBuf },

    /// A generation response was not the structured data the stage required.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// The composed document failed the output validator.
    #[error("validation failed: {}", issues.join(" / "))]
    Validation { issues: Vec<String> },

    /// The consistency review found statements not supported by the source.
    #[error("consistency review failed: {}", findings.join(" / "))]
    Review { findings: Vec<String> },

    /// Transport or provider failure from the generation capability.
    #[error("generation error: {0}")]
    Generation(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Companion record serialization error.
    #[error("storage error: {0}")]
    Storage(String),

    /// A stage ran before the state it depends on was produced.
    #[error("pipeline error: {0}")]
    Pipeline(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, Html2DocError>;

impl Html2DocError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Issues carried by a validation failure, if this is one.
    pub fn validation_issues(&self) -> Option<&[String]> {
        match self {
            Self::Validation { issues } => Some(issues),
            _ => None,
        }
    }
}
