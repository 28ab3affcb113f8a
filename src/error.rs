//! Error taxonomy for a codemod run.
//!
//! Only failures that abort a run live here. Per-file transform failures,
//! empty matches and idle timeouts are reported through
//! [`RunMessage`](crate::core::types::RunMessage) and
//! [`RunSummary`](crate::core::types::RunSummary) instead.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, RecastError>;

/// Errors that terminate a run or a CLI command.
#[derive(Debug, Error)]
pub enum RecastError {
    /// Invalid descriptor, settings, or engine wiring.
    #[error("configuration error: {0}")]
    Config(String),

    /// The codemod declares an engine kind that cannot be executed.
    #[error("engine '{engine}' is not supported")]
    UnsupportedEngine { engine: String },

    /// The transform source could not be loaded at all.
    #[error("cannot load transform {}: {source}", path.display())]
    TransformLoad { path: PathBuf, source: io::Error },

    /// Filesystem failure outside of per-file transform execution.
    #[error("{operation} {}: {source}", path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        source: io::Error,
    },

    /// YAML descriptor or config could not be parsed.
    #[error("invalid YAML in {}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        source: serde_yaml_ng::Error,
    },

    /// A glob pattern failed to compile.
    #[error("invalid pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        source: glob::PatternError,
    },

    /// Engine-level failure that is not tied to a single file.
    #[error("engine failure: {0}")]
    Engine(String),
}

impl RecastError {
    /// Whether this error belongs to the fatal configuration class.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::UnsupportedEngine { .. } | Self::TransformLoad { .. }
        )
    }

    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }
}
