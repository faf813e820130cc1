use std::io;

use thiserror::Error;

/// Error type for configuration, input, and external-tool failures.
///
/// Solver failures are not represented here: an unsolvable program degrades to
/// an empty assignment with a warning instead of an error.
#[derive(Debug, Error)]
pub enum SplitError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("unknown technique '{0}'")]
    UnknownTechnique(String),
    #[error("unknown solver '{0}'")]
    UnknownSolver(String),
    #[error("unknown cluster tool '{0}'")]
    UnknownClusterTool(String),
    #[error("required input '{0}' is missing")]
    MissingInput(String),
    #[error("malformed input in {origin}: {details}")]
    MalformedInput { origin: String, details: String },
    #[error("entity '{entity}' referenced by {context} does not exist")]
    UnknownEntity { entity: String, context: String },
    #[error("external tool '{tool}' failed: {details}")]
    ExternalTool { tool: String, details: String },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("failed to encode report: {0}")]
    Report(#[from] serde_json::Error),
}

/// Coarse, enumerable classification of [`SplitError`] values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Caller configuration is inconsistent or names something unknown.
    Configuration,
    /// A required input file does not exist.
    MissingInput,
    /// An input exists but cannot be interpreted.
    MalformedInput,
    /// A similarity source failed for one technique.
    ExternalTool,
    /// Filesystem or encoding failure while reading or writing artifacts.
    Io,
}

impl ErrorKind {
    /// Stable process exit code for this kind.
    pub fn code(self) -> u8 {
        match self {
            ErrorKind::Configuration => 2,
            ErrorKind::MissingInput => 3,
            ErrorKind::MalformedInput => 4,
            ErrorKind::ExternalTool => 5,
            ErrorKind::Io => 6,
        }
    }
}

impl SplitError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SplitError::Configuration(_)
            | SplitError::UnknownTechnique(_)
            | SplitError::UnknownSolver(_)
            | SplitError::UnknownClusterTool(_) => ErrorKind::Configuration,
            SplitError::MissingInput(_) => ErrorKind::MissingInput,
            SplitError::MalformedInput { .. } | SplitError::UnknownEntity { .. } => {
                ErrorKind::MalformedInput
            }
            SplitError::ExternalTool { .. } => ErrorKind::ExternalTool,
            SplitError::Io(_) | SplitError::Report(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn malformed(origin: impl Into<String>, details: impl Into<String>) -> Self {
        SplitError::MalformedInput {
            origin: origin.into(),
            details: details.into(),
        }
    }
}
