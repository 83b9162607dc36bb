//! Result and error types for codediff.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for codediff operations
pub type CodediffResult<T> = Result<T, CodediffError>;

/// Errors that abort a parse, join, diff or report
#[derive(Debug, Error)]
pub enum CodediffError {
    /// Path given as a run directory is not a directory
    #[error("{} does not name a directory", path.display())]
    NotADirectory {
        /// Offending path
        path: PathBuf,
    },

    /// A file the run directory must contain is absent
    #[error("Input directory {} contains no file named '{name}'", dir.display())]
    MissingFile {
        /// Run directory
        dir: PathBuf,
        /// Name of the missing member
        name: String,
    },

    /// The `exitcode` member does not hold an integer
    #[error("Invalid exit code '{value}' in {}", path.display())]
    InvalidExitCode {
        /// File that was read
        path: PathBuf,
        /// Text that failed to parse
        value: String,
    },

    /// Two runs cannot be joined because a field that must match differs
    #[error("Cannot join test runs with different {field}")]
    JoinMismatch {
        /// Name of the mismatched field
        field: &'static str,
    },

    /// Two runs being joined both contain the same named test
    #[error("Cannot join test runs containing the same test {name}")]
    DuplicateTest {
        /// Test name
        name: String,
    },

    /// A test or kernel index was requested that the run does not have
    #[error("Run has no kernel {index} in test '{test}'")]
    UnknownKernel {
        /// Test name
        test: String,
        /// Zero-based kernel index
        index: usize,
    },

    /// Nothing was given to join
    #[error("At least one run is required")]
    NoRuns,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
