//! Error types and error code constants for the docsplice CLI.
//!
//! `CliError` bridges the engine's errors into one type with stable numeric
//! codes, used both for the process exit code and the JSON error response.
//!
//! ## Error Code Mapping
//!
//! - `2`: Invalid arguments (bad flags, unreadable config, missing file)
//! - `3`: Source errors (the input or a pass's output does not parse,
//!   duplicate names)
//! - `4`: Generation failed (the recorded or live stream ended in an error)
//! - `10`: Internal errors (I/O, task failures)

use std::fmt;
use std::io;

use thiserror::Error;

use docsplice_python::{EngineError, GenerationError};

// ============================================================================
// Output Error Codes
// ============================================================================

/// Numeric error codes for exit status and JSON output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OutputErrorCode {
    InvalidArguments = 2,
    SourceError = 3,
    GenerationFailed = 4,
    InternalError = 10,
}

impl OutputErrorCode {
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for OutputErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ============================================================================
// Unified Error Type
// ============================================================================

/// Unified error type for CLI output.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("invalid arguments: {message}")]
    InvalidArguments { message: String },

    #[error("file not found: {path}")]
    FileNotFound { path: String },

    /// The input does not parse or has duplicate names.
    #[error("{message}")]
    Source { message: String },

    /// A pass produced output that does not parse.
    #[error("{message}")]
    InvalidOutput { task: String, message: String },

    /// The generator failed; `partial` holds the buffer as it stood.
    #[error("generation failed: {message}")]
    Generation {
        message: String,
        partial: Option<String>,
    },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl From<&CliError> for OutputErrorCode {
    fn from(err: &CliError) -> Self {
        match err {
            CliError::InvalidArguments { .. } | CliError::FileNotFound { .. } => {
                OutputErrorCode::InvalidArguments
            }
            CliError::Source { .. } | CliError::InvalidOutput { .. } => OutputErrorCode::SourceError,
            CliError::Generation { .. } => OutputErrorCode::GenerationFailed,
            CliError::Internal { .. } => OutputErrorCode::InternalError,
        }
    }
}

// ============================================================================
// Bridges
// ============================================================================

impl From<EngineError> for CliError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Parse(e) => CliError::Source {
                message: format!("parse error: {e}"),
            },
            EngineError::Structural(e) => CliError::Source { message: e.to_string() },
            EngineError::InvalidOutput { task, source } => CliError::InvalidOutput {
                task: task.to_string(),
                message: format!("output of the {task} pass does not parse: {source}"),
            },
            EngineError::InvalidConfig(message) => CliError::InvalidArguments { message },
        }
    }
}

impl From<GenerationError> for CliError {
    fn from(err: GenerationError) -> Self {
        CliError::Generation {
            message: err.message,
            partial: None,
        }
    }
}

impl From<io::Error> for CliError {
    fn from(err: io::Error) -> Self {
        CliError::Internal {
            message: format!("IO error: {err}"),
        }
    }
}

// ============================================================================
// Convenience Constructors
// ============================================================================

impl CliError {
    pub fn invalid_args(message: impl Into<String>) -> Self {
        CliError::InvalidArguments {
            message: message.into(),
        }
    }

    pub fn file_not_found(path: impl Into<String>) -> Self {
        CliError::FileNotFound { path: path.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        CliError::Internal {
            message: message.into(),
        }
    }

    pub fn error_code(&self) -> OutputErrorCode {
        OutputErrorCode::from(self)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use docsplice_python::{ParseError, StructuralError, Task};
    use docsplice_core::Position;

    mod error_code_mapping {
        use super::*;

        #[test]
        fn invalid_arguments_map_to_2() {
            assert_eq!(CliError::invalid_args("bad flag").error_code().code(), 2);
            assert_eq!(CliError::file_not_found("x.py").error_code().code(), 2);
        }

        #[test]
        fn source_errors_map_to_3() {
            let parse: CliError = EngineError::Parse(ParseError::UnexpectedIndent { line: 2 }).into();
            assert_eq!(parse.error_code(), OutputErrorCode::SourceError);

            let dup: CliError =
                EngineError::Structural(StructuralError::DuplicateClass { name: "A".into() }).into();
            assert_eq!(dup.error_code().code(), 3);
            assert_eq!(dup.to_string(), "class `A` is duplicated; please fix this before running");
        }

        #[test]
        fn invalid_output_keeps_task() {
            let err: CliError = EngineError::InvalidOutput {
                task: Task::Docstrings,
                source: ParseError::UnterminatedString {
                    at: Position::new(3, 4),
                },
            }
            .into();
            match &err {
                CliError::InvalidOutput { task, .. } => assert_eq!(task, "docstrings"),
                other => panic!("unexpected {other:?}"),
            }
            assert_eq!(err.error_code().code(), 3);
        }

        #[test]
        fn generation_maps_to_4() {
            let err: CliError = GenerationError::new("stream reset").into();
            assert_eq!(err.error_code().code(), 4);
            assert_eq!(err.to_string(), "generation failed: stream reset");
        }

        #[test]
        fn config_and_io_errors() {
            let config: CliError = EngineError::InvalidConfig("nope".into()).into();
            assert_eq!(config.error_code().code(), 2);
            let io: CliError = io::Error::other("disk").into();
            assert_eq!(io.error_code().code(), 10);
        }
    }
}
