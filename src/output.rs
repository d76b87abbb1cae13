//! JSON output types for CLI responses.
//!
//! ## Design Principles
//!
//! 1. **Status first:** Every response has `status` as its first field
//! 2. **Deterministic:** Same input produces the same bytes (field order,
//!    sorted name sets)
//! 3. **Versioned:** `schema_version` enables forward compatibility

use std::collections::BTreeSet;
use std::io::{self, Write};

use serde::{Deserialize, Serialize};

use docsplice_python::pipeline::PassSummary;
use docsplice_python::{Task, UsageRecord};

use crate::error::{CliError, OutputErrorCode};

/// Current schema version for all responses.
pub const SCHEMA_VERSION: &str = "1";

// ============================================================================
// Common Types
// ============================================================================

/// Token totals over every generation request of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSummary {
    pub requests: usize,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub models: Vec<String>,
}

impl UsageSummary {
    pub fn from_records(records: &[UsageRecord]) -> Self {
        let mut models: Vec<String> = Vec::new();
        for record in records {
            if !models.contains(&record.model) {
                models.push(record.model.clone());
            }
        }
        UsageSummary {
            requests: records.len(),
            prompt_tokens: records.iter().map(|r| r.prompt_tokens).sum(),
            completion_tokens: records.iter().map(|r| r.completion_tokens).sum(),
            models,
        }
    }
}

/// Error information for error responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorInfo {
    pub fn from_error(err: &CliError) -> Self {
        let details = match err {
            CliError::FileNotFound { path } => Some(serde_json::json!({ "path": path })),
            CliError::InvalidOutput { task, .. } => Some(serde_json::json!({ "task": task })),
            CliError::Generation {
                partial: Some(partial),
                ..
            } => Some(serde_json::json!({ "partial_output": partial })),
            _ => None,
        };
        ErrorInfo {
            code: OutputErrorCode::from(err).code(),
            message: err.to_string(),
            details,
        }
    }
}

// ============================================================================
// Response Structs
// ============================================================================

/// Response for `docsplice apply`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyResponse {
    pub status: String,
    pub schema_version: String,
    pub file: String,
    /// Whether the file was rewritten in place.
    pub written: bool,
    pub passes: Vec<PassReport>,
    pub required_imports: BTreeSet<String>,
    pub usage: UsageSummary,
    pub output: String,
}

/// One pass's counts in an [`ApplyResponse`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassReport {
    pub task: Task,
    pub applied: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl From<&PassSummary> for PassReport {
    fn from(summary: &PassSummary) -> Self {
        PassReport {
            task: summary.task,
            applied: summary.stats.applied,
            skipped: summary.stats.skipped,
            failed: summary.stats.failed,
        }
    }
}

/// Response for `docsplice schema`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaResponse {
    pub status: String,
    pub schema_version: String,
    pub task: Task,
    pub field_count: usize,
    /// One JSON description per generation request.
    pub batches: Vec<serde_json::Value>,
}

/// Response for `docsplice check`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResponse {
    pub status: String,
    pub schema_version: String,
    pub file: String,
    pub functions: usize,
    pub classes: usize,
    pub methods: usize,
    pub code_lines: usize,
    /// Target keys in source order (`f`, `C`, `C-m`).
    pub targets: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indent_style: Option<String>,
}

/// Error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub schema_version: String,
    pub error: ErrorInfo,
}

impl ErrorResponse {
    pub fn from_error(err: &CliError) -> Self {
        ErrorResponse {
            status: "error".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            error: ErrorInfo::from_error(err),
        }
    }
}

// ============================================================================
// Response Emission
// ============================================================================

/// Emit a response as pretty-printed JSON.
pub fn emit_response<T: Serialize>(response: &T, writer: &mut impl Write) -> io::Result<()> {
    let json = serde_json::to_string_pretty(response).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writeln!(writer, "{}", json)
}

/// Emit a response as compact JSON (single line).
pub fn emit_response_compact<T: Serialize>(response: &T, writer: &mut impl Write) -> io::Result<()> {
    let json = serde_json::to_string(response).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writeln!(writer, "{}", json)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(model: &str, prompt: u64, completion: u64) -> UsageRecord {
        UsageRecord {
            id: "r".into(),
            model: model.into(),
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            prompt_tokens: prompt,
            completion_tokens: completion,
            output: String::new(),
        }
    }

    #[test]
    fn usage_totals() {
        let summary = UsageSummary::from_records(&[record("a", 10, 2), record("b", 5, 1), record("a", 1, 1)]);
        assert_eq!(summary.requests, 3);
        assert_eq!(summary.prompt_tokens, 16);
        assert_eq!(summary.completion_tokens, 4);
        assert_eq!(summary.models, vec!["a", "b"]);
    }

    #[test]
    fn error_response_shape() {
        let err = CliError::Generation {
            message: "reset".into(),
            partial: Some("x = 1\n".into()),
        };
        let mut out = Vec::new();
        emit_response_compact(&ErrorResponse::from_error(&err), &mut out).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"]["code"], 4);
        assert_eq!(json["error"]["details"]["partial_output"], "x = 1\n");
        let keys: Vec<&String> = json.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["status", "schema_version", "error"]);
    }

    #[test]
    fn pretty_output_ends_with_newline() {
        let mut out = Vec::new();
        let response = ErrorResponse::from_error(&CliError::invalid_args("x"));
        emit_response(&response, &mut out).unwrap();
        assert!(out.ends_with(b"}\n"));
    }
}
