//! Interfaces to the generation collaborators.
//!
//! The engine never invokes a model itself. A [`Generator`] receives a
//! [`GenerationRequest`] (the task, the current buffer and a JSON description
//! of the fields to fill) and returns an ordered stream of [`StreamChunk`]s:
//! zero or more text deltas followed by an optional [`UsageRecord`]. Errors
//! may arrive mid-stream.
//!
//! [`AnnotationRepair`] is consulted when an annotation value has unbalanced
//! brackets.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Task
// ============================================================================

/// What a pass asks the generator to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Task {
    Annotations,
    Docstrings,
    Comments,
}

impl Task {
    pub fn as_str(&self) -> &'static str {
        match self {
            Task::Annotations => "annotations",
            Task::Docstrings => "docstrings",
            Task::Comments => "comments",
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Requests and chunks
// ============================================================================

/// One generation request. A pass issues one request per schema batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    pub task: Task,
    /// The buffer as it stands when the request is issued.
    pub source: String,
    /// Field description for this batch.
    pub schema: serde_json::Value,
    /// Whether the caller will consume deltas incrementally.
    pub streaming: bool,
    /// Zero-based index of the batch within the pass.
    pub batch_index: usize,
}

/// Final metadata reported by the generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub id: String,
    pub model: String,
    pub created_at: DateTime<Utc>,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    /// The complete raw output.
    pub output: String,
}

/// A unit of generator output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamChunk {
    Delta(String),
    Usage(UsageRecord),
}

/// A generator failure, either before the stream starts or mid-stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("generation failed: {message}")]
pub struct GenerationError {
    pub message: String,
}

impl GenerationError {
    pub fn new(message: impl Into<String>) -> Self {
        GenerationError {
            message: message.into(),
        }
    }
}

/// The chunk stream returned by a generator.
pub type ChunkStream<'g> = Box<dyn Iterator<Item = Result<StreamChunk, GenerationError>> + 'g>;

// ============================================================================
// Collaborator traits
// ============================================================================

/// Produces generated text for a request.
pub trait Generator {
    fn generate(&mut self, request: &GenerationRequest) -> Result<ChunkStream<'_>, GenerationError>;
}

/// Corrects an annotation expression with unbalanced brackets.
pub trait AnnotationRepair {
    fn repair(&mut self, annotation: &str) -> Option<String>;
}

/// A repair collaborator that never repairs.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRepair;

impl AnnotationRepair for NoRepair {
    fn repair(&mut self, _annotation: &str) -> Option<String> {
        None
    }
}

impl<F> AnnotationRepair for F
where
    F: FnMut(&str) -> Option<String>,
{
    fn repair(&mut self, annotation: &str) -> Option<String> {
        self(annotation)
    }
}

/// Whether the brackets in an annotation balance, ignoring quoted text.
pub fn brackets_balanced(annotation: &str) -> bool {
    let mut stack = Vec::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for ch in annotation.chars() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '\'' | '"' => quote = Some(ch),
            '(' | '[' | '{' => stack.push(ch),
            ')' | ']' | '}' => {
                let open = match ch {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                if stack.pop() != Some(open) {
                    return false;
                }
            }
            _ => {}
        }
    }
    stack.is_empty() && quote.is_none()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_display_matches_serde() {
        assert_eq!(Task::Docstrings.to_string(), "docstrings");
        assert_eq!(
            serde_json::to_string(&Task::Annotations).unwrap(),
            "\"annotations\""
        );
    }

    #[test]
    fn balanced_brackets() {
        assert!(brackets_balanced("dict[str, list[int]]"));
        assert!(brackets_balanced("Literal['[']"));
        assert!(!brackets_balanced("dict[str, int"));
        assert!(!brackets_balanced("list[int)"));
        assert!(!brackets_balanced("tuple[int]]"));
    }

    #[test]
    fn closure_repairs() {
        let mut repair = |s: &str| Some(format!("{s}]"));
        assert_eq!(
            AnnotationRepair::repair(&mut repair, "list[int"),
            Some("list[int]".to_string())
        );
        assert_eq!(NoRepair.repair("list[int"), None);
    }
}
