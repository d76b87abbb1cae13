//! Replay of recorded generator output.
//!
//! A recording holds, per task, the outputs a generator returned for each
//! request in order. Outputs may be written as raw text or as JSON objects:
//!
//! ```json
//! {
//!   "model": "recorded",
//!   "annotations": [{"FunctionLoad": {"path": "str", "returns": "bytes"}}],
//!   "docstrings": ["{\"function_load\": \"Read a file.\"}"],
//!   "comments": []
//! }
//! ```
//!
//! A request with no recorded output left fails, which ends its pass with
//! `aborted = true`.

use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use docsplice_python::{ChunkStream, GenerationError, GenerationRequest, Generator, StreamChunk, Task, UsageRecord};

use crate::error::CliError;

/// One recorded output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordedOutput {
    Text(String),
    Json(serde_json::Value),
}

impl RecordedOutput {
    pub fn text(&self) -> String {
        match self {
            RecordedOutput::Text(text) => text.clone(),
            RecordedOutput::Json(value) => value.to_string(),
        }
    }
}

/// Recorded outputs per task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Recording {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub annotations: Vec<RecordedOutput>,
    pub docstrings: Vec<RecordedOutput>,
    pub comments: Vec<RecordedOutput>,
}

impl Recording {
    pub fn from_json(text: &str) -> Result<Self, CliError> {
        serde_json::from_str(text).map_err(|e| CliError::invalid_args(format!("invalid recording: {e}")))
    }

    pub fn load(path: &Path) -> Result<Self, CliError> {
        let text = fs::read_to_string(path).map_err(|_| CliError::file_not_found(path.display().to_string()))?;
        Self::from_json(&text)
    }
}

/// Split `text` into deltas of at most `size` characters; `None` yields a
/// single delta.
pub fn split_deltas(text: &str, size: Option<usize>) -> Vec<String> {
    match size {
        None => vec![text.to_string()],
        Some(size) => {
            let chars: Vec<char> = text.chars().collect();
            chars.chunks(size.max(1)).map(|c| c.iter().collect()).collect()
        }
    }
}

/// A [`Generator`] answering from a [`Recording`].
#[derive(Debug, Clone)]
pub struct ReplayGenerator {
    model: String,
    annotations: VecDeque<RecordedOutput>,
    docstrings: VecDeque<RecordedOutput>,
    comments: VecDeque<RecordedOutput>,
    chunk_size: Option<usize>,
    served: usize,
}

impl ReplayGenerator {
    pub fn new(recording: Recording, chunk_size: Option<usize>) -> Self {
        ReplayGenerator {
            model: recording.model.unwrap_or_else(|| "replay".to_string()),
            annotations: recording.annotations.into(),
            docstrings: recording.docstrings.into(),
            comments: recording.comments.into(),
            chunk_size,
            served: 0,
        }
    }

    /// The chunks for the next request of `task`, ending with a usage record.
    pub fn next_chunks(&mut self, request: &GenerationRequest) -> Result<Vec<StreamChunk>, GenerationError> {
        let queue = match request.task {
            Task::Annotations => &mut self.annotations,
            Task::Docstrings => &mut self.docstrings,
            Task::Comments => &mut self.comments,
        };
        let output = queue
            .pop_front()
            .ok_or_else(|| {
                GenerationError::new(format!(
                    "no recorded {} output for batch {}",
                    request.task, request.batch_index
                ))
            })?
            .text();

        self.served += 1;
        debug!(task = %request.task, batch = request.batch_index, len = output.len(), "replaying output");

        let chunk_size = if request.streaming { self.chunk_size } else { None };
        let mut chunks: Vec<StreamChunk> = split_deltas(&output, chunk_size)
            .into_iter()
            .map(StreamChunk::Delta)
            .collect();
        chunks.push(StreamChunk::Usage(UsageRecord {
            id: format!("replay-{}", self.served),
            model: self.model.clone(),
            created_at: Utc::now(),
            prompt_tokens: 0,
            completion_tokens: 0,
            output,
        }));
        Ok(chunks)
    }
}

impl Generator for ReplayGenerator {
    fn generate(&mut self, request: &GenerationRequest) -> Result<ChunkStream<'_>, GenerationError> {
        let chunks = self.next_chunks(request)?;
        Ok(Box::new(chunks.into_iter().map(Ok)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(task: Task, streaming: bool) -> GenerationRequest {
        GenerationRequest {
            task,
            source: String::new(),
            schema: json!({}),
            streaming,
            batch_index: 0,
        }
    }

    #[test]
    fn text_and_json_outputs() {
        let recording = Recording::from_json(
            r#"{"annotations": [{"FunctionF": {"x": "int"}}], "comments": ["{\"line1\": \"hi\"}"]}"#,
        )
        .unwrap();
        assert_eq!(recording.annotations[0].text(), r#"{"FunctionF":{"x":"int"}}"#);
        assert_eq!(recording.comments[0].text(), r#"{"line1": "hi"}"#);
        assert!(recording.docstrings.is_empty());
    }

    #[test]
    fn chunks_end_with_usage() {
        let recording = Recording {
            model: Some("m".into()),
            comments: vec![RecordedOutput::Text("abcdefg".into())],
            ..Recording::default()
        };
        let mut generator = ReplayGenerator::new(recording, Some(3));
        let chunks = generator.next_chunks(&request(Task::Comments, true)).unwrap();
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0], StreamChunk::Delta("abc".into()));
        match &chunks[3] {
            StreamChunk::Usage(usage) => {
                assert_eq!(usage.model, "m");
                assert_eq!(usage.output, "abcdefg");
                assert_eq!(usage.id, "replay-1");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn non_streaming_requests_get_one_delta() {
        let recording = Recording {
            docstrings: vec![RecordedOutput::Text("abcdefg".into())],
            ..Recording::default()
        };
        let mut generator = ReplayGenerator::new(recording, Some(2));
        let chunks = generator.next_chunks(&request(Task::Docstrings, false)).unwrap();
        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn exhausted_task_fails() {
        let mut generator = ReplayGenerator::new(Recording::default(), None);
        let err = generator.next_chunks(&request(Task::Annotations, true)).unwrap_err();
        assert_eq!(err.message, "no recorded annotations output for batch 0");
    }

    #[test]
    fn split_deltas_respects_chars() {
        assert_eq!(split_deltas("héllo", Some(2)), vec!["hé", "ll", "o"]);
        assert_eq!(split_deltas("héllo", None), vec!["héllo"]);
    }
}
