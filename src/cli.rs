//! CLI front door.
//!
//! Provides the command implementations behind the `docsplice` binary:
//! - `apply` - Run the pipeline over a file, answered by a recording
//! - `schema` - Print the field schema a pass would request
//! - `check` - Parse a file and report its targets
//!
//! All functions return `Result<T, CliError>`; `main.rs` renders the error
//! and picks the exit code.

use std::fs;
use std::path::{Path, PathBuf};

use tokio::sync::mpsc;
use tracing::info;

use docsplice_python::indent::detect_indent_style;
use docsplice_python::pipeline::check_source;
use docsplice_python::{EngineConfig, FieldSchema, PassEvent, Task, TargetNodes};

use crate::error::CliError;
use crate::output::{ApplyResponse, CheckResponse, PassReport, SchemaResponse, UsageSummary, SCHEMA_VERSION};
use crate::replay::{Recording, ReplayGenerator};
use crate::stream::document_streaming;

/// Read a source file.
pub fn read_source(path: &Path) -> Result<String, CliError> {
    fs::read_to_string(path).map_err(|_| CliError::file_not_found(path.display().to_string()))
}

/// Load an engine configuration file, or the defaults.
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig, CliError> {
    match path {
        Some(path) => {
            let text = fs::read_to_string(path).map_err(|_| CliError::file_not_found(path.display().to_string()))?;
            Ok(EngineConfig::from_json(&text)?)
        }
        None => Ok(EngineConfig::default()),
    }
}

// ============================================================================
// apply
// ============================================================================

/// Inputs to [`run_apply`].
#[derive(Debug, Clone)]
pub struct ApplyRequest {
    pub file: PathBuf,
    pub recording: PathBuf,
    pub config: EngineConfig,
    /// Characters per streamed delta; `None` replays each output whole.
    pub chunk_size: Option<usize>,
    /// Rewrite `file` with the result.
    pub write: bool,
    /// Receives every pass event as it happens.
    pub on_event: Option<fn(&PassEvent)>,
}

/// Run the pipeline over a file.
///
/// A generation failure is reported as [`CliError::Generation`] carrying the
/// partial result; the file is never rewritten in that case.
pub fn run_apply(request: &ApplyRequest) -> Result<ApplyResponse, CliError> {
    let source = read_source(&request.file)?;
    let recording = Recording::load(&request.recording)?;
    request.config.validate()?;
    let replay = ReplayGenerator::new(recording, request.chunk_size);

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    let on_event = request.on_event;
    let config = request.config.clone();
    let out = runtime.block_on(async move {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let printer = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Some(on_event) = on_event {
                    on_event(&event);
                }
            }
        });
        let out = document_streaming(source, config, replay, tx).await;
        printer
            .await
            .map_err(|e| CliError::internal(format!("event task failed: {e}")))?;
        out
    })?;

    if out.aborted {
        let message = out
            .error
            .map(|e| e.message)
            .unwrap_or_else(|| "stream aborted".to_string());
        return Err(CliError::Generation {
            message,
            partial: Some(out.buffer),
        });
    }

    if request.write {
        fs::write(&request.file, &out.buffer)?;
        info!(file = %request.file.display(), "file rewritten");
    }

    Ok(ApplyResponse {
        status: "ok".to_string(),
        schema_version: SCHEMA_VERSION.to_string(),
        file: request.file.display().to_string(),
        written: request.write,
        passes: out.passes.iter().map(PassReport::from).collect(),
        required_imports: out.required_imports,
        usage: UsageSummary::from_records(&out.usage),
        output: out.buffer,
    })
}

// ============================================================================
// schema
// ============================================================================

/// Describe the fields `task` would request for a file.
pub fn run_schema(file: &Path, task: Task, config: &EngineConfig) -> Result<SchemaResponse, CliError> {
    config.validate()?;
    let source = read_source(file)?;
    let module = check_source(&source)?;
    let targets = TargetNodes::collect(&module).map_err(docsplice_python::EngineError::from)?;

    let schema = match task {
        Task::Annotations => FieldSchema::annotations(&targets, config.overwrite_existing),
        Task::Docstrings => FieldSchema::docstrings(&targets, config.overwrite_existing),
        Task::Comments => FieldSchema::comments(&module),
    };

    Ok(SchemaResponse {
        status: "ok".to_string(),
        schema_version: SCHEMA_VERSION.to_string(),
        task,
        field_count: schema.field_count(),
        batches: schema
            .batches(config.max_nodes_per_request)
            .iter()
            .filter(|b| !b.is_empty())
            .map(FieldSchema::to_json)
            .collect(),
    })
}

// ============================================================================
// check
// ============================================================================

/// Parse a file, reject duplicate names, and summarize its targets.
pub fn run_check(file: &Path) -> Result<CheckResponse, CliError> {
    let source = read_source(file)?;
    let module = check_source(&source)?;
    let targets = TargetNodes::collect(&module).map_err(docsplice_python::EngineError::from)?;

    Ok(CheckResponse {
        status: "ok".to_string(),
        schema_version: SCHEMA_VERSION.to_string(),
        file: file.display().to_string(),
        functions: module.functions().count(),
        classes: module.classes().count(),
        methods: module.classes().map(|c| c.methods.len()).sum(),
        code_lines: module.comment_slots.len(),
        targets: targets.keys(),
        indent_style: detect_indent_style(&source).and_then(|style| {
            serde_json::to_value(style)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
        }),
    })
}
