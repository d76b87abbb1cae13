//! The document pipeline.
//!
//! ```text
//! parse -> duplicate check -> annotations -> typing imports -> re-parse
//!       -> docstrings -> re-parse -> comments -> final parse
//! ```
//!
//! Each pass works against an outline of the buffer it starts from. A pass
//! whose output no longer parses fails the document with
//! [`EngineError::InvalidOutput`]; a generator failure stops the pipeline and
//! returns the buffer as it stands.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{info, info_span, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::events::{EventSink, PassEvent};
use crate::generation::{AnnotationRepair, GenerationError, Generator, Task, UsageRecord};
use crate::outline::{parse_module, Module};
use crate::passes::{apply_argument_annotations, apply_comments, apply_docstrings, PassStats};
use crate::targets::{check_no_duplicates, TargetNodes};
use crate::typing_imports::maybe_add_typing_imports;

/// Counts for one pass that ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PassSummary {
    pub task: Task,
    #[serde(flatten)]
    pub stats: PassStats,
}

/// Result of [`document`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentOutput {
    pub buffer: String,
    /// `typing` names the annotation pass needed, all now imported.
    pub required_imports: BTreeSet<String>,
    pub usage: Vec<UsageRecord>,
    pub passes: Vec<PassSummary>,
    pub aborted: bool,
    pub error: Option<GenerationError>,
}

impl DocumentOutput {
    fn new(buffer: String) -> Self {
        DocumentOutput {
            buffer,
            required_imports: BTreeSet::new(),
            usage: Vec::new(),
            passes: Vec::new(),
            aborted: false,
            error: None,
        }
    }

    fn abort(mut self, error: Option<GenerationError>) -> Self {
        self.aborted = true;
        self.error = error;
        self
    }
}

/// Parse `source` and reject duplicate names, before any pass runs.
pub fn check_source(source: &str) -> EngineResult<Module> {
    let module = parse_module(source)?;
    check_no_duplicates(&module)?;
    Ok(module)
}

fn reparse(buffer: &str, task: Task) -> EngineResult<Module> {
    parse_module(buffer).map_err(|source| EngineError::InvalidOutput { task, source })
}

/// Run the enabled passes over `source`.
pub fn document(
    source: &str,
    config: &EngineConfig,
    generator: &mut dyn Generator,
    repair: &mut dyn AnnotationRepair,
    sink: &mut dyn EventSink,
) -> EngineResult<DocumentOutput> {
    config.validate()?;
    let mut module = check_source(source)?;
    let mut out = DocumentOutput::new(source.to_string());
    let mut last_task = None;

    if config.write_annotations {
        let _span = info_span!("pass", task = %Task::Annotations).entered();
        let targets = TargetNodes::collect(&module)?;
        let pass = apply_argument_annotations(&out.buffer, &targets, config, generator, repair, sink);
        reparse(&pass.buffer, Task::Annotations)?;

        let mut buffer = pass.buffer;
        if !pass.required_imports.is_empty() {
            buffer = maybe_add_typing_imports(&buffer, pass.required_imports.iter().map(String::as_str))
                .map_err(|source| EngineError::InvalidOutput {
                    task: Task::Annotations,
                    source,
                })?;
            info!(imports = ?pass.required_imports, "typing imports ensured");
            sink.emit(PassEvent::Intermediate {
                task: Task::Annotations,
                buffer: buffer.clone(),
            });
        }

        out.buffer = buffer;
        out.required_imports = pass.required_imports;
        out.usage.extend(pass.usage);
        out.passes.push(PassSummary {
            task: Task::Annotations,
            stats: pass.stats,
        });
        if pass.aborted {
            warn!("annotation pass aborted; stopping");
            return Ok(out.abort(pass.error));
        }
        module = reparse(&out.buffer, Task::Annotations)?;
        last_task = Some(Task::Annotations);
    }

    if config.write_docstrings {
        let _span = info_span!("pass", task = %Task::Docstrings).entered();
        let targets = TargetNodes::collect(&module)?;
        let pass = apply_docstrings(&out.buffer, &targets, config, generator, sink);
        out.buffer = pass.buffer;
        out.usage.extend(pass.usage);
        out.passes.push(PassSummary {
            task: Task::Docstrings,
            stats: pass.stats,
        });
        reparse(&out.buffer, Task::Docstrings)?;
        if pass.aborted {
            warn!("docstring pass aborted; stopping");
            return Ok(out.abort(pass.error));
        }
        last_task = Some(Task::Docstrings);
    }

    if config.write_comments {
        let _span = info_span!("pass", task = %Task::Comments).entered();
        let pass = apply_comments(&out.buffer, config, generator, sink)?;
        out.buffer = pass.buffer;
        out.usage.extend(pass.usage);
        out.passes.push(PassSummary {
            task: Task::Comments,
            stats: pass.stats,
        });
        if pass.aborted {
            reparse(&out.buffer, Task::Comments)?;
            warn!("comment pass aborted; stopping");
            return Ok(out.abort(pass.error));
        }
        last_task = Some(Task::Comments);
    }

    if let Some(task) = last_task {
        reparse(&out.buffer, task)?;
    }
    Ok(out)
}

// ============================================================================
// Tests
// ============================================================================
