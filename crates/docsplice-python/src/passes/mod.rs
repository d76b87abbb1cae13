//! The annotation, docstring and comment passes.
//!
//! Each pass owns one [`SpliceBuffer`] for its whole run. For every schema
//! batch it issues a [`GenerationRequest`], pushes the returned chunks
//! through a [`StreamingAssembler`], and splices each completed field as soon
//! as it arrives. Completed splices are never rolled back: a generator error
//! ends the pass with `aborted = true` and the buffer as it stands.

pub mod annotations;
pub mod comments;
pub mod docstrings;

pub use annotations::{apply_argument_annotations, AnnotationPassOutput};
pub use comments::apply_comments;
pub use docstrings::apply_docstrings;

use serde::Serialize;
use tracing::{debug, info, warn};

use docsplice_core::{SpliceBuffer, SpliceResult};

use crate::assembler::{FieldEmission, StreamingAssembler};
use crate::config::EngineConfig;
use crate::events::{EventSink, PassEvent};
use crate::generation::{GenerationError, GenerationRequest, Generator, StreamChunk, Task, UsageRecord};
use crate::schema::{Field, FieldSchema};
use crate::splice::SpliceOutcome;

/// Splice counts for one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PassStats {
    pub applied: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Result of a docstring or comment pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassOutput {
    pub buffer: String,
    pub usage: Vec<UsageRecord>,
    /// The generator failed before the pass saw all of its output.
    pub aborted: bool,
    pub error: Option<GenerationError>,
    pub stats: PassStats,
}

/// Push-driven state for one pass.
///
/// [`feed`](PassSession::feed) and [`finish`](PassSession::finish) drive one
/// batch at a time; [`run_pass`] wires them to a [`Generator`].
pub struct PassSession<'s, 'm> {
    task: Task,
    buffer: SpliceBuffer,
    batch: Option<(FieldSchema<'m>, StreamingAssembler)>,
    overwrite: bool,
    stats: PassStats,
    sink: &'s mut dyn EventSink,
}

/// Applies one completed value to the buffer.
pub type FieldApplier<'a, 'm> = dyn FnMut(&mut SpliceBuffer, &Field<'m>, &str) -> SpliceResult<SpliceOutcome> + 'a;

impl<'s, 'm> PassSession<'s, 'm> {
    pub fn new(task: Task, source: &str, overwrite: bool, sink: &'s mut dyn EventSink) -> Self {
        PassSession {
            task,
            buffer: SpliceBuffer::new(source),
            batch: None,
            overwrite,
            stats: PassStats::default(),
            sink,
        }
    }

    pub fn text(&self) -> &str {
        self.buffer.text()
    }

    pub fn stats(&self) -> PassStats {
        self.stats
    }

    /// Start collecting output for `schema`.
    pub fn begin(&mut self, schema: FieldSchema<'m>) {
        let assembler = StreamingAssembler::new(schema.expectations(), self.overwrite);
        self.batch = Some((schema, assembler));
    }

    /// Push a fragment of the current batch's output.
    pub fn feed(&mut self, fragment: &str, apply: &mut FieldApplier<'_, 'm>) {
        let Some((_, assembler)) = self.batch.as_mut() else {
            warn!(task = %self.task, "fragment received with no batch started");
            return;
        };
        let emissions = assembler.feed(fragment);
        self.apply_all(emissions, apply);
    }

    /// End the current batch, flushing fields the stream left complete.
    pub fn finish(&mut self, apply: &mut FieldApplier<'_, 'm>) {
        let emissions = match self.batch.as_mut() {
            Some((_, assembler)) => assembler.finish(),
            None => return,
        };
        self.apply_all(emissions, apply);
        self.batch = None;
    }

    fn apply_all(&mut self, emissions: Vec<FieldEmission>, apply: &mut FieldApplier<'_, 'm>) {
        for emission in emissions {
            let Some(field) = self.batch.as_ref().and_then(|(schema, _)| schema.field(&emission.key)) else {
                continue;
            };
            match apply(&mut self.buffer, field, &emission.value) {
                Ok(SpliceOutcome::Applied) => {
                    debug!(task = %self.task, key = %emission.key, "spliced");
                    self.stats.applied += 1;
                    self.sink.emit(PassEvent::Intermediate {
                        task: self.task,
                        buffer: self.buffer.text().to_string(),
                    });
                }
                Ok(SpliceOutcome::Skipped(reason)) => {
                    debug!(task = %self.task, key = %emission.key, ?reason, "field skipped");
                    self.stats.skipped += 1;
                }
                Err(e) => {
                    warn!(task = %self.task, key = %emission.key, error = %e, "splice failed; skipping field");
                    self.stats.failed += 1;
                }
            }
        }
    }

    /// Emit the final event and return the pass result.
    pub fn close(self, usage: Vec<UsageRecord>, error: Option<GenerationError>) -> PassOutput {
        let aborted = error.is_some();
        let buffer = self.buffer.into_text();
        info!(
            task = %self.task,
            applied = self.stats.applied,
            skipped = self.stats.skipped,
            failed = self.stats.failed,
            aborted,
            "pass complete"
        );
        self.sink.emit(PassEvent::Final {
            task: self.task,
            buffer: buffer.clone(),
            usage: usage.clone(),
            aborted,
        });
        PassOutput {
            buffer,
            usage,
            aborted,
            error,
            stats: self.stats,
        }
    }
}

/// Run a pass over `source`: one request per batch of `schema`, each
/// completed field handed to `apply`.
pub(crate) fn run_pass<'m>(
    source: &str,
    schema: FieldSchema<'m>,
    config: &EngineConfig,
    generator: &mut dyn Generator,
    sink: &mut dyn EventSink,
    apply: &mut FieldApplier<'_, 'm>,
) -> PassOutput {
    let task = schema.task;
    let mut session = PassSession::new(task, source, config.overwrite_existing, sink);
    let mut usage = Vec::new();

    if schema.is_empty() {
        debug!(%task, "nothing to generate");
        return session.close(usage, None);
    }

    for (batch_index, batch) in schema.batches(config.max_nodes_per_request).into_iter().enumerate() {
        let request = GenerationRequest {
            task,
            source: session.text().to_string(),
            schema: batch.to_json(),
            streaming: config.streaming,
            batch_index,
        };
        debug!(%task, batch_index, fields = batch.field_count(), "requesting generation");
        session.begin(batch);

        if let Err(e) = drive(&mut session, generator, &request, config.streaming, &mut usage, apply) {
            warn!(%task, batch_index, error = %e, "generation failed; aborting pass");
            return session.close(usage, Some(e));
        }
    }
    session.close(usage, None)
}

fn drive<'m>(
    session: &mut PassSession<'_, 'm>,
    generator: &mut dyn Generator,
    request: &GenerationRequest,
    streaming: bool,
    usage: &mut Vec<UsageRecord>,
    apply: &mut FieldApplier<'_, 'm>,
) -> Result<(), GenerationError> {
    let mut whole = String::new();
    for chunk in generator.generate(request)? {
        match chunk? {
            StreamChunk::Delta(text) if streaming => session.feed(&text, apply),
            StreamChunk::Delta(text) => whole.push_str(&text),
            StreamChunk::Usage(record) => usage.push(record),
        }
    }
    if !streaming {
        session.feed(&whole, apply);
    }
    session.finish(apply);
    Ok(())
}

// ============================================================================
// Test support
// ============================================================================

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::generation::ChunkStream;

    /// Replays scripted responses, one per request, split into fixed-size
    /// deltas.
    pub struct Scripted {
        pub responses: Vec<Result<String, GenerationError>>,
        pub chunk_size: usize,
        pub requests: Vec<GenerationRequest>,
    }

    impl Scripted {
        pub fn new<S: Into<String>>(responses: impl IntoIterator<Item = S>) -> Self {
            Scripted {
                responses: responses.into_iter().map(|s| Ok(s.into())).collect(),
                chunk_size: 3,
                requests: Vec::new(),
            }
        }
    }

    impl Generator for Scripted {
        fn generate(&mut self, request: &GenerationRequest) -> Result<ChunkStream<'_>, GenerationError> {
            self.requests.push(request.clone());
            if self.responses.is_empty() {
                return Err(GenerationError::new("no scripted response left"));
            }
            let text = self.responses.remove(0)?;
            let chars: Vec<char> = text.chars().collect();
            let chunks: Vec<Result<StreamChunk, GenerationError>> = chars
                .chunks(self.chunk_size.max(1))
                .map(|c| Ok(StreamChunk::Delta(c.iter().collect())))
                .collect();
            Ok(Box::new(chunks.into_iter()))
        }
    }
}
