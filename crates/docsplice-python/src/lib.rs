//! Python support for docsplice.
//!
//! This crate fills Python source with generated annotations, docstrings and
//! comments. It includes:
//! - A tokenizer and outline parser yielding exact positions
//! - Target collection and the per-pass field schemas
//! - The fragment splicer and the streaming assembler
//! - `typing` import maintenance
//! - The three passes and the document pipeline

pub mod assembler;
pub mod config;
pub mod error;
pub mod events;
pub mod generation;
pub mod indent;
pub mod outline;
pub mod passes;
pub mod pipeline;
pub mod schema;
pub mod splice;
pub mod targets;
pub mod tokenizer;
pub mod typing_imports;

pub use assembler::{AssemblerState, FieldEmission, StreamingAssembler};
pub use config::EngineConfig;
pub use error::{EngineError, EngineResult, ParseError, StructuralError};
pub use events::{EventSink, NullSink, PassEvent};
pub use generation::{
    AnnotationRepair, ChunkStream, GenerationError, GenerationRequest, Generator, NoRepair, StreamChunk, Task,
    UsageRecord,
};
pub use outline::{parse_module, Module};
pub use passes::{apply_argument_annotations, apply_comments, apply_docstrings, AnnotationPassOutput, PassOutput};
pub use pipeline::{check_source, document, DocumentOutput};
pub use schema::{FieldKey, FieldSchema};
pub use splice::{splice, SpliceOptions, SpliceOutcome, SpliceTarget};
pub use targets::TargetNodes;
