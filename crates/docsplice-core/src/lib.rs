//! Core infrastructure for docsplice.
//!
//! This crate provides the language-agnostic half of the splicing engine:
//! - Spans and original-source positions
//! - Text utilities over the live buffer
//! - Shift state: the journal of splices applied during one pass
//! - Position resolution from original coordinates into the live buffer
//! - Splice primitives that mutate a buffer and keep its shift state current
//! - Error types for splice-computation failures

pub mod edit;
pub mod error;
pub mod resolve;
pub mod shift;
pub mod span;
pub mod text;

pub use edit::{AppliedSplice, EditPrimitive, SpliceBuffer};
pub use error::{SpliceError, SpliceResult};
pub use resolve::{resolve, resolve_with_bias, Bias};
pub use shift::ShiftState;
pub use span::{Position, Span};
