//! docsplice: splice generated annotations, docstrings and comments into
//! Python source.
//!
//! The engine lives in the workspace crates:
//! - `docsplice-core` - positions, shift tracking, edits
//! - `docsplice-python` - parsing, schemas, splicing, passes
//!
//! This crate is the front door: CLI commands, JSON responses, replay of
//! recorded generator output, and the async stream driver.

pub mod cli;
pub mod error;
pub mod output;
pub mod replay;
pub mod stream;
