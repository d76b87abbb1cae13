//! The comment pass.
//!
//! Every code line gets a `lineN` field. Existing comments above a line and
//! its inline comment are offered as the field's default; with overwrite on
//! they are replaced, and an empty value removes them.

use docsplice_core::{SpliceBuffer, SpliceResult};

use crate::config::EngineConfig;
use crate::error::ParseResult;
use crate::events::EventSink;
use crate::generation::Generator;
use crate::outline::parse_module;
use crate::passes::{run_pass, PassOutput};
use crate::schema::{Field, FieldSchema};
use crate::splice::{splice, SpliceOutcome};

/// Write line comments into `source`.
pub fn apply_comments(
    source: &str,
    config: &EngineConfig,
    generator: &mut dyn Generator,
    sink: &mut dyn EventSink,
) -> ParseResult<PassOutput> {
    let module = parse_module(source)?;
    let schema = FieldSchema::comments(&module);
    let options = config.splice_options(source);
    let mut apply = |buffer: &mut SpliceBuffer, field: &Field<'_>, value: &str| -> SpliceResult<SpliceOutcome> {
        splice(buffer, &field.target, value, &options)
    };
    Ok(run_pass(source, schema, config, generator, sink, &mut apply))
}
