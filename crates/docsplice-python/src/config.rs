//! Engine configuration.
//!
//! Every engine invocation receives an explicit [`EngineConfig`]. It can be
//! deserialized from JSON; missing fields take their defaults.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::indent::indent_unit;
use crate::splice::SpliceOptions;

/// Default number of annotation groups per generation request.
pub const DEFAULT_MAX_NODES_PER_REQUEST: usize = 15;

/// Configuration for one document run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Replace existing annotations, docstrings and comments.
    pub overwrite_existing: bool,
    /// Accept `Any` as an annotation.
    pub annotate_with_any: bool,
    /// Consume generator output incrementally.
    pub streaming: bool,
    /// Annotation groups per generation request.
    pub max_nodes_per_request: usize,
    pub write_annotations: bool,
    pub write_docstrings: bool,
    pub write_comments: bool,
    /// Indentation unit for new docstring blocks. Detected from the source
    /// when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indent_unit: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            overwrite_existing: false,
            annotate_with_any: false,
            streaming: true,
            max_nodes_per_request: DEFAULT_MAX_NODES_PER_REQUEST,
            write_annotations: true,
            write_docstrings: true,
            write_comments: true,
            indent_unit: None,
        }
    }
}

impl EngineConfig {
    /// Parse a JSON configuration document.
    pub fn from_json(text: &str) -> EngineResult<Self> {
        let config: EngineConfig =
            serde_json::from_str(text).map_err(|e| EngineError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no pass can work with.
    pub fn validate(&self) -> EngineResult<()> {
        if self.max_nodes_per_request == 0 {
            return Err(EngineError::InvalidConfig(
                "max_nodes_per_request must be at least 1".into(),
            ));
        }
        if let Some(unit) = &self.indent_unit {
            let spaces = !unit.is_empty() && unit.bytes().all(|b| b == b' ');
            if !(spaces || unit == "\t") {
                return Err(EngineError::InvalidConfig(format!(
                    "indent_unit must be spaces or a single tab, got {unit:?}"
                )));
            }
        }
        Ok(())
    }

    /// Splicer settings for a pass over `source`.
    pub fn splice_options(&self, source: &str) -> SpliceOptions {
        SpliceOptions {
            overwrite: self.overwrite_existing,
            annotate_with_any: self.annotate_with_any,
            indent_unit: indent_unit(source, self.indent_unit.as_deref()),
        }
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite_existing = overwrite;
        self
    }

    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    /// Enable only the given passes.
    pub fn only(mut self, annotations: bool, docstrings: bool, comments: bool) -> Self {
        self.write_annotations = annotations;
        self.write_docstrings = docstrings;
        self.write_comments = comments;
        self
    }
}
