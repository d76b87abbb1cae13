//! The annotation pass.
//!
//! Annotations are requested per function, method and attribute-only class.
//! A value with unbalanced brackets is offered to the repair collaborator;
//! if repair fails the field is dropped. Every applied annotation
//! contributes the `typing` names it references to `required_imports`.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use docsplice_core::{SpliceBuffer, SpliceResult};

use crate::config::EngineConfig;
use crate::events::EventSink;
use crate::generation::{brackets_balanced, AnnotationRepair, GenerationError, Generator, UsageRecord};
use crate::passes::{run_pass, PassOutput, PassStats};
use crate::schema::{Field, FieldSchema};
use crate::splice::{splice, SkipReason, SpliceOutcome};
use crate::targets::TargetNodes;
use crate::typing_imports::required_typing_names;

/// Result of the annotation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationPassOutput {
    pub buffer: String,
    /// `typing` names referenced by applied annotations.
    pub required_imports: BTreeSet<String>,
    pub usage: Vec<UsageRecord>,
    pub aborted: bool,
    pub error: Option<GenerationError>,
    pub stats: PassStats,
}

/// Fill argument and return annotations for `targets`, which must come from
/// parsing `source`.
pub fn apply_argument_annotations(
    source: &str,
    targets: &TargetNodes<'_>,
    config: &EngineConfig,
    generator: &mut dyn Generator,
    repair: &mut dyn AnnotationRepair,
    sink: &mut dyn EventSink,
) -> AnnotationPassOutput {
    let schema = FieldSchema::annotations(targets, config.overwrite_existing);
    let options = config.splice_options(source);
    let mut required_imports = BTreeSet::new();

    let mut apply = |buffer: &mut SpliceBuffer, field: &Field<'_>, value: &str| -> SpliceResult<SpliceOutcome> {
        let Some(value) = repaired(value, field, &mut *repair) else {
            return Ok(SpliceOutcome::Skipped(SkipReason::InvalidValue));
        };
        let outcome = splice(buffer, &field.target, &value, &options)?;
        if outcome == SpliceOutcome::Applied {
            required_imports.extend(required_typing_names(&value).into_iter().map(str::to_string));
        }
        Ok(outcome)
    };

    let PassOutput {
        buffer,
        usage,
        aborted,
        error,
        stats,
    } = run_pass(source, schema, config, generator, sink, &mut apply);

    AnnotationPassOutput {
        buffer,
        required_imports,
        usage,
        aborted,
        error,
        stats,
    }
}

fn repaired(value: &str, field: &Field<'_>, repair: &mut dyn AnnotationRepair) -> Option<String> {
    let trimmed = value.trim();
    if brackets_balanced(trimmed) {
        return Some(trimmed.to_string());
    }
    match repair.repair(trimmed) {
        Some(fixed) if brackets_balanced(fixed.trim()) => {
            debug!(key = %field.key, from = trimmed, to = %fixed, "annotation repaired");
            Some(fixed.trim().to_string())
        }
        _ => {
            warn!(key = %field.key, value = trimmed, "unbalanced annotation could not be repaired; dropping");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::PassEvent;
    use crate::generation::NoRepair;
    use crate::outline::parse_module;
    use crate::passes::testing::Scripted;

    fn run(source: &str, response: &str, config: &EngineConfig) -> AnnotationPassOutput {
        let module = parse_module(source).unwrap();
        let targets = TargetNodes::collect(&module).unwrap();
        let mut generator = Scripted::new([response]);
        let mut events: Vec<PassEvent> = Vec::new();
        apply_argument_annotations(source, &targets, config, &mut generator, &mut NoRepair, &mut events)
    }

    #[test]
    fn scenario_order_independent() {
        let config = EngineConfig::default();
        let source = "def f(x, y=1): pass\n";
        for response in [
            r#"{"FunctionF": {"x": "str", "y": "int", "returns": "int"}}"#,
            r#"{"FunctionF": {"returns": "int", "y": "int", "x": "str"}}"#,
            r#"{"FunctionF": {"y": "int", "returns": "int", "x": "str"}}"#,
        ] {
            let out = run(source, response, &config);
            assert_eq!(out.buffer, "def f(x: str, y: int=1) -> int: pass\n");
            assert_eq!(out.stats.applied, 3);
        }
    }

    #[test]
    fn required_imports_reported() {
        let out = run(
            "def f(x): pass\n",
            r#"{"FunctionF": {"x": "dict[str, Any]", "returns": "Optional[int]"}}"#,
            &EngineConfig::default(),
        );
        assert_eq!(out.buffer, "def f(x: dict[str, Any]) -> Optional[int]: pass\n");
        assert_eq!(
            out.required_imports.into_iter().collect::<Vec<_>>(),
            vec!["Any", "Optional"]
        );
    }

    #[test]
    fn unbalanced_value_repaired_or_dropped() {
        let source = "def f(x, y): pass\n";
        let module = parse_module(source).unwrap();
        let targets = TargetNodes::collect(&module).unwrap();
        let mut generator =
            Scripted::new([r#"{"FunctionF": {"x": "list[int", "y": "dict[str", "returns": "None"}}"#]);
        let mut repair = |s: &str| (s == "list[int").then(|| "list[int]".to_string());
        let mut events: Vec<PassEvent> = Vec::new();
        let out = apply_argument_annotations(
            source,
            &targets,
            &EngineConfig::default(),
            &mut generator,
            &mut repair,
            &mut events,
        );
        assert_eq!(out.buffer, "def f(x: list[int], y) -> None: pass\n");
        assert_eq!(out.stats.skipped, 1);
        assert_eq!(events.iter().filter(|e| !e.is_final()).count(), 2);
        assert_eq!(events.last().map(PassEvent::buffer), Some(out.buffer.as_str()));
    }

    #[test]
    fn values_that_would_change_code_skipped_while_siblings_apply() {
        let source = "def f(x, y): pass\n";
        for bad in ["int:", "int, z", "int = 5"] {
            let response = format!(r#"{{"FunctionF": {{"x": "{bad}", "y": "str", "returns": "None"}}}}"#);
            let out = run(source, &response, &EngineConfig::default());
            assert_eq!(out.buffer, "def f(x, y: str) -> None: pass\n", "{bad}");
            assert_eq!(out.stats.applied, 2);
            assert_eq!(out.stats.skipped, 1);
            assert!(!out.aborted);
            assert!(parse_module(&out.buffer).is_ok());
        }
    }

    #[test]
    fn generator_failure_aborts_with_partial_buffer() {
        let source = "def a(x): pass\ndef b(y): pass\n";
        let module = parse_module(source).unwrap();
        let targets = TargetNodes::collect(&module).unwrap();
        let config = EngineConfig {
            max_nodes_per_request: 1,
            ..EngineConfig::default()
        };
        let mut generator = Scripted::new([r#"{"FunctionA": {"x": "int", "returns": "None"}}"#]);
        let mut events: Vec<PassEvent> = Vec::new();
        let out = apply_argument_annotations(source, &targets, &config, &mut generator, &mut NoRepair, &mut events);
        assert!(out.aborted);
        assert_eq!(out.buffer, "def a(x: int) -> None: pass\ndef b(y): pass\n");
        assert_eq!(generator.requests.len(), 2);
        assert_eq!(generator.requests[1].source, out.buffer);
        assert!(matches!(events.last(), Some(PassEvent::Final { aborted: true, .. })));
    }

    #[test]
    fn existing_annotations_kept_without_overwrite() {
        let source = "def f(x: int) -> int: pass\n";
        let module = parse_module(source).unwrap();
        let targets = TargetNodes::collect(&module).unwrap();
        let mut generator = Scripted::new(Vec::<String>::new());
        let mut events: Vec<PassEvent> = Vec::new();
        let out = apply_argument_annotations(
            source,
            &targets,
            &EngineConfig::default(),
            &mut generator,
            &mut NoRepair,
            &mut events,
        );
        assert_eq!(out.buffer, source);
        assert!(!out.aborted);
        assert!(generator.requests.is_empty());
    }

    #[test]
    fn overwrite_replaces_existing() {
        let config = EngineConfig::default().with_overwrite(true);
        let out = run(
            "def f(x: int) -> (int): pass\n",
            r#"{"FunctionF": {"x": "float", "returns": "float"}}"#,
            &config,
        );
        assert_eq!(out.buffer, "def f(x: float) -> float: pass\n");
    }
}
