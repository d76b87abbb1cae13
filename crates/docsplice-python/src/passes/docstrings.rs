//! The docstring pass.

use docsplice_core::{SpliceBuffer, SpliceResult};

use crate::config::EngineConfig;
use crate::events::EventSink;
use crate::generation::Generator;
use crate::passes::{run_pass, PassOutput};
use crate::schema::{Field, FieldSchema};
use crate::splice::{splice, SpliceOutcome};
use crate::targets::TargetNodes;

/// Write docstrings for `targets`, which must come from parsing `source`.
pub fn apply_docstrings(
    source: &str,
    targets: &TargetNodes<'_>,
    config: &EngineConfig,
    generator: &mut dyn Generator,
    sink: &mut dyn EventSink,
) -> PassOutput {
    let schema = FieldSchema::docstrings(targets, config.overwrite_existing);
    let options = config.splice_options(source);
    let mut apply = |buffer: &mut SpliceBuffer, field: &Field<'_>, value: &str| -> SpliceResult<SpliceOutcome> {
        splice(buffer, &field.target, value, &options)
    };
    run_pass(source, schema, config, generator, sink, &mut apply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::PassEvent;
    use crate::outline::parse_module;
    use crate::passes::testing::Scripted;

    fn run(source: &str, response: &str, config: &EngineConfig) -> (PassOutput, Scripted) {
        let module = parse_module(source).unwrap();
        let targets = TargetNodes::collect(&module).unwrap();
        let mut generator = Scripted::new([response]);
        let mut events: Vec<PassEvent> = Vec::new();
        let out = apply_docstrings(source, &targets, config, &mut generator, &mut events);
        (out, generator)
    }

    #[test]
    fn documents_functions_classes_and_methods() {
        let source = "\
def load(path):
    return open(path)

class Store:
    def __init__(self):
        self.items = []

    def add(self, item): self.items.append(item)
";
        let response = r#"{
            "function_load": "Open a file.",
            "class_Store": "A bag of items.\n\nKept in memory.",
            "class_Store_method_add": "Add an item."
        }"#;
        let (out, generator) = run(source, response, &EngineConfig::default());
        assert_eq!(
            out.buffer,
            "\
def load(path):
    \"\"\"Open a file.\"\"\"
    return open(path)

class Store:
    \"\"\"A bag of items.

    Kept in memory.
    \"\"\"
    def __init__(self):
        self.items = []

    def add(self, item):
        \"\"\"Add an item.\"\"\"
        self.items.append(item)
"
        );
        assert_eq!(out.stats.applied, 3);
        parse_module(&out.buffer).unwrap();

        let schema = &generator.requests[0].schema;
        assert_eq!(schema["title"], "DocstringModel");
        assert!(schema["properties"].get("class_Store_method___init__").is_none());
    }

    #[test]
    fn existing_docstring_untouched_without_overwrite() {
        let source = "def f():\n    \"\"\"Old.\"\"\"\n    pass\n";
        let module = parse_module(source).unwrap();
        let targets = TargetNodes::collect(&module).unwrap();
        let mut generator = Scripted::new(Vec::<String>::new());
        let out = apply_docstrings(source, &targets, &EngineConfig::default(), &mut generator, &mut Vec::<PassEvent>::new());
        assert_eq!(out.buffer, source);
        assert!(generator.requests.is_empty());
    }

    #[test]
    fn existing_docstring_replaced_with_overwrite() {
        let source = "def f():\n    \"\"\"Old.\"\"\"\n    pass\n";
        let config = EngineConfig::default().with_overwrite(true);
        let (out, _) = run(source, r#"{"function_f": "New."}"#, &config);
        assert_eq!(out.buffer, "def f():\n    \"\"\"New.\"\"\"\n    pass\n");
    }

    #[test]
    fn non_streaming_gives_same_result() {
        let source = "def f():\n    pass\n";
        let config = EngineConfig::default().with_streaming(false);
        let (out, generator) = run(source, r#"{"function_f": "Do nothing."}"#, &config);
        assert_eq!(out.buffer, "def f():\n    \"\"\"Do nothing.\"\"\"\n    pass\n");
        assert!(!generator.requests[0].streaming);
    }
}
