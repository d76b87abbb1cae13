//! End-to-end properties of the splicing engine.
//!
//! # Organization
//!
//! - Scenarios: small documents with exact expected output
//! - Properties: non-destructive splicing, idempotence of no-op runs, shift
//!   correctness against re-parsing, parseability of every pass's output
//!
//! Generators here answer from the request's field schema, so the tests do
//! not depend on hand-written keys for larger documents.

use docsplice_python::tokenizer::{tokenize, TokenKind};
use docsplice_python::{
    apply_argument_annotations, apply_docstrings, document, parse_module, ChunkStream, EngineConfig, FieldKey,
    GenerationError, GenerationRequest, Generator, NoRepair, PassEvent, StreamChunk, StreamingAssembler, Task,
    TargetNodes,
};
use serde_json::{Map, Value};

// ============================================================================
// Test Generators
// ============================================================================

/// Replays fixed responses in order, in chunks of `chunk` characters.
struct Replay {
    responses: Vec<String>,
    chunk: usize,
}

impl Replay {
    fn new(responses: &[&str]) -> Self {
        Replay {
            responses: responses.iter().map(|s| s.to_string()).collect(),
            chunk: 1,
        }
    }
}

fn chunked(text: &str, size: usize) -> ChunkStream<'static> {
    let chars: Vec<char> = text.chars().collect();
    let chunks: Vec<Result<StreamChunk, GenerationError>> = chars
        .chunks(size.max(1))
        .map(|c| Ok(StreamChunk::Delta(c.iter().collect())))
        .collect();
    Box::new(chunks.into_iter())
}

impl Generator for Replay {
    fn generate(&mut self, _request: &GenerationRequest) -> Result<ChunkStream<'_>, GenerationError> {
        if self.responses.is_empty() {
            return Err(GenerationError::new("no response left"));
        }
        let text = self.responses.remove(0);
        Ok(chunked(&text, self.chunk))
    }
}

/// Fills every field of every request from `fill(task, key)`.
struct Filler {
    fill: fn(Task, &str) -> String,
    requests: usize,
}

impl Filler {
    fn new(fill: fn(Task, &str) -> String) -> Self {
        Filler { fill, requests: 0 }
    }

    fn answer(&self, task: Task, properties: &Map<String, Value>) -> Value {
        let mut out = Map::new();
        for (key, schema) in properties {
            let value = match schema.get("properties").and_then(Value::as_object) {
                Some(inner) => self.answer(task, inner),
                None => Value::String((self.fill)(task, key)),
            };
            out.insert(key.clone(), value);
        }
        Value::Object(out)
    }
}

impl Generator for Filler {
    fn generate(&mut self, request: &GenerationRequest) -> Result<ChunkStream<'_>, GenerationError> {
        self.requests += 1;
        let properties = request.schema["properties"]
            .as_object()
            .ok_or_else(|| GenerationError::new("schema without properties"))?;
        let text = self.answer(request.task, properties).to_string();
        Ok(chunked(&text, 7))
    }
}

fn fill_all(task: Task, _key: &str) -> String {
    match task {
        Task::Annotations => "int".to_string(),
        Task::Docstrings => "Documented.".to_string(),
        Task::Comments => "note".to_string(),
    }
}

const INVENTORY: &str = r#""""Inventory helpers."""
import json

TAX = 0.2  # flat rate


def total(prices, rate=TAX):
    return sum(prices) * (1 + rate)


class Basket:
    owner = None

    def add(self, item, qty=1): self.items.append((item, qty))

    @staticmethod
    def load(path):
        with open(path) as fh:
            return json.load(fh)


async def fetch(url, *args, retries=3, **kwargs):
    """Already documented."""
    data = [
        url,
        retries,
    ]
    return data
"#;

fn code_tokens(source: &str) -> Vec<(TokenKind, String)> {
    tokenize(source)
        .unwrap()
        .tokens
        .into_iter()
        .filter(|t| matches!(t.kind, TokenKind::Name | TokenKind::Number | TokenKind::Op | TokenKind::String))
        .map(|t| (t.kind, t.text.to_string()))
        .collect()
}

fn is_subsequence<T: PartialEq>(needle: &[T], haystack: &[T]) -> bool {
    let mut rest = haystack.iter();
    needle.iter().all(|n| rest.any(|h| h == n))
}

// ============================================================================
// Scenarios
// ============================================================================

mod scenarios {
    use super::*;

    #[test]
    fn return_and_arguments_in_any_order() {
        let source = "def f(x, y=1): pass\n";
        let fields = [r#""x": "str""#, r#""y": "int""#, r#""returns": "int""#];
        let orders = [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];
        for order in orders {
            let body: Vec<&str> = order.iter().map(|&i| fields[i]).collect();
            let response = format!(r#"{{"FunctionF": {{{}}}}}"#, body.join(", "));
            let module = parse_module(source).unwrap();
            let targets = TargetNodes::collect(&module).unwrap();
            let out = apply_argument_annotations(
                source,
                &targets,
                &EngineConfig::default(),
                &mut Replay::new(&[response.as_str()]),
                &mut NoRepair,
                &mut Vec::<PassEvent>::new(),
            );
            assert_eq!(out.buffer, "def f(x: str, y: int=1) -> int: pass\n", "order {order:?}");
        }
    }

    #[test]
    fn existing_docstring_kept_without_overwrite() {
        let source = "def f():\n    \"\"\"Keep me.\"\"\"\n    return 1\n";
        let module = parse_module(source).unwrap();
        let targets = TargetNodes::collect(&module).unwrap();
        let mut generator = Filler::new(fill_all);
        let out = apply_docstrings(
            source,
            &targets,
            &EngineConfig::default(),
            &mut generator,
            &mut Vec::<PassEvent>::new(),
        );
        assert_eq!(out.buffer, source);
        assert_eq!(generator.requests, 0);
    }

    #[test]
    fn comment_above_statement() {
        let config = EngineConfig::default().only(false, false, true);
        let out = document(
            "x = compute()\n",
            &config,
            &mut Replay::new(&[r#"{"line1": "computes the result"}"#]),
            &mut NoRepair,
            &mut Vec::<PassEvent>::new(),
        )
        .unwrap();
        assert_eq!(out.buffer, "# computes the result\nx = compute()\n");
    }

    #[test]
    fn any_reported_as_required_import() {
        let source = "def f(x): pass\n";
        let module = parse_module(source).unwrap();
        let targets = TargetNodes::collect(&module).unwrap();
        let out = apply_argument_annotations(
            source,
            &targets,
            &EngineConfig::default(),
            &mut Replay::new(&[r#"{"FunctionF": {"x": "dict[str, Any]"}}"#]),
            &mut NoRepair,
            &mut Vec::<PassEvent>::new(),
        );
        assert_eq!(out.buffer, "def f(x: dict[str, Any]): pass\n");
        assert!(out.required_imports.contains("Any"));
    }

    #[test]
    fn byte_by_byte_two_completions() {
        let mut asm = StreamingAssembler::new([(FieldKey::flat("a"), false), (FieldKey::flat("b"), false)], false);
        let mut completions = 0;
        for byte in r#"{"a": "int", "b": "str"}"#.chars() {
            completions += asm.feed(&byte.to_string()).len();
        }
        completions += asm.finish().len();
        assert_eq!(completions, 2);
    }
}

// ============================================================================
// Properties
// ============================================================================

mod properties {
    use super::*;

    fn run_all(source: &str) -> String {
        let mut generator = Filler::new(fill_all);
        document(
            source,
            &EngineConfig::default(),
            &mut generator,
            &mut NoRepair,
            &mut Vec::<PassEvent>::new(),
        )
        .unwrap()
        .buffer
    }

    #[test]
    fn original_tokens_survive_in_order() {
        let output = run_all(INVENTORY);
        assert!(is_subsequence(&code_tokens(INVENTORY), &code_tokens(&output)));
    }

    #[test]
    fn every_pass_output_parses() {
        let mut events: Vec<PassEvent> = Vec::new();
        let out = document(
            INVENTORY,
            &EngineConfig::default(),
            &mut Filler::new(fill_all),
            &mut NoRepair,
            &mut events,
        )
        .unwrap();
        for event in events.iter().filter(|e| e.is_final()) {
            parse_module(event.buffer()).unwrap();
        }
        assert!(out.buffer.contains("def total(prices: int, rate: int=TAX) -> int:"));
        assert!(out.buffer.contains("    owner: int = None"));
        assert!(out.buffer.contains("    def add(self, item: int, qty: int=1) -> int:"));
        assert!(out.buffer.contains("    def load(path: int) -> int:"));
        assert!(out.buffer.contains("async def fetch(url: int, *args: int, retries: int=3, **kwargs: int) -> int:"));
        assert!(out.buffer.contains("    \"\"\"Already documented.\"\"\""));
        assert!(out.required_imports.is_empty());
    }

    #[test]
    fn second_run_changes_nothing() {
        let once = run_all(INVENTORY);
        let mut generator = Filler::new(fill_all);
        let twice = document(
            &once,
            &EngineConfig::default(),
            &mut generator,
            &mut NoRepair,
            &mut Vec::<PassEvent>::new(),
        )
        .unwrap();
        assert_eq!(twice.buffer, once);
        assert_eq!(twice.passes.iter().map(|p| p.stats.applied).sum::<usize>(), 0);
    }

    #[test]
    fn incremental_shift_matches_reparsing() {
        let source = "def f(a, b=(1, 2), *c, d: int = 0, **e): pass\n";
        let fields = [
            ("a", r#""a": "str""#),
            ("b", r#""b": "tuple[int, int]""#),
            ("c", r#""c": "float""#),
            ("e", r#""e": "bytes""#),
            ("returns", r#""returns": "None""#),
        ];
        let config = EngineConfig::default();
        let orders: [[usize; 5]; 4] = [[0, 1, 2, 3, 4], [4, 3, 2, 1, 0], [2, 4, 0, 3, 1], [1, 3, 0, 4, 2]];

        for order in orders {
            // One pass, all fields against the original outline.
            let body: Vec<&str> = order.iter().map(|&i| fields[i].1).collect();
            let response = format!(r#"{{"FunctionF": {{{}}}}}"#, body.join(", "));
            let module = parse_module(source).unwrap();
            let targets = TargetNodes::collect(&module).unwrap();
            let incremental = apply_argument_annotations(
                source,
                &targets,
                &config,
                &mut Replay::new(&[response.as_str()]),
                &mut NoRepair,
                &mut Vec::<PassEvent>::new(),
            )
            .buffer;

            // One field per pass, re-parsing in between.
            let mut reparsed = source.to_string();
            for &i in &order {
                let response = format!(r#"{{"FunctionF": {{{}}}}}"#, fields[i].1);
                let module = parse_module(&reparsed).unwrap();
                let targets = TargetNodes::collect(&module).unwrap();
                reparsed = apply_argument_annotations(
                    &reparsed,
                    &targets,
                    &config,
                    &mut Replay::new(&[response.as_str()]),
                    &mut NoRepair,
                    &mut Vec::<PassEvent>::new(),
                )
                .buffer;
            }

            assert_eq!(incremental, reparsed, "order {order:?}");
            assert_eq!(
                incremental,
                "def f(a: str, b: tuple[int, int]=(1, 2), *c: float, d: int = 0, **e: bytes) -> None: pass\n"
            );
        }
    }

    #[test]
    fn docstring_and_comment_passes_keep_code_tokens_identical() {
        let config = EngineConfig::default().only(false, true, true);
        let out = document(
            INVENTORY,
            &config,
            &mut Filler::new(fill_all),
            &mut NoRepair,
            &mut Vec::<PassEvent>::new(),
        )
        .unwrap();
        let strip = |tokens: Vec<(TokenKind, String)>| -> Vec<(TokenKind, String)> {
            tokens
                .into_iter()
                .filter(|(kind, text)| !(*kind == TokenKind::String && text.starts_with("\"\"\"")))
                .collect()
        };
        assert_eq!(strip(code_tokens(INVENTORY)), strip(code_tokens(&out.buffer)));
    }
}
