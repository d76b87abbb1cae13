//! The fragment splicer.
//!
//! [`splice`] turns a completed field value and its [`SpliceTarget`] into
//! edit primitives against the original outline, then applies them to the
//! pass's [`SpliceBuffer`]. Positions always come from the outline the pass
//! was started with; the buffer's shift state maps them into the live text.
//!
//! Only annotation expressions, docstring literals, comments and whitespace
//! are written or removed. Every other token keeps its text and order.

use docsplice_core::{EditPrimitive, Position, SpliceBuffer, SpliceResult};
use tracing::debug;

use crate::generation::brackets_balanced;
use crate::outline::{stray_expression_token, AnnotationSite, BlockHeader, Body, CommentSlot, FunctionDef};
use crate::tokenizer::{tokenize, TokenKind};

// ============================================================================
// Targets and Outcomes
// ============================================================================

/// The syntactic slot a value is destined for.
#[derive(Debug, Clone, Copy)]
pub enum SpliceTarget<'m> {
    ArgumentAnnotation {
        site: &'m AnnotationSite,
        /// The implicit first parameter of a method.
        is_receiver: bool,
    },
    ReturnAnnotation {
        function: &'m FunctionDef,
    },
    DocstringSlot {
        header: &'m BlockHeader,
    },
    CommentSlot {
        slot: &'m CommentSlot,
    },
}

/// Why a splice left the buffer unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// `self`, `cls`, or the first parameter of a method.
    Receiver,
    /// `Any` without opting in to weak annotations.
    WeakAnnotation,
    /// The slot already has content and overwrite is off.
    ExistingContent,
    EmptyValue,
    InvalidValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpliceOutcome {
    Applied,
    Skipped(SkipReason),
}

/// Splicer settings for one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpliceOptions {
    pub overwrite: bool,
    pub annotate_with_any: bool,
    /// One indentation level, used for bodies that start on the header line.
    pub indent_unit: String,
}

impl Default for SpliceOptions {
    fn default() -> Self {
        SpliceOptions {
            overwrite: false,
            annotate_with_any: false,
            indent_unit: "    ".to_string(),
        }
    }
}

// ============================================================================
// Splice
// ============================================================================

/// Splice `value` into `target`.
///
/// Value problems and occupied slots are reported as
/// [`SpliceOutcome::Skipped`]. An error means the target's span could not be
/// computed consistently against the live buffer; the buffer is unchanged.
pub fn splice(
    buffer: &mut SpliceBuffer,
    target: &SpliceTarget<'_>,
    value: &str,
    options: &SpliceOptions,
) -> SpliceResult<SpliceOutcome> {
    let edits = match plan(buffer, target, value, options)? {
        Ok(edits) => edits,
        Err(reason) => {
            debug!(?reason, "splice skipped");
            return Ok(SpliceOutcome::Skipped(reason));
        }
    };
    buffer.apply_batch(edits)?;
    Ok(SpliceOutcome::Applied)
}

type Plan = Result<Vec<EditPrimitive>, SkipReason>;

fn plan(
    buffer: &SpliceBuffer,
    target: &SpliceTarget<'_>,
    value: &str,
    options: &SpliceOptions,
) -> SpliceResult<Plan> {
    match *target {
        SpliceTarget::ArgumentAnnotation { site, is_receiver } => {
            Ok(plan_argument(site, is_receiver, value, options))
        }
        SpliceTarget::ReturnAnnotation { function } => plan_return(buffer, function, value, options),
        SpliceTarget::DocstringSlot { header } => Ok(plan_docstring(header, value, options)),
        SpliceTarget::CommentSlot { slot } => Ok(plan_comment(slot, value, options)),
    }
}

/// Trim and validate an annotation value.
///
/// The value must be one expression on one line. Anything that would add a
/// parameter, a default or a statement around it is rejected.
pub fn clean_annotation(value: &str) -> Result<&str, SkipReason> {
    let value = value.trim();
    if value.is_empty() {
        return Err(SkipReason::EmptyValue);
    }
    if value.contains(['\n', '\r', '#']) || !brackets_balanced(value) || !is_single_expression(value) {
        return Err(SkipReason::InvalidValue);
    }
    Ok(value)
}

fn is_single_expression(value: &str) -> bool {
    let Ok(stream) = tokenize(value) else {
        return false;
    };
    let code: Vec<_> = stream
        .tokens
        .into_iter()
        .filter(|t| !matches!(t.kind, TokenKind::Newline | TokenKind::EndMarker))
        .collect();
    code.iter().all(|t| t.is_code()) && stray_expression_token(&code).is_none()
}

fn annotation_value<'v>(value: &'v str, options: &SpliceOptions) -> Result<&'v str, SkipReason> {
    let value = clean_annotation(value)?;
    if value == "Any" && !options.annotate_with_any {
        return Err(SkipReason::WeakAnnotation);
    }
    Ok(value)
}

fn plan_argument(site: &AnnotationSite, is_receiver: bool, value: &str, options: &SpliceOptions) -> Plan {
    if is_receiver || site.name == "self" || site.name == "cls" {
        return Err(SkipReason::Receiver);
    }
    let value = annotation_value(value, options)?;

    match &site.annotation {
        None => Ok(vec![EditPrimitive::InsertAt {
            position: site.name_end,
            text: format!(": {value}"),
        }]),
        Some(existing) if !options.overwrite || existing.text == value => {
            Err(SkipReason::ExistingContent)
        }
        Some(existing) => Ok(vec![EditPrimitive::Replace {
            start: existing.start,
            end: existing.end,
            new_text: value.to_string(),
        }]),
    }
}

fn plan_return(
    buffer: &SpliceBuffer,
    function: &FunctionDef,
    value: &str,
    options: &SpliceOptions,
) -> SpliceResult<Plan> {
    let value = match annotation_value(value, options) {
        Ok(v) => v,
        Err(reason) => return Ok(Err(reason)),
    };

    match &function.returns {
        None => {
            let close = function.params_close;
            buffer.expect_text(buffer.resolve(close), ")")?;
            Ok(Ok(vec![EditPrimitive::InsertAt {
                position: Position::new(close.line, close.col + 1),
                text: format!(" -> {value}"),
            }]))
        }
        Some(existing) if !options.overwrite || existing.expr.text == value => {
            Ok(Err(SkipReason::ExistingContent))
        }
        // Covers the whole gap after `->`, so redundant parentheses go too.
        Some(existing) => Ok(Ok(vec![EditPrimitive::Replace {
            start: existing.arrow_end,
            end: existing.expr.end,
            new_text: format!(" {value}"),
        }])),
    }
}

// ============================================================================
// Docstrings
// ============================================================================

/// Replace literal `\n` and `\t` escape sequences with the characters.
pub fn unescape_generated(value: &str) -> String {
    value
        .replace("\\\\n", "\n")
        .replace("\\\\t", "\t")
        .replace("\\n", "\n")
        .replace("\\t", "\t")
}

/// A closing `"` not already escaped by a backslash.
fn ends_with_bare_quote(text: &str) -> bool {
    text.strip_suffix('"')
        .is_some_and(|head| head.bytes().rev().take_while(|&b| b == b'\\').count() % 2 == 0)
}

/// Format `text` as a triple-quoted docstring indented by `indent`.
///
/// The first line shares the opening quotes. Multi-line text closes on its
/// own line; blank lines carry no indentation. Backslashes are doubled so the
/// literal's value is the text as generated.
pub fn docstring_literal(text: &str, indent: &str) -> String {
    let mut escaped = text.replace('\\', "\\\\").replace("\"\"\"", "\\\"\\\"\\\"");
    let lines: Vec<&str> = escaped.lines().collect();
    if lines.len() <= 1 {
        if ends_with_bare_quote(&escaped) {
            escaped.pop();
            escaped.push_str("\\\"");
        }
        return format!("{indent}\"\"\"{escaped}\"\"\"");
    }

    let mut out = format!("{indent}\"\"\"{}", lines[0]);
    for line in &lines[1..] {
        out.push('\n');
        if !line.trim().is_empty() {
            out.push_str(indent);
            out.push_str(line.trim_end());
        }
    }
    out.push('\n');
    out.push_str(indent);
    out.push_str("\"\"\"");
    out
}

fn plan_docstring(header: &BlockHeader, value: &str, options: &SpliceOptions) -> Plan {
    let text = unescape_generated(value);
    let text = text.trim();
    if text.is_empty() {
        return Err(SkipReason::EmptyValue);
    }
    let nested_indent = || format!("{}{}", header.indent, options.indent_unit);

    if let Some(doc) = header.docstring {
        if !options.overwrite {
            return Err(SkipReason::ExistingContent);
        }
        let indent = header.body_indent.clone().unwrap_or_else(nested_indent);
        let literal = docstring_literal(text, &indent);
        return Ok(vec![EditPrimitive::Replace {
            start: doc.start,
            end: doc.end,
            new_text: literal[indent.len()..].to_string(),
        }]);
    }

    match header.body {
        Body::Block { .. } => {
            let indent = header.body_indent.clone().unwrap_or_else(nested_indent);
            Ok(vec![EditPrimitive::InsertAt {
                position: header.line_end,
                text: format!("\n{}", docstring_literal(text, &indent)),
            }])
        }
        Body::Inline { start } => {
            let indent = nested_indent();
            Ok(vec![EditPrimitive::Replace {
                start: Position::new(header.colon.line, header.colon.col + 1),
                end: start,
                new_text: format!("\n{}\n{indent}", docstring_literal(text, &indent)),
            }])
        }
    }
}

// ============================================================================
// Comments
// ============================================================================

/// Comment lines for `text`, each prefixed with `indent` and `# `.
pub fn comment_lines(text: &str, indent: &str) -> String {
    let mut out = String::new();
    for line in text.lines() {
        let line = line.trim_end();
        out.push_str(indent);
        if line.is_empty() {
            out.push('#');
        } else {
            out.push_str("# ");
            out.push_str(line);
        }
        out.push('\n');
    }
    out
}

fn plan_comment(slot: &CommentSlot, value: &str, options: &SpliceOptions) -> Plan {
    let text = unescape_generated(value);
    let text = text.trim();
    let has_existing = slot.block.is_some() || slot.inline.is_some();

    if has_existing && !options.overwrite {
        return Err(SkipReason::ExistingContent);
    }
    if text.is_empty() && !has_existing {
        return Err(SkipReason::EmptyValue);
    }
    if slot.existing.as_deref() == Some(text) {
        return Err(SkipReason::ExistingContent);
    }

    let line_start = Position::new(slot.line, 0);
    let new_lines = comment_lines(text, &slot.indent);
    let mut edits = Vec::new();

    match slot.block {
        Some((first, _)) => edits.push(EditPrimitive::Replace {
            start: Position::new(first, 0),
            end: line_start,
            new_text: new_lines,
        }),
        None if !new_lines.is_empty() => edits.push(EditPrimitive::InsertAt {
            position: line_start,
            text: new_lines,
        }),
        None => {}
    }
    if let Some(inline) = slot.inline {
        edits.push(EditPrimitive::Delete {
            start: Position::new(slot.line, inline.code_end),
            end: Position::new(slot.line, inline.comment_end),
        });
    }
    Ok(edits)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outline::{parse_module, Module};

    fn options() -> SpliceOptions {
        SpliceOptions::default()
    }

    fn overwrite() -> SpliceOptions {
        SpliceOptions {
            overwrite: true,
            ..SpliceOptions::default()
        }
    }

    fn parse(source: &str) -> Module {
        parse_module(source).unwrap()
    }

    mod annotation_tests {
        use super::*;

        #[test]
        fn insert_argument_and_return() {
            let src = "def f(x, y=1): pass\n";
            let m = parse(src);
            let f = m.functions().next().unwrap();
            let mut buffer = SpliceBuffer::new(src);

            let targets = [
                (SpliceTarget::ReturnAnnotation { function: f }, "int"),
                (
                    SpliceTarget::ArgumentAnnotation {
                        site: &f.params[1].site,
                        is_receiver: false,
                    },
                    "int",
                ),
                (
                    SpliceTarget::ArgumentAnnotation {
                        site: &f.params[0].site,
                        is_receiver: false,
                    },
                    "str",
                ),
            ];
            for (target, value) in &targets {
                assert_eq!(
                    splice(&mut buffer, target, value, &options()).unwrap(),
                    SpliceOutcome::Applied
                );
            }
            assert_eq!(buffer.text(), "def f(x: str, y: int=1) -> int: pass\n");
        }

        #[test]
        fn receiver_and_any_skipped() {
            let src = "class A:\n    def m(self, x): ...\n";
            let m = parse(src);
            let method = &m.classes().next().unwrap().methods[0];
            let mut buffer = SpliceBuffer::new(src);

            let receiver = SpliceTarget::ArgumentAnnotation {
                site: &method.params[0].site,
                is_receiver: true,
            };
            assert_eq!(
                splice(&mut buffer, &receiver, "A", &options()).unwrap(),
                SpliceOutcome::Skipped(SkipReason::Receiver)
            );
            let x = SpliceTarget::ArgumentAnnotation {
                site: &method.params[1].site,
                is_receiver: false,
            };
            assert_eq!(
                splice(&mut buffer, &x, "Any", &options()).unwrap(),
                SpliceOutcome::Skipped(SkipReason::WeakAnnotation)
            );
            assert_eq!(buffer.text(), src);

            let weak = SpliceOptions {
                annotate_with_any: true,
                ..options()
            };
            splice(&mut buffer, &x, "Any", &weak).unwrap();
            assert_eq!(buffer.text(), "class A:\n    def m(self, x: Any): ...\n");
        }

        #[test]
        fn existing_annotation_respects_overwrite() {
            let src = "def f(x: dict[\n    str, int\n], y) -> (\n    int\n):\n    return y\n";
            let m = parse(src);
            let f = m.functions().next().unwrap();
            let x = SpliceTarget::ArgumentAnnotation {
                site: &f.params[0].site,
                is_receiver: false,
            };
            let ret = SpliceTarget::ReturnAnnotation { function: f };

            let mut buffer = SpliceBuffer::new(src);
            assert_eq!(
                splice(&mut buffer, &x, "dict[str, float]", &options()).unwrap(),
                SpliceOutcome::Skipped(SkipReason::ExistingContent)
            );
            assert_eq!(buffer.text(), src);

            splice(&mut buffer, &ret, "float", &overwrite()).unwrap();
            splice(&mut buffer, &x, "dict[str, float]", &overwrite()).unwrap();
            let y = SpliceTarget::ArgumentAnnotation {
                site: &f.params[1].site,
                is_receiver: false,
            };
            splice(&mut buffer, &y, "str", &overwrite()).unwrap();
            assert_eq!(
                buffer.text(),
                "def f(x: dict[str, float], y: str) -> float:\n    return y\n"
            );
        }

        #[test]
        fn invalid_values_rejected() {
            assert_eq!(clean_annotation("  int "), Ok("int"));
            assert_eq!(clean_annotation(""), Err(SkipReason::EmptyValue));
            assert_eq!(clean_annotation("int  # why"), Err(SkipReason::InvalidValue));
            assert_eq!(clean_annotation("list[int"), Err(SkipReason::InvalidValue));
            assert_eq!(clean_annotation("int\nstr"), Err(SkipReason::InvalidValue));
        }

        #[test]
        fn values_that_change_surrounding_code_rejected() {
            for value in ["int:", "int, z", "int = 5", "int; x", "x := 1", "int -> str", "return int", "int +="] {
                assert_eq!(clean_annotation(value), Err(SkipReason::InvalidValue), "{value}");
            }
            for value in [
                "dict[str, int]",
                "Callable[[int], str]",
                "Literal['a', 'b']",
                "int | None",
                "tuple[int, ...]",
                "lambda: int",
            ] {
                assert_eq!(clean_annotation(value), Ok(value), "{value}");
            }
        }

        #[test]
        fn required_import_value_spliced_verbatim() {
            let src = "def f(x): ...\n";
            let m = parse(src);
            let f = m.functions().next().unwrap();
            let mut buffer = SpliceBuffer::new(src);
            let x = SpliceTarget::ArgumentAnnotation {
                site: &f.params[0].site,
                is_receiver: false,
            };
            splice(&mut buffer, &x, "dict[str, Any]", &options()).unwrap();
            assert_eq!(buffer.text(), "def f(x: dict[str, Any]): ...\n");
        }
    }

    mod docstring_tests {
        use super::*;

        #[test]
        fn literal_formats() {
            assert_eq!(docstring_literal("One line.", "    "), "    \"\"\"One line.\"\"\"");
            assert_eq!(
                docstring_literal("Summary.\n\nArgs:\n    x: thing.", "  "),
                "  \"\"\"Summary.\n\n  Args:\n      x: thing.\n  \"\"\""
            );
            assert_eq!(
                docstring_literal("Say \"\"\"hi\"\"\"", ""),
                "\"\"\"Say \\\"\\\"\\\"hi\\\"\\\"\\\"\"\"\""
            );
            assert_eq!(docstring_literal("Ends \"x\"", ""), "\"\"\"Ends \"x\\\"\"\"\"");
        }

        #[test]
        fn backslashes_doubled() {
            assert_eq!(
                docstring_literal(r"Match \N and \x here.", ""),
                r#""""Match \\N and \\x here.""""#
            );
            assert_eq!(docstring_literal(r"Ends in C:\", ""), r#""""Ends in C:\\""""#);
            assert_eq!(docstring_literal(r#"Quote \""#, ""), r#""""Quote \\\"""""#);
        }

        #[test]
        fn escape_sequences_stay_literal_in_module() {
            let src = "def f():\n    return 1\n";
            let m = parse(src);
            let header = &m.functions().next().unwrap().header;
            let mut buffer = SpliceBuffer::new(src);
            splice(&mut buffer, &SpliceTarget::DocstringSlot { header }, r"Match \N and \x here.", &options())
                .unwrap();
            assert_eq!(
                buffer.text(),
                "def f():\n    \"\"\"Match \\\\N and \\\\x here.\"\"\"\n    return 1\n"
            );
            assert!(parse_module(buffer.text()).is_ok());
        }

        #[test]
        fn inserted_after_header_comment() {
            let src = "def f():  # note\n    return 1\n";
            let m = parse(src);
            let header = &m.functions().next().unwrap().header;
            let mut buffer = SpliceBuffer::new(src);
            splice(&mut buffer, &SpliceTarget::DocstringSlot { header }, "Return one.", &options()).unwrap();
            assert_eq!(
                buffer.text(),
                "def f():  # note\n    \"\"\"Return one.\"\"\"\n    return 1\n"
            );
        }

        #[test]
        fn one_line_body_moves_down() {
            let src = "class A:\n  def f(self): return 1\n";
            let m = parse(src);
            let header = &m.classes().next().unwrap().methods[0].header;
            let mut buffer = SpliceBuffer::new(src);
            let opts = SpliceOptions {
                indent_unit: "  ".into(),
                ..options()
            };
            splice(&mut buffer, &SpliceTarget::DocstringSlot { header }, "Line one.\\nLine two.", &opts).unwrap();
            assert_eq!(
                buffer.text(),
                "class A:\n  def f(self):\n    \"\"\"Line one.\n    Line two.\n    \"\"\"\n    return 1\n"
            );
        }

        #[test]
        fn existing_docstring_kept_without_overwrite() {
            let src = "def f():\n    \"\"\"Old.\"\"\"\n    return 1\n";
            let m = parse(src);
            let header = &m.functions().next().unwrap().header;
            let target = SpliceTarget::DocstringSlot { header };
            let mut buffer = SpliceBuffer::new(src);
            assert_eq!(
                splice(&mut buffer, &target, "New.", &options()).unwrap(),
                SpliceOutcome::Skipped(SkipReason::ExistingContent)
            );
            assert_eq!(buffer.text(), src);

            splice(&mut buffer, &target, "New.", &overwrite()).unwrap();
            assert_eq!(buffer.text(), "def f():\n    \"\"\"New.\"\"\"\n    return 1\n");
        }
    }

    mod comment_tests {
        use super::*;

        #[test]
        fn comment_inserted_above() {
            let src = "def g():\n    x = compute()\n    return x\n";
            let m = parse(src);
            let slot = m.comment_slot(2).unwrap();
            let mut buffer = SpliceBuffer::new(src);
            splice(&mut buffer, &SpliceTarget::CommentSlot { slot }, "computes the result", &options()).unwrap();
            assert_eq!(
                buffer.text(),
                "def g():\n    # computes the result\n    x = compute()\n    return x\n"
            );
        }

        #[test]
        fn existing_comments_replaced_with_overwrite() {
            let src = "# old\n# older\nx = 1  # inline\ny = 2\n";
            let m = parse(src);
            let slot = m.comment_slot(3).unwrap();
            let target = SpliceTarget::CommentSlot { slot };

            let mut buffer = SpliceBuffer::new(src);
            assert_eq!(
                splice(&mut buffer, &target, "new", &options()).unwrap(),
                SpliceOutcome::Skipped(SkipReason::ExistingContent)
            );
            splice(&mut buffer, &target, "first\\nsecond", &overwrite()).unwrap();
            assert_eq!(buffer.text(), "# first\n# second\nx = 1\ny = 2\n");
        }

        #[test]
        fn empty_value_removes_comments() {
            let src = "x = 1  # inline\n";
            let m = parse(src);
            let slot = m.comment_slot(1).unwrap();
            let mut buffer = SpliceBuffer::new(src);
            splice(&mut buffer, &SpliceTarget::CommentSlot { slot }, "", &overwrite()).unwrap();
            assert_eq!(buffer.text(), "x = 1\n");
        }

        #[test]
        fn several_lines_in_one_pass() {
            let src = "a = 1\nb = 2  # two\nc = 3\n";
            let m = parse(src);
            let mut buffer = SpliceBuffer::new(src);
            for (line, value) in [(3, "third"), (1, "first"), (2, "second")] {
                let slot = m.comment_slot(line).unwrap();
                splice(&mut buffer, &SpliceTarget::CommentSlot { slot }, value, &overwrite()).unwrap();
            }
            assert_eq!(
                buffer.text(),
                "# first\na = 1\n# second\nb = 2\n# third\nc = 3\n"
            );
        }
    }
}
