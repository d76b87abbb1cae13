//! `typing` import maintenance.
//!
//! After the annotation pass, every `typing` name used by an applied
//! annotation must be importable. Missing names are appended to the module's
//! first `from typing import` statement, following its layout, or a new
//! statement is added at the top of the module.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use docsplice_core::text::{leading_whitespace, line_start_offset, line_text, position_to_offset};

use crate::error::ParseResult;
use crate::outline::parse_module;

/// Public uppercase names exported by the `typing` module, sorted.
pub const TYPING_NAMES: &[&str] = &[
    "AbstractSet",
    "Annotated",
    "Any",
    "AnyStr",
    "AsyncContextManager",
    "AsyncGenerator",
    "AsyncIterable",
    "AsyncIterator",
    "Awaitable",
    "BinaryIO",
    "ByteString",
    "Callable",
    "ChainMap",
    "ClassVar",
    "Collection",
    "Concatenate",
    "Container",
    "ContextManager",
    "Coroutine",
    "Counter",
    "DefaultDict",
    "Deque",
    "Dict",
    "Final",
    "ForwardRef",
    "FrozenSet",
    "Generator",
    "Generic",
    "Hashable",
    "IO",
    "ItemsView",
    "Iterable",
    "Iterator",
    "KeysView",
    "List",
    "Literal",
    "LiteralString",
    "Mapping",
    "MappingView",
    "Match",
    "MutableMapping",
    "MutableSequence",
    "MutableSet",
    "NamedTuple",
    "Never",
    "NewType",
    "NoReturn",
    "NotRequired",
    "Optional",
    "OrderedDict",
    "ParamSpec",
    "ParamSpecArgs",
    "ParamSpecKwargs",
    "Pattern",
    "Protocol",
    "Required",
    "Reversible",
    "Self",
    "Sequence",
    "Set",
    "Sized",
    "SupportsAbs",
    "SupportsBytes",
    "SupportsComplex",
    "SupportsFloat",
    "SupportsIndex",
    "SupportsInt",
    "SupportsRound",
    "Text",
    "TextIO",
    "Tuple",
    "Type",
    "TypeAlias",
    "TypeAliasType",
    "TypeGuard",
    "TypeIs",
    "TypeVar",
    "TypeVarTuple",
    "TypedDict",
    "Union",
    "Unpack",
    "ValuesView",
];

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").expect("identifier pattern is valid"));

/// `typing` names referenced by an annotation expression.
///
/// Attribute accesses (`typing.Any`, `np.Set`) and names inside string
/// literals are not counted.
pub fn required_typing_names(annotation: &str) -> BTreeSet<&'static str> {
    let quoted = quoted_ranges(annotation);
    IDENTIFIER
        .find_iter(annotation)
        .filter(|m| !annotation[..m.start()].ends_with('.'))
        .filter(|m| !quoted.iter().any(|&(s, e)| m.start() > s && m.start() < e))
        .filter_map(|m| {
            TYPING_NAMES
                .binary_search(&m.as_str())
                .ok()
                .map(|i| TYPING_NAMES[i])
        })
        .collect()
}

fn quoted_ranges(text: &str) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut open: Option<(usize, char)> = None;
    let mut escaped = false;
    for (i, ch) in text.char_indices() {
        match open {
            Some((start, q)) => {
                if escaped {
                    escaped = false;
                } else if ch == '\\' {
                    escaped = true;
                } else if ch == q {
                    ranges.push((start, i));
                    open = None;
                }
            }
            None if ch == '\'' || ch == '"' => open = Some((i, ch)),
            None => {}
        }
    }
    if let Some((start, _)) = open {
        ranges.push((start, text.len()));
    }
    ranges
}

/// Ensure each of `names` is imported from `typing`.
pub fn maybe_add_typing_imports<'a>(
    source: &str,
    names: impl IntoIterator<Item = &'a str>,
) -> ParseResult<String> {
    let mut code = source.to_string();
    for name in names {
        code = maybe_add_typing_import(&code, name)?;
    }
    Ok(code)
}

/// Ensure `name` is imported from `typing`, returning the updated source.
pub fn maybe_add_typing_import(source: &str, name: &str) -> ParseResult<String> {
    let module = parse_module(source)?;
    if module.typing_imports.iter().any(|t| t.binds(name)) {
        return Ok(source.to_string());
    }

    let Some(import) = module.typing_imports.first() else {
        debug!(name, "adding new typing import");
        return Ok(prepend_import(source, name, module.first_statement_is_import, module.import_anchor));
    };

    let (at, insertion) = if import.parenthesized && import.is_multiline() {
        let indent = line_text(source, import.last_item_start.line)
            .map(leading_whitespace)
            .unwrap_or("    ");
        match import.trailing_comma_end {
            Some(comma) => (comma, format!("\n{indent}{name},")),
            None => (import.last_item_end, format!(",\n{indent}{name}")),
        }
    } else if let (true, Some(comma)) = (import.parenthesized, import.trailing_comma_end) {
        (comma, format!(" {name},"))
    } else {
        (import.last_item_end, format!(", {name}"))
    };

    debug!(name, line = import.start.line, "extending typing import");
    let mut code = source.to_string();
    code.insert_str(position_to_offset(source, at), &insertion);
    Ok(code)
}

fn prepend_import(source: &str, name: &str, starts_with_import: bool, anchor: Option<u32>) -> String {
    let statement = format!("from typing import {name}");

    if let Some(line) = anchor {
        let start = line_start_offset(source, line).unwrap_or(source.len());
        let end = start + line_text(source, line).map_or(0, str::len);
        let mut code = source.to_string();
        code.insert_str(end, &format!("\n{statement}"));
        return code;
    }

    if source.trim().is_empty() {
        return format!("{statement}\n{source}");
    }
    let separator = if starts_with_import { "\n\n" } else { "\n\n\n" };
    format!("{statement}{separator}{source}")
}

// ============================================================================
// Tests
// ============================================================================
