//! Indentation style detection.

use serde::{Deserialize, Serialize};

/// Indentation style of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IndentStyle {
    #[serde(rename = "2-space")]
    TwoSpace,
    #[serde(rename = "4-space")]
    FourSpace,
    Tab,
    Inconsistent,
}

impl IndentStyle {
    /// One indentation level in this style. Inconsistent modules use four
    /// spaces.
    pub fn unit(&self) -> &'static str {
        match self {
            IndentStyle::TwoSpace => "  ",
            IndentStyle::Tab => "\t",
            IndentStyle::FourSpace | IndentStyle::Inconsistent => "    ",
        }
    }
}

/// Detect the indentation style of `source`. Returns `None` when no line is
/// indented.
pub fn detect_indent_style(source: &str) -> Option<IndentStyle> {
    let mut has_two = false;
    let mut has_four = false;
    let mut has_tab = false;
    let mut has_other = false;

    for line in source.lines() {
        let indent = docsplice_core::text::leading_whitespace(line);
        if indent.is_empty() || indent.len() == line.len() {
            continue;
        }
        if indent.contains('\t') {
            has_tab = true;
        }
        let spaces = indent.bytes().take_while(|&b| b == b' ').count();
        if spaces > 0 {
            if spaces % 4 == 0 {
                has_four = true;
            } else if spaces % 2 == 0 {
                has_two = true;
            } else {
                has_other = true;
            }
        }
    }

    if (has_four || has_two) && has_tab {
        Some(IndentStyle::Inconsistent)
    } else if has_four {
        Some(IndentStyle::FourSpace)
    } else if has_two {
        Some(IndentStyle::TwoSpace)
    } else if has_tab {
        Some(IndentStyle::Tab)
    } else if has_other {
        Some(IndentStyle::Inconsistent)
    } else {
        None
    }
}

/// The indentation unit for new blocks: an explicit override, else the
/// detected style, else four spaces.
pub fn indent_unit(source: &str, override_unit: Option<&str>) -> String {
    match override_unit {
        Some(unit) => unit.to_string(),
        None => detect_indent_style(source)
            .map_or("    ", |style| style.unit())
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_styles() {
        assert_eq!(
            detect_indent_style("if x:\n    y\n        z\n"),
            Some(IndentStyle::FourSpace)
        );
        assert_eq!(detect_indent_style("if x:\n  y\n"), Some(IndentStyle::TwoSpace));
        assert_eq!(detect_indent_style("if x:\n\ty\n"), Some(IndentStyle::Tab));
        assert_eq!(
            detect_indent_style("if x:\n\ty\nif z:\n    w\n"),
            Some(IndentStyle::Inconsistent)
        );
        assert_eq!(detect_indent_style("if x:\n   y\n"), Some(IndentStyle::Inconsistent));
        assert_eq!(detect_indent_style("x = 1\n"), None);
    }

    #[test]
    fn two_and_four_prefer_four() {
        assert_eq!(
            detect_indent_style("if a:\n  b\n  if c:\n    d\n"),
            Some(IndentStyle::FourSpace)
        );
    }

    #[test]
    fn unit_resolution() {
        assert_eq!(indent_unit("x = 1\n", None), "    ");
        assert_eq!(indent_unit("if x:\n  y\n", None), "  ");
        assert_eq!(indent_unit("if x:\n  y\n", Some("\t")), "\t");
    }

    #[test]
    fn serde_names() {
        assert_eq!(
            serde_json::to_string(&IndentStyle::TwoSpace).unwrap(),
            "\"2-space\""
        );
        assert_eq!(
            serde_json::to_string(&IndentStyle::Inconsistent).unwrap(),
            "\"inconsistent\""
        );
    }
}
