//! Field schemas for the three passes.
//!
//! A schema lists the fields a generator is asked to fill and ties each one
//! to its [`SpliceTarget`]. Annotation fields are grouped per function,
//! method or class; docstring and comment fields are flat.
//!
//! | Pass | Key | Example |
//! |------|-----|---------|
//! | annotations | group / argument | `FunctionLoad` / `path`, `ClassUserMethodSave` / `returns` |
//! | docstrings | node | `function_load`, `class_User`, `class_User_method_save` |
//! | comments | code line | `line1`, `line2`, ... |

use std::fmt;

use serde_json::{json, Map, Value};
use tracing::warn;

use crate::generation::Task;
use crate::outline::{AnnotationSite, Expr, FunctionDef, Module};
use crate::splice::SpliceTarget;
use crate::targets::{TargetNode, TargetNodes};

/// Keys tried, in order, for the return-annotation field of a group.
pub const RETURN_KEYS: &[&str] = &["returns", "function_returns", "function_return_annotation"];

/// Argument names that would clash with reserved field names.
pub const RESERVED_ARGUMENT_NAMES: &[&str] = &["self", "cls", "model_config"];

/// Identifies one field: a group (for annotations) and a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldKey {
    pub group: Option<String>,
    pub name: String,
}

impl FieldKey {
    pub fn flat(name: impl Into<String>) -> Self {
        FieldKey {
            group: None,
            name: name.into(),
        }
    }

    pub fn grouped(group: impl Into<String>, name: impl Into<String>) -> Self {
        FieldKey {
            group: Some(group.into()),
            name: name.into(),
        }
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.group {
            Some(group) => write!(f, "{group}.{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// One field and the slot its value is spliced into.
#[derive(Debug, Clone)]
pub struct Field<'m> {
    pub key: String,
    pub description: String,
    /// Current content of the slot, offered when overwriting.
    pub default: Option<String>,
    pub target: SpliceTarget<'m>,
}

/// Fields sharing a group name, or the ungrouped fields of a flat schema.
#[derive(Debug, Clone)]
pub struct FieldGroup<'m> {
    pub name: Option<String>,
    pub fields: Vec<Field<'m>>,
}

/// The fields of one pass.
#[derive(Debug, Clone)]
pub struct FieldSchema<'m> {
    pub task: Task,
    pub groups: Vec<FieldGroup<'m>>,
}

impl<'m> FieldSchema<'m> {
    pub fn is_empty(&self) -> bool {
        self.groups.iter().all(|g| g.fields.is_empty())
    }

    pub fn field_count(&self) -> usize {
        self.groups.iter().map(|g| g.fields.len()).sum()
    }

    /// Look up a field by key.
    pub fn field(&self, key: &FieldKey) -> Option<&Field<'m>> {
        self.groups
            .iter()
            .find(|g| g.name == key.group)?
            .fields
            .iter()
            .find(|f| f.key == key.name)
    }

    /// Every field key with whether the field has a default.
    pub fn expectations(&self) -> Vec<(FieldKey, bool)> {
        self.groups
            .iter()
            .flat_map(|g| {
                g.fields.iter().map(move |f| {
                    (
                        FieldKey {
                            group: g.name.clone(),
                            name: f.key.clone(),
                        },
                        f.default.is_some(),
                    )
                })
            })
            .collect()
    }

    /// Split into requests of at most `max_groups` groups. Flat schemas are
    /// never split.
    pub fn batches(&self, max_groups: usize) -> Vec<FieldSchema<'m>> {
        let grouped = self.groups.iter().any(|g| g.name.is_some());
        if !grouped || self.groups.len() <= max_groups.max(1) {
            return vec![self.clone()];
        }
        self.groups
            .chunks(max_groups.max(1))
            .map(|chunk| FieldSchema {
                task: self.task,
                groups: chunk.to_vec(),
            })
            .collect()
    }

    /// JSON description of the fields, in the shape of a JSON Schema object.
    pub fn to_json(&self) -> Value {
        let title = match self.task {
            Task::Annotations => "ArgumentsModel",
            Task::Docstrings => "DocstringModel",
            Task::Comments => "CodeCommentsModel",
        };
        let mut properties = Map::new();
        let mut required = Vec::new();

        for group in &self.groups {
            match &group.name {
                Some(name) => {
                    properties.insert(name.clone(), object_schema(name, &group.fields));
                    required.push(Value::String(name.clone()));
                }
                None => {
                    for field in &group.fields {
                        properties.insert(field.key.clone(), field_schema(field));
                        if field.default.is_none() {
                            required.push(Value::String(field.key.clone()));
                        }
                    }
                }
            }
        }

        json!({
            "title": title,
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

fn field_schema(field: &Field<'_>) -> Value {
    let mut schema = json!({
        "type": "string",
        "description": field.description,
    });
    if let (Some(default), Some(obj)) = (&field.default, schema.as_object_mut()) {
        obj.insert("default".into(), Value::String(default.clone()));
    }
    schema
}

fn object_schema(title: &str, fields: &[Field<'_>]) -> Value {
    let properties: Map<String, Value> = fields
        .iter()
        .map(|f| (f.key.clone(), field_schema(f)))
        .collect();
    let required: Vec<Value> = fields
        .iter()
        .filter(|f| f.default.is_none())
        .map(|f| Value::String(f.key.clone()))
        .collect();
    json!({
        "title": title,
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

// ============================================================================
// Naming
// ============================================================================

/// Title-case `name` the way Python's `str.title` does: the first letter of
/// every run of letters is upper-cased, the rest lower-cased.
pub fn title_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_word = false;
    for ch in name.chars() {
        if ch.is_alphabetic() {
            if in_word {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(ch);
            in_word = false;
        }
    }
    out
}

/// Field key for an argument or attribute name.
pub fn argument_key(name: &str) -> String {
    if RESERVED_ARGUMENT_NAMES.contains(&name) {
        format!("arg_{name}")
    } else if name.starts_with('_') {
        format!("argument{name}")
    } else {
        name.to_string()
    }
}

/// Collapse a possibly multi-line expression onto one line.
pub fn one_line(expr: &Expr) -> String {
    let mut out = String::new();
    for line in expr.text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let joins_tight = out.ends_with(['(', '[', '{']) || line.starts_with([')', ']', '}']);
        if !out.is_empty() && !joins_tight {
            out.push(' ');
        }
        out.push_str(line);
    }
    out
}

// ============================================================================
// Annotations
// ============================================================================

impl<'m> FieldSchema<'m> {
    /// Annotation groups for every target node.
    pub fn annotations(targets: &TargetNodes<'m>, overwrite: bool) -> Self {
        let mut groups: Vec<FieldGroup<'m>> = Vec::new();

        for node in targets.iter() {
            let group = match *node {
                TargetNode::Function(f) => {
                    function_group(format!("Function{}", title_case(&f.name)), f, false, overwrite)
                }
                TargetNode::Method { class, method } => function_group(
                    format!("Class{}Method{}", title_case(&class.name), title_case(&method.name)),
                    method,
                    true,
                    overwrite,
                ),
                TargetNode::Class(c) if !c.has_init() => {
                    // A name assigned more than once is offered at its first site.
                    let fields = c
                        .attributes
                        .iter()
                        .enumerate()
                        .filter(|(i, site)| !c.attributes[..*i].iter().any(|s| s.name == site.name))
                        .filter_map(|(_, site)| argument_field(site, false, overwrite))
                        .collect();
                    FieldGroup {
                        name: Some(format!("Class{}", title_case(&c.name))),
                        fields,
                    }
                }
                TargetNode::Class(_) => continue,
            };

            if group.fields.is_empty() {
                continue;
            }
            if groups.iter().any(|g| g.name == group.name) {
                warn!(group = ?group.name, "duplicate annotation group name; skipping");
                continue;
            }
            groups.push(group);
        }

        FieldSchema {
            task: Task::Annotations,
            groups,
        }
    }
}

fn argument_field<'m>(site: &'m AnnotationSite, is_receiver: bool, overwrite: bool) -> Option<Field<'m>> {
    let mut description = format!("Annotation of the argument: `{}`", site.name);
    if let Some(default) = &site.default {
        description.push_str(&format!(" with default value: `{default}`"));
    }
    let current = match &site.annotation {
        Some(_) if !overwrite => return None,
        Some(ann) => {
            let text = one_line(ann);
            let joiner = if site.default.is_some() { ", and" } else { " with" };
            description.push_str(&format!("{joiner} current annotation: `{text}`"));
            Some(text)
        }
        None => None,
    };
    description.push('.');

    Some(Field {
        key: argument_key(&site.name),
        description,
        default: current,
        target: SpliceTarget::ArgumentAnnotation { site, is_receiver },
    })
}

fn function_group<'m>(name: String, function: &'m FunctionDef, is_method: bool, overwrite: bool) -> FieldGroup<'m> {
    let skip_first = is_method && !function.is_staticmethod();
    let mut fields: Vec<Field<'m>> = function
        .params
        .iter()
        .skip(usize::from(skip_first))
        .filter_map(|p| argument_field(&p.site, false, overwrite))
        .collect();

    let wants_return = function.name != "__init__" && (function.returns.is_none() || overwrite);
    if wants_return {
        let key = RETURN_KEYS
            .iter()
            .find(|k| !fields.iter().any(|f| f.key == **k))
            .copied()
            .unwrap_or(RETURN_KEYS[RETURN_KEYS.len() - 1]);
        let mut description =
            "Return type annotation. This is the type hint that appears after the `->`".to_string();
        let current = function.returns.as_ref().map(|r| one_line(&r.expr));
        if let Some(current) = &current {
            description.push_str(&format!(". Current annotation: `{current}`"));
        }
        description.push('.');
        fields.push(Field {
            key: key.to_string(),
            description,
            default: current,
            target: SpliceTarget::ReturnAnnotation { function },
        });
    }

    FieldGroup {
        name: Some(name),
        fields,
    }
}

// ============================================================================
// Docstrings
// ============================================================================

impl<'m> FieldSchema<'m> {
    /// Docstring fields. `__init__` methods are skipped, as are nodes that
    /// already have a docstring unless `overwrite` is set.
    pub fn docstrings(targets: &TargetNodes<'m>, overwrite: bool) -> Self {
        let mut fields = Vec::new();
        for node in targets.iter() {
            let (key, description, header) = match *node {
                TargetNode::Function(f) => (
                    format!("function_{}", f.name),
                    format!("Docstring for the function `{}`", f.name),
                    &f.header,
                ),
                TargetNode::Class(c) => (
                    format!("class_{}", c.name),
                    format!("Docstring for the class `{}`", c.name),
                    &c.header,
                ),
                TargetNode::Method { method, .. } if method.name == "__init__" => continue,
                TargetNode::Method { class, method } => (
                    format!("class_{}_method_{}", class.name, method.name),
                    format!(
                        "Docstring for the method `{}` of the class `{}`",
                        method.name, class.name
                    ),
                    &method.header,
                ),
            };
            if header.docstring.is_some() && !overwrite {
                continue;
            }
            fields.push(Field {
                key,
                description,
                default: None,
                target: SpliceTarget::DocstringSlot { header },
            });
        }

        FieldSchema {
            task: Task::Docstrings,
            groups: vec![FieldGroup { name: None, fields }],
        }
    }

    /// One comment field per code line, numbered from 1. Existing comments
    /// become defaults.
    pub fn comments(module: &'m Module) -> Self {
        let fields = module
            .comment_slots
            .iter()
            .enumerate()
            .map(|(i, slot)| Field {
                key: format!("line{}", i + 1),
                description: format!("Comment for line {}: {}", i + 1, slot.code.trim_start()),
                default: slot.existing.clone(),
                target: SpliceTarget::CommentSlot { slot },
            })
            .collect();

        FieldSchema {
            task: Task::Comments,
            groups: vec![FieldGroup { name: None, fields }],
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
