//! Target-node collection.
//!
//! Targets are the top-level functions and classes of a module plus the
//! methods defined directly in each class body, in source order. Field keys
//! are derived from their names, so names must be unique per scope.

use crate::error::StructuralError;
use crate::outline::{ClassDef, Definition, FunctionDef, Module};

/// One documentable node.
#[derive(Debug, Clone, Copy)]
pub enum TargetNode<'m> {
    Function(&'m FunctionDef),
    Class(&'m ClassDef),
    Method {
        class: &'m ClassDef,
        method: &'m FunctionDef,
    },
}

impl TargetNode<'_> {
    /// Dictionary key: `name` for functions and classes, `Class-method` for
    /// methods.
    pub fn key(&self) -> String {
        match self {
            TargetNode::Function(f) => f.name.clone(),
            TargetNode::Class(c) => c.name.clone(),
            TargetNode::Method { class, method } => format!("{}-{}", class.name, method.name),
        }
    }
}

/// Target nodes in source order, methods following their class.
#[derive(Debug, Clone, Default)]
pub struct TargetNodes<'m> {
    nodes: Vec<TargetNode<'m>>,
}

impl<'m> TargetNodes<'m> {
    /// Collect targets from `module`, rejecting duplicate names.
    pub fn collect(module: &'m Module) -> Result<Self, StructuralError> {
        check_no_duplicates(module)?;

        let mut nodes = Vec::new();
        for def in &module.definitions {
            match def {
                Definition::Function(f) => nodes.push(TargetNode::Function(f)),
                Definition::Class(c) => {
                    nodes.push(TargetNode::Class(c));
                    for m in &c.methods {
                        nodes.push(TargetNode::Method { class: c, method: m });
                    }
                }
            }
        }
        Ok(TargetNodes { nodes })
    }

    pub fn iter(&self) -> impl Iterator<Item = &TargetNode<'m>> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.nodes.iter().map(TargetNode::key).collect()
    }
}

/// Reject duplicate function names, class names, and method names within a
/// class.
pub fn check_no_duplicates(module: &Module) -> Result<(), StructuralError> {
    let mut functions: Vec<&str> = Vec::new();
    let mut classes: Vec<&str> = Vec::new();

    for def in &module.definitions {
        match def {
            Definition::Function(f) => {
                if functions.contains(&f.name.as_str()) {
                    return Err(StructuralError::DuplicateFunction {
                        name: f.name.clone(),
                    });
                }
                functions.push(&f.name);
            }
            Definition::Class(c) => {
                if classes.contains(&c.name.as_str()) {
                    return Err(StructuralError::DuplicateClass {
                        name: c.name.clone(),
                    });
                }
                classes.push(&c.name);

                let mut methods: Vec<&str> = Vec::new();
                for m in &c.methods {
                    if methods.contains(&m.name.as_str()) {
                        return Err(StructuralError::DuplicateMethod {
                            class: c.name.clone(),
                            method: m.name.clone(),
                        });
                    }
                    methods.push(&m.name);
                }
            }
        }
    }
    Ok(())
}
