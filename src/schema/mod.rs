// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Configuration schema parsing.
//!
//! A schema is a JSON5 document (comments and trailing commas allowed).
//! Any object that carries a `default` key, even `default: null`, is a leaf;
//! every other object is an internal node whose object-valued children are
//! parsed recursively.
//!
//! ```json5
//! {
//!   // logging
//!   log: {
//!     level: { format: ["debug", "info"], default: "info", env: "LOG_LEVEL" },
//!   },
//!   redis: {
//!     doc: "Redis connection",
//!     shards: { format: "Array", default: null, env: "REDIS_SHARDS" },
//!   },
//! }
//! ```


use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::format::{FormatError, FormatType};

/// Errors that abort schema parsing.
#[derive(Error, Debug)]
pub enum ParseError {
    /// The schema file could not be read.
    #[error("failed to read schema: {0}")]
    Io(#[from] std::io::Error),

    /// The document is not valid UTF-8.
    #[error("schema is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    /// The document is not valid JSON5.
    #[error("invalid schema syntax: {0}")]
    Syntax(#[from] json5::Error),

    /// The document root is not an object.
    #[error("schema root must be an object")]
    NotAnObject,

    /// A leaf declares a format that cannot be used.
    #[error("invalid format for '{key}': {source}")]
    Format {
        key: String,
        #[source]
        source: FormatError,
    },

    /// Two leaves collapse onto the same dotted key.
    #[error("duplicate configuration key '{0}'")]
    DuplicateKey(String),

    /// Wraps any of the above with the file it came from.
    #[error("cannot parse schema '{file}': {source}")]
    InFile {
        file: String,
        #[source]
        source: Box<ParseError>,
    },
}

impl ParseError {
    fn nested_under(self, name: &str) -> Self {
        match self {
            ParseError::Format { key, source } if key.is_empty() => ParseError::Format {
                key: name.to_string(),
                source,
            },
            ParseError::Format { key, source } => ParseError::Format {
                key: format!("{name}.{key}"),
                source,
            },
            other => other,
        }
    }
}

/// A terminal schema entry, one concrete value to resolve.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigurationLeaf {
    pub path: Vec<String>,
    pub format: FormatType,
    /// `None` for `default: null`, which marks the field as required.
    pub default_value: Option<Value>,
    pub doc: String,
    pub env: Option<String>,
}

impl ConfigurationLeaf {
    /// Canonical lookup key: the path joined with `.`.
    pub fn key(&self) -> String {
        self.path.join(".")
    }

    /// Whether a missing store value can be left to the application.
    pub fn has_runtime_fallback(&self) -> bool {
        self.default_value.is_some()
            || self.env.as_deref().is_some_and(|e| !e.is_empty())
            || self.format.is_optional()
    }

    fn nested_under(mut self, key: &str) -> Self {
        self.path.insert(0, key.to_string());
        self
    }
}

/// Internal schema node.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SchemaNode {
    pub children: BTreeMap<String, ConfigurationTree>,
    /// Non-object members such as a `doc` string on a group.
    pub metadata: BTreeMap<String, Value>,
}

/// Parsed schema tree. Each node is either a leaf or a group, never both.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigurationTree {
    Leaf(ConfigurationLeaf),
    Node(SchemaNode),
}

impl ConfigurationTree {
    /// Every leaf below this node, children visited in sorted key order.
    pub fn leaves(&self) -> Vec<&ConfigurationLeaf> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a ConfigurationLeaf>) {
        match self {
            ConfigurationTree::Leaf(leaf) => out.push(leaf),
            ConfigurationTree::Node(node) => {
                for child in node.children.values() {
                    child.collect_leaves(out);
                }
            }
        }
    }

    /// Child by name, `None` on leaves.
    pub fn child(&self, name: &str) -> Option<&ConfigurationTree> {
        match self {
            ConfigurationTree::Leaf(_) => None,
            ConfigurationTree::Node(node) => node.children.get(name),
        }
    }

    pub fn as_leaf(&self) -> Option<&ConfigurationLeaf> {
        match self {
            ConfigurationTree::Leaf(leaf) => Some(leaf),
            ConfigurationTree::Node(_) => None,
        }
    }

    fn nested_under(self, key: &str) -> Self {
        match self {
            ConfigurationTree::Leaf(leaf) => ConfigurationTree::Leaf(leaf.nested_under(key)),
            ConfigurationTree::Node(node) => ConfigurationTree::Node(SchemaNode {
                children: node
                    .children
                    .into_iter()
                    .map(|(name, child)| (name, child.nested_under(key)))
                    .collect(),
                metadata: node.metadata,
            }),
        }
    }
}

/// A parsed schema: the tree plus its leaves in deterministic order.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigurationSchema {
    pub tree: ConfigurationTree,
    pub leaves: Vec<ConfigurationLeaf>,
}

impl ConfigurationSchema {
    /// Leaf with the given dotted key.
    pub fn leaf(&self, key: &str) -> Option<&ConfigurationLeaf> {
        self.leaves.iter().find(|leaf| leaf.key() == key)
    }
}

/// Parse a schema document.
pub fn parse(data: &[u8]) -> Result<ConfigurationSchema, ParseError> {
    let text = std::str::from_utf8(data)?;
    let document: Value = json5::from_str(text)?;
    let object = match document {
        Value::Object(object) => object,
        _ => return Err(ParseError::NotAnObject),
    };

    let tree = build_tree(object)?;
    let leaves: Vec<ConfigurationLeaf> = tree.leaves().into_iter().cloned().collect();

    let mut seen = HashSet::new();
    for leaf in &leaves {
        let key = leaf.key();
        if !seen.insert(key.clone()) {
            return Err(ParseError::DuplicateKey(key));
        }
    }

    log::debug!("Parsed schema with {} configuration leaves", leaves.len());
    Ok(ConfigurationSchema { tree, leaves })
}

/// Read and parse a schema file, naming the file in any error.
pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<ConfigurationSchema, ParseError> {
    let path = path.as_ref();
    let wrap = |source: ParseError| ParseError::InFile {
        file: path.display().to_string(),
        source: Box::new(source),
    };
    let data = fs::read(path).map_err(|e| wrap(e.into()))?;
    parse(&data).map_err(wrap)
}

fn build_tree(object: Map<String, Value>) -> Result<ConfigurationTree, ParseError> {
    if object.contains_key("default") {
        return build_leaf(object).map(ConfigurationTree::Leaf);
    }

    let mut node = SchemaNode::default();
    for (name, value) in object {
        match value {
            Value::Object(child) => {
                let subtree = build_tree(child)
                    .map_err(|e| e.nested_under(&name))?
                    .nested_under(&name);
                node.children.insert(name, subtree);
            }
            other => {
                node.metadata.insert(name, other);
            }
        }
    }
    Ok(ConfigurationTree::Node(node))
}

fn build_leaf(mut object: Map<String, Value>) -> Result<ConfigurationLeaf, ParseError> {
    // the key is filled in by the parents while unwinding
    let format = FormatType::from_declaration(object.get("format")).map_err(|source| {
        ParseError::Format {
            key: String::new(),
            source,
        }
    })?;
    let default_value = match object.remove("default") {
        Some(Value::Null) | None => None,
        Some(value) => Some(value),
    };

    Ok(ConfigurationLeaf {
        path: Vec::new(),
        format,
        default_value,
        doc: as_string(object.get("doc")).unwrap_or_default(),
        env: as_string(object.get("env")).filter(|env| !env.is_empty()),
    })
}

fn as_string(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) => Some(s.clone()),
        _ => None,
    }
}
