//! Anchor reference substitution and `<<<` merge expansion.
//!
//! Resolution happens in two passes. [`Template::classify`] inspects the shape of every
//! string and key once, turning a raw document into a tree of literals, references and
//! merges; [`Template::resolve`] then walks that tree against an [`AnchorTable`].
//!
//! A string is a reference when it is wrapped in exactly one underscore on each side,
//! e.g. `_loglevel_`, or the lone token `_`. Double underscores (`__file__`, `__`) never are.

use std::path::Path;

use crate::anchors::AnchorTable;
use crate::error::TreeError;
use crate::node::{ConfigNode, Mapping};

/// Mapping key whose value is merged into, and overrides, the enclosing mapping
pub const MERGE_KEY: &str = "<<<";

/// A document after the classification pass
#[derive(Debug, Clone, PartialEq)]
pub enum Template {
    /// Any scalar that is not a reference
    Literal(ConfigNode),
    /// `token` is the text as written, `name` the anchor it designates
    Reference { token: String, name: String },
    Sequence(Vec<Template>),
    Mapping(Vec<Entry>),
}

/// One entry of a mapping template, in source order
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Field(String, Template),
    Merge(Template),
}

/// Anchor name designated by `token`, if it follows the reference convention
///
/// A lone `_` designates the empty name, so it only resolves against an anchor keyed `""`.
#[must_use]
pub fn anchor_name(token: &str) -> Option<&str> {
    if token == "_" {
        return Some("");
    }
    let name = token.strip_prefix('_')?.strip_suffix('_')?;
    if name.is_empty() || name.starts_with('_') || name.ends_with('_') {
        return None;
    }
    Some(name)
}

impl Template {
    #[must_use]
    pub fn classify(node: ConfigNode) -> Template {
        match node {
            ConfigNode::String(token) => match anchor_name(&token) {
                Some(name) => Template::Reference {
                    name: name.to_string(),
                    token,
                },
                None => Template::Literal(ConfigNode::String(token)),
            },
            ConfigNode::Sequence(items) => {
                Template::Sequence(items.into_iter().map(Template::classify).collect())
            }
            ConfigNode::Mapping(mapping) => Template::Mapping(
                mapping
                    .into_iter()
                    .map(|(key, value)| {
                        let value = Template::classify(value);
                        if key == MERGE_KEY {
                            Entry::Merge(value)
                        } else {
                            Entry::Field(key, value)
                        }
                    })
                    .collect(),
            ),
            scalar => Template::Literal(scalar),
        }
    }

    /// Whether resolving this template can change anything
    #[must_use]
    pub fn is_literal(&self) -> bool {
        match self {
            Template::Literal(_) => true,
            Template::Reference { .. } => false,
            Template::Sequence(items) => items.iter().all(Template::is_literal),
            Template::Mapping(entries) => entries.iter().all(|entry| match entry {
                Entry::Field(_, value) => value.is_literal(),
                Entry::Merge(_) => false,
            }),
        }
    }

    /// Substitute references and expand merges.
    ///
    /// `path` is the document being resolved; it only annotates errors.
    ///
    /// # Errors
    ///
    /// Returns `TreeError::UnknownAnchor` for a reference missing from `anchors`, and
    /// `TreeError::Configuration` when a merge value does not resolve to a mapping.
    pub fn resolve(self, anchors: &AnchorTable, path: &Path) -> Result<ConfigNode, TreeError> {
        match self {
            Template::Literal(node) => Ok(node),
            Template::Reference { token, name } => {
                anchors
                    .get(&name)
                    .ok_or_else(|| TreeError::UnknownAnchor {
                        path: path.to_path_buf(),
                        anchor: token,
                    })
            }
            Template::Sequence(items) => items
                .into_iter()
                .map(|item| item.resolve(anchors, path))
                .collect::<Result<Vec<_>, _>>()
                .map(ConfigNode::Sequence),
            Template::Mapping(entries) => {
                let mut mapping = Mapping::with_capacity(entries.len());
                for entry in entries {
                    match entry {
                        Entry::Field(key, value) => {
                            mapping.insert(key, value.resolve(anchors, path)?);
                        }
                        Entry::Merge(source) => match source.resolve(anchors, path)? {
                            // Existing keys are overwritten in place, new ones appended
                            ConfigNode::Mapping(merged) => mapping.extend(merged),
                            other => {
                                return Err(TreeError::configuration(
                                    path,
                                    format!(
                                        "`{MERGE_KEY}` expects a mapping, found {}",
                                        other.kind()
                                    ),
                                ));
                            }
                        },
                    }
                }
                Ok(ConfigNode::Mapping(mapping))
            }
        }
    }
}

/// Classify and resolve `node` in one go.
///
/// # Errors
///
/// See [`Template::resolve`].
pub fn resolve(node: ConfigNode, anchors: &AnchorTable, path: &Path) -> Result<ConfigNode, TreeError> {
    Template::classify(node).resolve(anchors, path)
}
