//! Named configuration fragments shared by every document of a command tree

use std::path::Path;

use log::debug;

use crate::document::load_document;
use crate::error::TreeError;
use crate::node::{ConfigNode, Mapping};

/// Anchor name to value table, keyed case-insensitively.
///
/// Values are stored exactly as written in the anchors document; lookups hand out
/// copies so that nothing resolved from the table can alias it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnchorTable {
    anchors: Mapping,
}

impl AnchorTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from the top-level entries of a mapping
    #[must_use]
    pub fn from_mapping(mapping: Mapping) -> Self {
        let anchors = mapping
            .into_iter()
            .map(|(name, value)| (name.to_lowercase(), value))
            .collect();
        Self { anchors }
    }

    /// Load the anchors document at `path`; a missing file gives an empty table.
    ///
    /// # Errors
    ///
    /// Returns the loader's `TreeError` if the file is unreadable or malformed, and
    /// `TreeError::Configuration` if its top level is not a mapping.
    pub fn load(path: &Path) -> Result<Self, TreeError> {
        if !path.is_file() {
            return Ok(Self::new());
        }
        match load_document(path)? {
            ConfigNode::Mapping(mapping) => {
                let table = Self::from_mapping(mapping);
                debug!("Loaded {} anchors from {}", table.len(), path.display());
                Ok(table)
            }
            other => Err(TreeError::configuration(
                path,
                format!("anchors document must be a mapping, found {}", other.kind()),
            )),
        }
    }

    /// Copy of the value stored under `name` (case-insensitive)
    #[must_use]
    pub fn get(&self, name: &str) -> Option<ConfigNode> {
        self.anchors.get(&name.to_lowercase()).cloned()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.anchors.contains_key(&name.to_lowercase())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.anchors.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_empty_table() {
        let dir = tempfile::tempdir().unwrap();
        let table = AnchorTable::load(&dir.path().join("_anchors.yml")).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_names_are_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("_anchors.yml");
        std::fs::write(&path, "LogLevel:\n  short: l\nVERBOSE: true\n").unwrap();

        let table = AnchorTable::load(&path).unwrap();
        assert_eq!(table.names().collect::<Vec<_>>(), ["loglevel", "verbose"]);
        assert!(table.contains("LOGLEVEL"));
        assert_eq!(table.get("Verbose"), Some(ConfigNode::Bool(true)));
    }

    #[test]
    fn test_values_are_taken_literally() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("_anchors.yml");
        std::fs::write(&path, "outer:\n  inner: _other_\n").unwrap();

        let table = AnchorTable::load(&path).unwrap();
        let outer = table.get("outer").unwrap();
        assert_eq!(outer.get("inner"), Some(&ConfigNode::from("_other_")));
    }

    #[test]
    fn test_get_returns_independent_copy() {
        let mut mapping = Mapping::new();
        mapping.insert("opts".to_string(), ConfigNode::mapping());
        let table = AnchorTable::from_mapping(mapping);

        let mut copy = table.get("opts").unwrap();
        copy.as_mapping_mut()
            .unwrap()
            .insert("added".to_string(), ConfigNode::Null);

        assert_eq!(table.get("opts"), Some(ConfigNode::mapping()));
    }

    #[test]
    fn test_non_mapping_document_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("_anchors.yml");
        std::fs::write(&path, "- a\n- b\n").unwrap();

        match AnchorTable::load(&path) {
            Err(TreeError::Configuration { path: p, .. }) => assert_eq!(p, path),
            other => panic!("Expected TreeError::Configuration, got: {other:?}"),
        }
    }
}
