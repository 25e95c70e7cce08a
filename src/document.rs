//! Loading of single YAML documents into [`ConfigNode`] trees

use std::path::Path;

use serde_yaml::Value;

use crate::error::TreeError;
use crate::node::{ConfigNode, Mapping};

/// Load and parse a YAML document.
///
/// An empty document (or one containing only `null`) yields an empty mapping.
///
/// # Errors
///
/// Returns `TreeError::Io` if the file cannot be read, `TreeError::Parse` if it is not
/// valid YAML, or `TreeError::Configuration` if it uses mapping keys that are not scalars.
pub fn load_document(path: &Path) -> Result<ConfigNode, TreeError> {
    let contents = std::fs::read_to_string(path).map_err(|source| TreeError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_document(&contents, path)
}

/// Parse YAML text; `path` is only used to annotate errors.
///
/// # Errors
///
/// See [`load_document`].
pub fn parse_document(contents: &str, path: &Path) -> Result<ConfigNode, TreeError> {
    let value: Value = serde_yaml::from_str(contents).map_err(|source| TreeError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    match from_yaml(value, path)? {
        ConfigNode::Null => Ok(ConfigNode::mapping()),
        node => Ok(node),
    }
}

fn from_yaml(value: Value, path: &Path) -> Result<ConfigNode, TreeError> {
    Ok(match value {
        Value::Null => ConfigNode::Null,
        Value::Bool(b) => ConfigNode::Bool(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => ConfigNode::Integer(i),
            // u64 beyond i64::MAX and real numbers
            None => ConfigNode::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => ConfigNode::String(s),
        Value::Sequence(items) => ConfigNode::Sequence(
            items
                .into_iter()
                .map(|item| from_yaml(item, path))
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Value::Mapping(entries) => {
            let mut mapping = Mapping::with_capacity(entries.len());
            for (key, value) in entries {
                mapping.insert(key_to_string(key, path)?, from_yaml(value, path)?);
            }
            ConfigNode::Mapping(mapping)
        }
        Value::Tagged(tagged) => from_yaml(tagged.value, path)?,
    })
}

fn key_to_string(key: Value, path: &Path) -> Result<String, TreeError> {
    match key {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Tagged(tagged) => key_to_string(tagged.value, path),
        other => Err(TreeError::configuration(
            path,
            format!("unsupported mapping key: {other:?}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_empty_mapping() {
        let path = Path::new("empty.yml");
        assert_eq!(parse_document("", path).unwrap(), ConfigNode::mapping());
        assert_eq!(parse_document("~\n", path).unwrap(), ConfigNode::mapping());
    }

    #[test]
    fn test_key_order_preserved() {
        let node = parse_document("zeta: 1\nalpha: 2\nmid: 3\n", Path::new("a.yml")).unwrap();
        let keys: Vec<&str> = node
            .as_mapping()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(keys, ["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_scalar_kinds() {
        let node = parse_document(
            "int: 3\nfloat: 1.5\nbool: true\nnothing: ~\nstr: hello\nseq: [1, two]\n",
            Path::new("a.yml"),
        )
        .unwrap();
        assert_eq!(node.get("int"), Some(&ConfigNode::Integer(3)));
        assert_eq!(node.get("float"), Some(&ConfigNode::Float(1.5)));
        assert_eq!(node.get("bool"), Some(&ConfigNode::Bool(true)));
        assert_eq!(node.get("nothing"), Some(&ConfigNode::Null));
        assert_eq!(node.get("str"), Some(&ConfigNode::from("hello")));
        assert_eq!(
            node.get("seq"),
            Some(&ConfigNode::Sequence(vec![
                ConfigNode::Integer(1),
                ConfigNode::from("two")
            ]))
        );
    }

    #[test]
    fn test_numeric_keys_are_stringified() {
        let node = parse_document("1: one\ntrue: yes\n", Path::new("a.yml")).unwrap();
        assert_eq!(node.get("1"), Some(&ConfigNode::from("one")));
        assert!(node.get("true").is_some());
    }

    #[test]
    fn test_malformed_yaml_reports_path() {
        let result = parse_document("key: [unclosed\n", Path::new("broken.yml"));
        match result {
            Err(TreeError::Parse { path, .. }) => assert_eq!(path, Path::new("broken.yml")),
            other => panic!("Expected TreeError::Parse, got: {other:?}"),
        }
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.yml");
        match load_document(&path) {
            Err(TreeError::Io { path: p, .. }) => assert_eq!(p, path),
            other => panic!("Expected TreeError::Io, got: {other:?}"),
        }
    }
}
