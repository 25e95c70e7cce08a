//! Argument type converters.
//!
//! Every option or positional of a command tree may name a `type`. The name is looked up
//! in a [`TypeRegistry`], which holds the built-in converters, any converter registered
//! by the application, and the ones declared in the `_types.yml` document at the root
//! of the tree:
//!
//! ```yaml
//! port:
//!   kind: integer
//!   min: 1
//!   max: 65535
//! color:
//!   kind: choice
//!   values: [auto, always, never]
//! identifier: str
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use log::debug;
use regex::Regex;

use crate::document::load_document;
use crate::error::TreeError;
use crate::node::{ConfigNode, Mapping};

/// Converts a raw command-line string into a typed value
pub trait TypeConverter: Send + Sync {
    /// # Errors
    ///
    /// Returns a human readable message when `raw` is not acceptable.
    fn convert(&self, raw: &str) -> Result<ConfigNode, String>;
}

impl<F> TypeConverter for F
where
    F: Fn(&str) -> Result<ConfigNode, String> + Send + Sync,
{
    fn convert(&self, raw: &str) -> Result<ConfigNode, String> {
        self(raw)
    }
}

pub struct StringType;

impl TypeConverter for StringType {
    fn convert(&self, raw: &str) -> Result<ConfigNode, String> {
        Ok(ConfigNode::from(raw))
    }
}

#[derive(Default)]
pub struct IntegerType {
    pub min: Option<i64>,
    pub max: Option<i64>,
}

impl TypeConverter for IntegerType {
    fn convert(&self, raw: &str) -> Result<ConfigNode, String> {
        let value: i64 = raw
            .trim()
            .parse()
            .map_err(|_| format!("'{raw}' is not an integer"))?;
        if let Some(min) = self.min
            && value < min
        {
            return Err(format!("{value} is smaller than {min}"));
        }
        if let Some(max) = self.max
            && value > max
        {
            return Err(format!("{value} is greater than {max}"));
        }
        Ok(ConfigNode::Integer(value))
    }
}

#[derive(Default)]
pub struct FloatType {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl TypeConverter for FloatType {
    fn convert(&self, raw: &str) -> Result<ConfigNode, String> {
        let value: f64 = raw
            .trim()
            .parse()
            .map_err(|_| format!("'{raw}' is not a number"))?;
        if let Some(min) = self.min
            && value < min
        {
            return Err(format!("{value} is smaller than {min}"));
        }
        if let Some(max) = self.max
            && value > max
        {
            return Err(format!("{value} is greater than {max}"));
        }
        Ok(ConfigNode::Float(value))
    }
}

pub struct BoolType;

impl TypeConverter for BoolType {
    fn convert(&self, raw: &str) -> Result<ConfigNode, String> {
        match raw.trim().to_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(ConfigNode::Bool(true)),
            "false" | "no" | "off" | "0" => Ok(ConfigNode::Bool(false)),
            _ => Err(format!("'{raw}' is not a boolean")),
        }
    }
}

pub struct ChoiceType {
    pub values: Vec<String>,
    pub ignore_case: bool,
}

impl TypeConverter for ChoiceType {
    fn convert(&self, raw: &str) -> Result<ConfigNode, String> {
        self.values
            .iter()
            .find(|value| {
                if self.ignore_case {
                    value.eq_ignore_ascii_case(raw)
                } else {
                    *value == raw
                }
            })
            .map(|value| ConfigNode::from(value.as_str()))
            .ok_or_else(|| format!("'{raw}' is not one of: {}", self.values.join(", ")))
    }
}

pub struct RegexType {
    pub regex: Regex,
}

impl TypeConverter for RegexType {
    fn convert(&self, raw: &str) -> Result<ConfigNode, String> {
        if self.regex.is_match(raw) {
            Ok(ConfigNode::from(raw))
        } else {
            Err(format!("'{raw}' does not match `{}`", self.regex.as_str()))
        }
    }
}

#[derive(Default)]
pub struct PathType {
    pub exists: bool,
}

impl TypeConverter for PathType {
    fn convert(&self, raw: &str) -> Result<ConfigNode, String> {
        let path = PathBuf::from(raw);
        if self.exists && !path.exists() {
            return Err(format!("path '{raw}' does not exist"));
        }
        Ok(ConfigNode::from(path.to_string_lossy().into_owned()))
    }
}

/// Ordered name to converter registry
#[derive(Clone)]
pub struct TypeRegistry {
    converters: IndexMap<String, Arc<dyn TypeConverter>>,
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.converters.keys()).finish()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TypeRegistry {
    /// A registry without any converter
    #[must_use]
    pub fn empty() -> Self {
        Self {
            converters: IndexMap::new(),
        }
    }

    /// The `str`, `int`, `float`, `bool` and `path` converters
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry
            .register("str", StringType)
            .register("int", IntegerType::default())
            .register("float", FloatType::default())
            .register("bool", BoolType)
            .register("path", PathType::default());
        registry
    }

    /// Register `converter` under `name`, replacing any previous one
    pub fn register(&mut self, name: impl Into<String>, converter: impl TypeConverter + 'static) -> &mut Self {
        self.converters.insert(name.into(), Arc::new(converter));
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn TypeConverter>> {
        self.converters.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.converters.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.converters.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.converters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.converters.is_empty()
    }

    /// Register the converters declared in the document at `path`.
    ///
    /// Names wrapped in double underscores are skipped. Returns the number of converters
    /// registered.
    ///
    /// # Errors
    ///
    /// Returns the loader's `TreeError` if the document cannot be loaded, and
    /// `TreeError::Configuration` for declarations that cannot be understood.
    pub fn load_declarations(&mut self, path: &Path) -> Result<usize, TreeError> {
        let ConfigNode::Mapping(declarations) = load_document(path)? else {
            return Err(TreeError::configuration(path, "types document must be a mapping"));
        };
        let mut count = 0;
        for (name, declaration) in declarations {
            if name.starts_with("__") && name.ends_with("__") {
                continue;
            }
            let converter = self
                .declared_converter(&declaration)
                .map_err(|message| TreeError::configuration(path, format!("type `{name}`: {message}")))?;
            debug!("Registering type `{name}` from {}", path.display());
            self.converters.insert(name, converter);
            count += 1;
        }
        Ok(count)
    }

    fn declared_converter(&self, declaration: &ConfigNode) -> Result<Arc<dyn TypeConverter>, String> {
        match declaration {
            // Shorthand for an alias or a parameterless kind
            ConfigNode::String(name) => self
                .get(name)
                .cloned()
                .map_or_else(|| converter_for_kind(name, &Mapping::new()), Ok),
            ConfigNode::Mapping(params) => {
                let kind = params
                    .get("kind")
                    .and_then(ConfigNode::as_str)
                    .ok_or("missing `kind`")?;
                if kind == "alias" {
                    let target = params
                        .get("of")
                        .and_then(ConfigNode::as_str)
                        .ok_or("alias needs `of`")?;
                    return self
                        .get(target)
                        .cloned()
                        .ok_or_else(|| format!("unknown type `{target}`"));
                }
                converter_for_kind(kind, params)
            }
            other => Err(format!("expected a kind name or a mapping, found {}", other.kind())),
        }
    }
}

fn converter_for_kind(kind: &str, params: &Mapping) -> Result<Arc<dyn TypeConverter>, String> {
    let int_param = |key: &str| -> Result<Option<i64>, String> {
        params
            .get(key)
            .map(|v| v.as_i64().ok_or_else(|| format!("`{key}` must be an integer")))
            .transpose()
    };
    let float_param = |key: &str| -> Result<Option<f64>, String> {
        params
            .get(key)
            .map(|v| v.as_f64().ok_or_else(|| format!("`{key}` must be a number")))
            .transpose()
    };
    let bool_param = |key: &str| -> Result<bool, String> {
        params
            .get(key)
            .map_or(Ok(false), |v| v.as_bool().ok_or_else(|| format!("`{key}` must be a boolean")))
    };

    Ok(match kind {
        "string" | "str" => Arc::new(StringType),
        "integer" | "int" => Arc::new(IntegerType {
            min: int_param("min")?,
            max: int_param("max")?,
        }),
        "float" => Arc::new(FloatType {
            min: float_param("min")?,
            max: float_param("max")?,
        }),
        "bool" => Arc::new(BoolType),
        "path" => Arc::new(PathType {
            exists: bool_param("exists")?,
        }),
        "choice" => {
            let values = params
                .get("values")
                .and_then(ConfigNode::as_sequence)
                .ok_or("choice needs a `values` list")?
                .iter()
                .map(ToString::to_string)
                .collect();
            Arc::new(ChoiceType {
                values,
                ignore_case: bool_param("ignore_case")?,
            })
        }
        "regex" => {
            let pattern = params
                .get("pattern")
                .and_then(ConfigNode::as_str)
                .ok_or("regex needs a `pattern`")?;
            let regex = Regex::new(pattern).map_err(|e| format!("invalid regex pattern `{pattern}`: {e}"))?;
            Arc::new(RegexType { regex })
        }
        other => return Err(format!("unknown kind `{other}`")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn convert(registry: &TypeRegistry, name: &str, raw: &str) -> Result<ConfigNode, String> {
        registry.get(name).unwrap().convert(raw)
    }

    #[test]
    fn test_builtin_converters() {
        let registry = TypeRegistry::builtin();
        assert_eq!(registry.names().collect::<Vec<_>>(), ["str", "int", "float", "bool", "path"]);
        assert_eq!(convert(&registry, "int", "42"), Ok(ConfigNode::Integer(42)));
        assert!(convert(&registry, "int", "4.2").is_err());
        assert_eq!(convert(&registry, "float", "4.5"), Ok(ConfigNode::Float(4.5)));
        assert_eq!(convert(&registry, "bool", "Yes"), Ok(ConfigNode::Bool(true)));
        assert_eq!(convert(&registry, "str", "x"), Ok(ConfigNode::from("x")));
    }

    #[test]
    fn test_closure_converter() {
        let mut registry = TypeRegistry::empty();
        registry.register("upper", |raw: &str| {
            Ok::<_, String>(ConfigNode::from(raw.to_uppercase()))
        });
        assert_eq!(convert(&registry, "upper", "abc"), Ok(ConfigNode::from("ABC")));
    }

    #[test]
    fn test_declarations_are_registered() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("_types.yml");
        std::fs::write(
            &path,
            r"
port:
  kind: integer
  min: 1
  max: 65535
color:
  kind: choice
  values: [auto, always, never]
  ignore_case: true
version:
  kind: regex
  pattern: '^\d+\.\d+$'
number: int
count:
  kind: alias
  of: port
__doc__: ignored
",
        )
        .unwrap();

        let mut registry = TypeRegistry::builtin();
        assert_eq!(registry.load_declarations(&path).unwrap(), 5);
        assert!(!registry.contains("__doc__"));

        assert_eq!(convert(&registry, "port", "8080"), Ok(ConfigNode::Integer(8080)));
        assert!(convert(&registry, "port", "0").is_err());
        assert!(convert(&registry, "count", "70000").is_err());
        assert_eq!(convert(&registry, "color", "NEVER"), Ok(ConfigNode::from("never")));
        assert!(convert(&registry, "color", "sometimes").is_err());
        assert_eq!(convert(&registry, "version", "1.2"), Ok(ConfigNode::from("1.2")));
        assert!(convert(&registry, "version", "1.2.3").is_err());
        assert_eq!(convert(&registry, "number", "7"), Ok(ConfigNode::Integer(7)));
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("_types.yml");
        std::fs::write(&path, "odd:\n  kind: imaginary\n").unwrap();

        let mut registry = TypeRegistry::builtin();
        match registry.load_declarations(&path) {
            Err(TreeError::Configuration { message, .. }) => {
                assert!(message.contains("odd"), "message: {message}");
                assert!(message.contains("imaginary"), "message: {message}");
            }
            other => panic!("Expected TreeError::Configuration, got: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_regex_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("_types.yml");
        std::fs::write(&path, "bad:\n  kind: regex\n  pattern: '[invalid'\n").unwrap();

        let mut registry = TypeRegistry::builtin();
        assert!(matches!(
            registry.load_declarations(&path),
            Err(TreeError::Configuration { .. })
        ));
    }
}
