//! Assembly of a command tree from a directory of YAML documents.
//!
//! Every directory is one scope of the command hierarchy:
//!
//! ```text
//! conf/
//! ├── _anchors.yml      anchors shared by the whole tree (root only)
//! ├── _types.yml        argument type declarations (root only)
//! ├── _cmd.yml          definition of the program itself
//! ├── deploy.yml        `deploy` subcommand
//! └── deploy/
//!     ├── _cmd.yml      extra keys merged into `deploy`
//!     └── app.yml       `deploy app` subcommand
//! ```
//!
//! Subcommands are attached under `subparsers.parsers.<name>` of their parent. Only a
//! document creates a subcommand: a directory without a same-named document is not
//! read. Hidden entries (leading `.`) are ignored.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use log::{debug, warn};

use crate::anchors::AnchorTable;
use crate::document::load_document;
use crate::error::TreeError;
use crate::node::{ConfigNode, Mapping};
use crate::resolver::resolve;
use crate::types::TypeRegistry;

/// Key holding the subcommand section of a command definition
pub const SUBPARSERS: &str = "subparsers";
/// Key of the subcommand section holding the subcommand definitions
pub const PARSERS: &str = "parsers";

/// Reserved file names and the extension of command documents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub command_file: String,
    pub subparsers_file: String,
    pub anchors_file: String,
    pub types_file: String,
    pub extension: String,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            command_file: "_cmd.yml".to_string(),
            subparsers_file: "_subparsers.yml".to_string(),
            anchors_file: "_anchors.yml".to_string(),
            types_file: "_types.yml".to_string(),
            extension: "yml".to_string(),
        }
    }
}

impl Layout {
    #[must_use]
    pub fn is_reserved(&self, file_name: &str) -> bool {
        [
            &self.command_file,
            &self.subparsers_file,
            &self.anchors_file,
            &self.types_file,
        ]
        .iter()
        .any(|reserved| *reserved == file_name)
    }
}

/// A fully assembled command tree
#[derive(Debug, Clone)]
pub struct CommandTree {
    pub root: PathBuf,
    pub document: Mapping,
    pub types: TypeRegistry,
}

impl CommandTree {
    /// Definition of the subcommand reached by following `path` from the root
    #[must_use]
    pub fn command(&self, path: &[&str]) -> Option<&Mapping> {
        path.iter()
            .try_fold(&self.document, |definition, name| subcommands(definition)?.get(*name)?.as_mapping())
    }

    /// Names of the direct subcommands of the root, in definition order
    #[must_use]
    pub fn subcommand_names(&self) -> Vec<&str> {
        subcommands(&self.document)
            .map(|parsers| parsers.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Serialize the tree document back to YAML
    ///
    /// # Errors
    ///
    /// Returns `serde_yaml::Error` if serialization fails.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(&self.document)
    }
}

/// The `subparsers.parsers` mapping of a command definition, if any
#[must_use]
pub fn subcommands(definition: &Mapping) -> Option<&Mapping> {
    definition.get(SUBPARSERS)?.get(PARSERS)?.as_mapping()
}

/// Loads command trees from disk
#[derive(Debug, Clone, Default)]
pub struct TreeLoader {
    layout: Layout,
    types: TypeRegistry,
}

impl TreeLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    /// Converters available to the tree before `_types.yml` is applied
    #[must_use]
    pub fn with_types(mut self, types: TypeRegistry) -> Self {
        self.types = types;
        self
    }

    #[must_use]
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Assemble the command tree rooted at `root`.
    ///
    /// Types and anchors are loaded once, from `root` only.
    ///
    /// # Errors
    ///
    /// Returns the first `TreeError` met anywhere in the tree; no partial tree is returned.
    pub fn assemble(&self, root: &Path) -> Result<CommandTree, TreeError> {
        if !root.is_dir() {
            return Err(TreeError::Io {
                path: root.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
            });
        }

        let mut types = self.types.clone();
        let types_file = root.join(&self.layout.types_file);
        if types_file.is_file() {
            let count = types.load_declarations(&types_file)?;
            debug!("Registered {count} types from {}", types_file.display());
        }

        let anchors = AnchorTable::load(&root.join(&self.layout.anchors_file))?;
        let scope = Scope {
            layout: &self.layout,
            anchors: &anchors,
        };
        let document = scope.assemble(root)?;

        Ok(CommandTree {
            root: root.to_path_buf(),
            document,
            types,
        })
    }
}

/// A subcommand found while scanning a directory
#[derive(Debug)]
struct Candidate {
    file: PathBuf,
    dir: Option<PathBuf>,
}

/// State shared by every directory of one assembly
struct Scope<'a> {
    layout: &'a Layout,
    anchors: &'a AnchorTable,
}

impl Scope<'_> {
    fn load(&self, path: &Path) -> Result<ConfigNode, TreeError> {
        debug!("Loading command file {}", path.display());
        resolve(load_document(path)?, self.anchors, path)
    }

    fn load_mapping(&self, path: &Path) -> Result<Mapping, TreeError> {
        match self.load(path)? {
            ConfigNode::Mapping(mapping) => Ok(mapping),
            other => Err(TreeError::configuration(
                path,
                format!("command definition must be a mapping, found {}", other.kind()),
            )),
        }
    }

    fn assemble(&self, dir: &Path) -> Result<Mapping, TreeError> {
        let command_file = dir.join(&self.layout.command_file);
        let mut definition = if command_file.is_file() {
            self.load_mapping(&command_file)?
        } else {
            Mapping::new()
        };

        let subparsers_file = dir.join(&self.layout.subparsers_file);
        if subparsers_file.is_file() && !definition.contains_key(SUBPARSERS) {
            let subparsers = self.load(&subparsers_file)?;
            definition.insert(SUBPARSERS.to_string(), subparsers);
        }

        for (name, candidate) in self.scan(dir)? {
            let mut subcommand = self.load_mapping(&candidate.file)?;
            if let Some(subdir) = &candidate.dir {
                // Keys of the subdirectory win over the document's
                subcommand.extend(self.assemble(subdir)?);
            }
            parsers_mut(&mut definition, dir)?.insert(name, ConfigNode::Mapping(subcommand));
        }

        Ok(definition)
    }

    /// Subcommands of `dir` in file name order, one per document. A directory is only
    /// kept when a document of the same name exists; hidden entries are skipped.
    fn scan(&self, dir: &Path) -> Result<IndexMap<String, Candidate>, TreeError> {
        let io_error = |source| TreeError::Io {
            path: dir.to_path_buf(),
            source,
        };

        let mut entries = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(io_error)? {
            let entry = entry.map_err(io_error)?;
            let Ok(file_name) = entry.file_name().into_string() else {
                warn!("Skipping non UTF-8 entry in {}", dir.display());
                continue;
            };
            entries.push((file_name, entry.path()));
        }
        entries.sort();

        let mut candidates: IndexMap<String, Candidate> = IndexMap::new();
        let mut dirs = Vec::new();
        for (file_name, path) in entries {
            if file_name.starts_with('.') {
                continue;
            }
            if path.is_dir() {
                dirs.push((file_name, path));
                continue;
            }
            if self.layout.is_reserved(&file_name) {
                continue;
            }
            let is_document = path
                .extension()
                .is_some_and(|ext| ext == self.layout.extension.as_str());
            if is_document && let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                let candidate = Candidate {
                    file: path.clone(),
                    dir: None,
                };
                candidates.insert(stem.to_string(), candidate);
            }
        }
        for (name, path) in dirs {
            match candidates.get_mut(&name) {
                Some(candidate) => candidate.dir = Some(path),
                None => debug!(
                    "Skipping {}: no {name}.{} document",
                    path.display(),
                    self.layout.extension
                ),
            }
        }
        Ok(candidates)
    }
}

/// The `subparsers.parsers` mapping of `definition`, created when missing
fn parsers_mut<'a>(definition: &'a mut Mapping, dir: &Path) -> Result<&'a mut Mapping, TreeError> {
    let subparsers = definition
        .entry(SUBPARSERS.to_string())
        .or_insert_with(ConfigNode::mapping);
    if subparsers.is_null() {
        *subparsers = ConfigNode::mapping();
    }
    let ConfigNode::Mapping(subparsers) = subparsers else {
        return Err(TreeError::configuration(dir, format!("`{SUBPARSERS}` must be a mapping")));
    };

    let parsers = subparsers
        .entry(PARSERS.to_string())
        .or_insert_with(ConfigNode::mapping);
    if parsers.is_null() {
        *parsers = ConfigNode::mapping();
    }
    match parsers {
        ConfigNode::Mapping(parsers) => Ok(parsers),
        _ => Err(TreeError::configuration(
            dir,
            format!("`{SUBPARSERS}.{PARSERS}` must be a mapping"),
        )),
    }
}
