//! Program settings, loaded once arguments are parsed and logging is up.
//!
//! Settings come from the main configuration file, then from per-command files under
//! the configuration directory:
//!
//! - `conf/<c1>.yml`, `conf/<c1>/<c2>.yml`, ... for each level of the active command
//!   path, every key upper-cased with `-` turned into `_`
//! - every non-hidden file directly inside `conf/<c1>/.../<cn>/`, stored whole under its
//!   upper-cased stem (`.yml` files parsed, anything else kept as text)

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use log::debug;
use thiserror::Error;

use crate::document::load_document;
use crate::error::TreeError;
use crate::logger::{LogOptions, Logger};
use crate::node::ConfigNode;

/// Placeholder replaced by the program directory in main configuration strings
pub const FILE_PLACEHOLDER: &str = "__FILE__";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error(transparent)]
    Load(#[from] TreeError),
    #[error("unable to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("main configuration file {0} not found")]
    MissingConfFile(PathBuf),
    #[error("{0}")]
    Hook(String),
}

/// Callback run once all settings are loaded
pub type Hook = Box<dyn Fn(&Settings) -> Result<(), SettingsError>>;

/// Where settings are read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsPaths {
    /// Replaces `__FILE__` in the main configuration
    pub program_dir: PathBuf,
    pub conf_file: PathBuf,
    pub conf_dir: PathBuf,
}

impl SettingsPaths {
    /// `conf.yml` and `conf/` inside `program_dir`
    #[must_use]
    pub fn new(program_dir: impl Into<PathBuf>) -> Self {
        let program_dir = program_dir.into();
        Self {
            conf_file: program_dir.join("conf.yml"),
            conf_dir: program_dir.join("conf"),
            program_dir,
        }
    }

    #[must_use]
    pub fn with_conf_file(mut self, conf_file: impl Into<PathBuf>) -> Self {
        self.conf_file = conf_file.into();
        self
    }
}

/// Upper-case keyed settings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    values: IndexMap<String, ConfigNode>,
}

/// Replace `__FILE__` with `program_dir` in every string of `node`
#[must_use]
pub fn replace_paths(node: ConfigNode, program_dir: &Path) -> ConfigNode {
    match node {
        ConfigNode::String(s) => {
            ConfigNode::String(s.replace(FILE_PLACEHOLDER, &program_dir.to_string_lossy()))
        }
        ConfigNode::Sequence(items) => ConfigNode::Sequence(
            items
                .into_iter()
                .map(|item| replace_paths(item, program_dir))
                .collect(),
        ),
        ConfigNode::Mapping(mapping) => ConfigNode::Mapping(
            mapping
                .into_iter()
                .map(|(key, value)| (key, replace_paths(value, program_dir)))
                .collect(),
        ),
        other => other,
    }
}

fn load_mapping(path: &Path) -> Result<IndexMap<String, ConfigNode>, SettingsError> {
    match load_document(path)? {
        ConfigNode::Mapping(mapping) => Ok(mapping),
        other => Err(TreeError::configuration(
            path,
            format!("configuration file must be a mapping, found {}", other.kind()),
        )
        .into()),
    }
}

impl Settings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ConfigNode> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: ConfigNode) {
        self.values.insert(key.into(), value);
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Load the main configuration file, upper-casing its top-level keys.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::MissingConfFile` if `path` does not exist, and
    /// `SettingsError::Load` if it is malformed or not a mapping.
    pub fn load_main(&mut self, path: &Path, program_dir: &Path) -> Result<(), SettingsError> {
        if !path.is_file() {
            return Err(SettingsError::MissingConfFile(path.to_path_buf()));
        }
        debug!("Loading main configuration file {}", path.display());
        for (key, value) in load_mapping(path)? {
            self.values
                .insert(key.to_uppercase(), replace_paths(value, program_dir));
        }
        Ok(())
    }

    /// Load the configuration files of the active command path.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` for any file that cannot be read or parsed.
    pub fn load_command_confs(&mut self, conf_dir: &Path, commands: &[String]) -> Result<(), SettingsError> {
        let mut command_dir = conf_dir.to_path_buf();
        for command in commands {
            let file = command_dir.join(format!("{command}.yml"));
            if file.is_file() {
                debug!("Loading configuration file {}", file.display());
                for (key, value) in load_mapping(&file)? {
                    self.values.insert(key.replace('-', "_").to_uppercase(), value);
                }
            }
            command_dir.push(command);
        }

        if !command_dir.is_dir() {
            return Ok(());
        }
        let read_error = |source: std::io::Error| SettingsError::Read {
            path: command_dir.clone(),
            source,
        };
        let mut entries = fs::read_dir(&command_dir)
            .map_err(read_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(read_error)?;
        entries.sort_by_key(fs::DirEntry::file_name);

        for entry in entries {
            let path = entry.path();
            let hidden = entry.file_name().to_string_lossy().starts_with('.');
            if hidden || !path.is_file() {
                continue;
            }
            let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().to_uppercase()) else {
                continue;
            };
            debug!("Loading configuration file {}", path.display());
            let value = if path.extension().is_some_and(|ext| ext == "yml") {
                load_document(&path)?
            } else {
                let text = fs::read_to_string(&path).map_err(|source| SettingsError::Read {
                    path: path.clone(),
                    source,
                })?;
                ConfigNode::String(text)
            };
            self.values.insert(stem, value);
        }
        Ok(())
    }

    /// Load every source for `commands`, then run `hooks` in order.
    ///
    /// # Errors
    ///
    /// Returns the first loading or hook error.
    pub fn load(paths: &SettingsPaths, commands: &[String], hooks: &[Hook]) -> Result<Self, SettingsError> {
        let mut settings = Self::new();
        settings.load_main(&paths.conf_file, &paths.program_dir)?;
        settings.load_command_confs(&paths.conf_dir, commands)?;
        for hook in hooks {
            hook(&settings)?;
        }
        Ok(settings)
    }

    /// [`Settings::load`], reporting through `logger`: the loaded values at debug level,
    /// or the failure at error level.
    ///
    /// # Errors
    ///
    /// Returns the error of [`Settings::load`] once it has been logged.
    pub fn load_logged(
        paths: &SettingsPaths,
        commands: &[String],
        hooks: &[Hook],
        logger: &Logger,
    ) -> Result<Self, SettingsError> {
        match Self::load(paths, commands, hooks) {
            Ok(settings) => {
                let dump = serde_json::to_string_pretty(&settings.values).unwrap_or_default();
                logger.debug(format!("configuration parameters:\n{dump}"), LogOptions::new());
                Ok(settings)
            }
            Err(e) => {
                logger.error(&e, LogOptions::new());
                Err(e)
            }
        }
    }

    /// Same as [`Settings::load_logged`], but a failure ends the process with exit code 1.
    #[must_use]
    pub fn init(paths: &SettingsPaths, commands: &[String], hooks: &[Hook], logger: &Logger) -> Self {
        match Self::load_logged(paths, commands, hooks, logger) {
            Ok(settings) => settings,
            Err(_) => std::process::exit(1),
        }
    }
}
