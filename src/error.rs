use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading a command tree
#[derive(Error, Debug)]
pub enum TreeError {
    #[error("Unable to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Unable to parse YAML file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("({path}) invalid anchor '{anchor}'")]
    UnknownAnchor { path: PathBuf, anchor: String },
    #[error("Invalid configuration in {path}: {message}")]
    Configuration { path: PathBuf, message: String },
}

impl TreeError {
    pub(crate) fn configuration(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        TreeError::Configuration {
            path: path.into(),
            message: message.into(),
        }
    }

    /// File the error originates from
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        match self {
            TreeError::Io { path, .. }
            | TreeError::Parse { path, .. }
            | TreeError::UnknownAnchor { path, .. }
            | TreeError::Configuration { path, .. } => path,
        }
    }
}
