//! Core implementation of the clitree command-line scaffold
//!
//! clitree builds a command/subcommand tree from a directory of YAML documents, resolves
//! `_anchor_` references and `<<<` merges across them, turns the tree into a `clap`
//! command line, and configures a layered logger from the parsed arguments.

use std::path::Path;

use crate::error::TreeError;
use crate::tree::{CommandTree, TreeLoader};

pub mod anchors;
pub mod document;
pub mod error;
pub mod logger;
pub mod node;
pub mod parser;
pub mod resolver;
pub mod settings;
pub mod tree;
pub mod types;

/// Assemble the command tree under `root` with the default layout and built-in types.
///
/// # Errors
///
/// Returns `TreeError` if any document of the tree is unreadable, malformed, references
/// an unknown anchor or breaks the tree structure.
pub fn load_command_tree(root: &Path) -> Result<CommandTree, TreeError> {
    TreeLoader::new().assemble(root)
}
