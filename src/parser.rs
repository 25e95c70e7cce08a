//! Bridge between an assembled [`CommandTree`] and `clap`.
//!
//! The tree uses the following keys for each command:
//!
//! - `help`, `description`, `epilog`: texts shown by `--help`
//! - `options`: named options (`--name`), keyed by destination name
//! - `args`: positional arguments, in order
//! - `subparsers`: `title`, `dest`, `required` and the `parsers` mapping of subcommands
//!
//! and for each option or argument: `short`, `help`, `metavar`, `default`, `required`,
//! `choices`, `type`, `nargs` (`?`, `*`, `+` or a count) and `action` (`store`,
//! `store_true`, `store_false`, `append`, `count`).

use std::ffi::{OsStr, OsString};
use std::sync::Arc;

use clap::builder::{PossibleValue, TypedValueParser, ValueRange};
use clap::error::ErrorKind;
use clap::{Arg, ArgAction, ArgMatches};
use indexmap::IndexMap;
use thiserror::Error;

use crate::node::{ConfigNode, Mapping};
use crate::tree::{CommandTree, PARSERS, SUBPARSERS};
use crate::types::{StringType, TypeConverter, TypeRegistry};

#[derive(Error, Debug)]
pub enum ParseArgsError {
    #[error(transparent)]
    Clap(#[from] clap::Error),
    #[error("Invalid definition of command `{command}`: {message}")]
    Definition { command: String, message: String },
}

/// Arguments parsed against a command tree
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedArgs {
    /// Active subcommand path, outermost first
    pub commands: Vec<String>,
    /// Every option and argument of the active path, plus one `dest` entry per level
    pub values: IndexMap<String, ConfigNode>,
}

impl ParsedArgs {
    /// Value of `key`, treating `null` as absent
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ConfigNode> {
        self.values.get(key).filter(|value| !value.is_null())
    }

    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(ConfigNode::as_str)
    }

    #[must_use]
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(ConfigNode::as_bool)
    }

    #[must_use]
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(ConfigNode::as_i64)
    }

    /// Active subcommands joined with `-`
    #[must_use]
    pub fn command_path(&self) -> String {
        self.commands.join("-")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Store,
    StoreTrue,
    StoreFalse,
    Append,
    Count,
}

impl Action {
    fn parse(value: &str) -> Result<Self, String> {
        match value {
            "store" => Ok(Action::Store),
            "store_true" => Ok(Action::StoreTrue),
            "store_false" => Ok(Action::StoreFalse),
            "append" => Ok(Action::Append),
            "count" => Ok(Action::Count),
            other => Err(format!("unknown action `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Nargs {
    Optional,
    Any,
    AtLeastOne,
    Exactly(usize),
}

impl Nargs {
    fn parse(node: &ConfigNode) -> Result<Self, String> {
        match node {
            ConfigNode::String(s) if s == "?" => Ok(Nargs::Optional),
            ConfigNode::String(s) if s == "*" => Ok(Nargs::Any),
            ConfigNode::String(s) if s == "+" => Ok(Nargs::AtLeastOne),
            ConfigNode::Integer(n) if *n > 0 => usize::try_from(*n)
                .map(Nargs::Exactly)
                .map_err(|e| e.to_string()),
            other => Err(format!("invalid nargs `{other}`")),
        }
    }

    fn range(self) -> ValueRange {
        match self {
            Nargs::Optional => ValueRange::new(0..=1),
            Nargs::Any => ValueRange::new(0..),
            Nargs::AtLeastOne => ValueRange::new(1..),
            Nargs::Exactly(n) => ValueRange::new(n),
        }
    }

    fn is_multiple(self) -> bool {
        !matches!(self, Nargs::Optional | Nargs::Exactly(1))
    }

    fn is_optional(self) -> bool {
        matches!(self, Nargs::Optional | Nargs::Any)
    }
}

#[derive(Debug, Clone)]
struct Param {
    id: String,
    action: Action,
    multiple: bool,
    default: Option<ConfigNode>,
}

#[derive(Debug, Clone, Default)]
struct CommandPlan {
    params: Vec<Param>,
    dest: String,
    subcommands: IndexMap<String, CommandPlan>,
}

/// Value parser converting raw strings through a [`TypeConverter`]
#[derive(Clone)]
struct NodeParser {
    converter: Arc<dyn TypeConverter>,
    choices: Vec<String>,
}

impl TypedValueParser for NodeParser {
    type Value = ConfigNode;

    fn parse_ref(
        &self,
        cmd: &clap::Command,
        arg: Option<&Arg>,
        value: &OsStr,
    ) -> Result<Self::Value, clap::Error> {
        let arg_name = arg.map_or_else(|| "...".to_string(), ToString::to_string);
        let raw = value.to_str().ok_or_else(|| {
            clap::Error::raw(
                ErrorKind::InvalidUtf8,
                format!("invalid UTF-8 value for '{arg_name}'\n"),
            )
            .with_cmd(cmd)
        })?;
        if !self.choices.is_empty() && !self.choices.iter().any(|choice| choice == raw) {
            return Err(clap::Error::raw(
                ErrorKind::InvalidValue,
                format!(
                    "invalid value '{raw}' for '{arg_name}' [possible values: {}]\n",
                    self.choices.join(", ")
                ),
            )
            .with_cmd(cmd));
        }
        self.converter.convert(raw).map_err(|message| {
            clap::Error::raw(
                ErrorKind::ValueValidation,
                format!("invalid value '{raw}' for '{arg_name}': {message}\n"),
            )
            .with_cmd(cmd)
        })
    }

    fn possible_values(&self) -> Option<Box<dyn Iterator<Item = PossibleValue> + '_>> {
        if self.choices.is_empty() {
            return None;
        }
        Some(Box::new(
            self.choices.iter().map(|choice| PossibleValue::new(choice.clone())),
        ))
    }
}

fn str_key<'a>(definition: &'a Mapping, key: &str) -> Option<&'a str> {
    definition.get(key).and_then(ConfigNode::as_str)
}

fn bool_key(definition: &Mapping, key: &str) -> bool {
    definition
        .get(key)
        .and_then(ConfigNode::as_bool)
        .unwrap_or(false)
}

fn definition_error(command: &str, message: impl Into<String>) -> ParseArgsError {
    ParseArgsError::Definition {
        command: command.to_string(),
        message: message.into(),
    }
}

/// A `clap` command built from a command tree
#[derive(Debug, Clone)]
pub struct CommandLine {
    command: clap::Command,
    plan: CommandPlan,
}

impl CommandLine {
    /// Build the command line of program `name` from `tree`.
    ///
    /// # Errors
    ///
    /// Returns `ParseArgsError::Definition` when the tree uses an unknown action, type
    /// or malformed option definition.
    pub fn new(name: &str, tree: &CommandTree) -> Result<Self, ParseArgsError> {
        let (command, plan) = build_command(name, &tree.document, &tree.types, 0)?;
        Ok(Self { command, plan })
    }

    #[must_use]
    pub fn command(&self) -> &clap::Command {
        &self.command
    }

    /// Parse `args`; the first item is the program name, as with `std::env::args_os`.
    ///
    /// # Errors
    ///
    /// Returns `ParseArgsError::Clap` for invalid arguments, including `--help`
    /// requests, which callers usually hand to `clap::Error::exit`.
    pub fn parse_from<I, T>(&self, args: I) -> Result<ParsedArgs, ParseArgsError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = self.command.clone().try_get_matches_from(args)?;
        let mut parsed = ParsedArgs::default();
        collect(&self.plan, &matches, &mut parsed);
        Ok(parsed)
    }
}

fn build_command(
    name: &str,
    definition: &Mapping,
    types: &TypeRegistry,
    depth: usize,
) -> Result<(clap::Command, CommandPlan), ParseArgsError> {
    let mut command = clap::Command::new(name.to_string());
    if let Some(about) = str_key(definition, "help").or_else(|| str_key(definition, "description")) {
        command = command.about(about.to_string());
    }
    if let Some(description) = str_key(definition, "description") {
        command = command.long_about(description.to_string());
    }
    if let Some(epilog) = str_key(definition, "epilog") {
        command = command.after_help(epilog.to_string());
    }

    let mut plan = CommandPlan {
        dest: format!("command{depth}"),
        ..CommandPlan::default()
    };

    for (section, positional) in [("options", false), ("args", true)] {
        let Some(params) = definition.get(section) else {
            continue;
        };
        let params = params
            .as_mapping()
            .ok_or_else(|| definition_error(name, format!("`{section}` must be a mapping")))?;
        for (id, param_definition) in params {
            let (arg, param) = build_arg(id, param_definition, positional, types)
                .map_err(|message| definition_error(name, format!("`{id}`: {message}")))?;
            command = command.arg(arg);
            plan.params.push(param);
        }
    }

    if let Some(subparsers) = definition.get(SUBPARSERS).and_then(ConfigNode::as_mapping) {
        if let Some(dest) = str_key(subparsers, "dest") {
            plan.dest = dest.to_string();
        }
        if let Some(title) = str_key(subparsers, "title") {
            command = command.subcommand_help_heading(title.to_string());
        }
        if bool_key(subparsers, "required") {
            command = command.subcommand_required(true).arg_required_else_help(true);
        }
        if let Some(parsers) = subparsers.get(PARSERS).and_then(ConfigNode::as_mapping) {
            for (sub_name, sub_definition) in parsers {
                let sub_definition = sub_definition.as_mapping().ok_or_else(|| {
                    definition_error(sub_name, "subcommand definition must be a mapping")
                })?;
                let (subcommand, sub_plan) = build_command(sub_name, sub_definition, types, depth + 1)?;
                command = command.subcommand(subcommand);
                plan.subcommands.insert(sub_name.clone(), sub_plan);
            }
        }
    }

    Ok((command, plan))
}

fn build_arg(
    id: &str,
    definition: &ConfigNode,
    positional: bool,
    types: &TypeRegistry,
) -> Result<(Arg, Param), String> {
    let empty = Mapping::new();
    let definition = match definition {
        ConfigNode::Mapping(mapping) => mapping,
        ConfigNode::Null => &empty,
        other => return Err(format!("definition must be a mapping, found {}", other.kind())),
    };

    let action = str_key(definition, "action").map_or(Ok(Action::Store), Action::parse)?;
    if positional && action != Action::Store {
        return Err("positional arguments only support the `store` action".to_string());
    }
    let nargs = definition.get("nargs").map(Nargs::parse).transpose()?;

    let mut arg = Arg::new(id.to_string());
    if !positional {
        arg = arg.long(id.replace('_', "-"));
        if let Some(short) = str_key(definition, "short") {
            let mut chars = short.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => arg = arg.short(c),
                _ => return Err(format!("`short` must be a single character, got `{short}`")),
            }
        }
    }
    if let Some(help) = str_key(definition, "help") {
        arg = arg.help(help.to_string());
    }
    if let Some(metavar) = str_key(definition, "metavar") {
        arg = arg.value_name(metavar.to_string());
    }

    let mut param = Param {
        id: id.to_string(),
        action,
        multiple: false,
        default: None,
    };

    match action {
        Action::StoreTrue => arg = arg.action(ArgAction::SetTrue),
        Action::StoreFalse => arg = arg.action(ArgAction::SetFalse),
        Action::Count => arg = arg.action(ArgAction::Count),
        Action::Store | Action::Append => {
            let converter: Arc<dyn TypeConverter> = match str_key(definition, "type") {
                Some(type_name) => types
                    .get(type_name)
                    .cloned()
                    .ok_or_else(|| format!("unknown type `{type_name}`"))?,
                None => Arc::new(StringType),
            };
            let choices = definition
                .get("choices")
                .map(|choices| {
                    choices
                        .as_sequence()
                        .map(|items| items.iter().map(ToString::to_string).collect::<Vec<_>>())
                        .ok_or("`choices` must be a list")
                })
                .transpose()?
                .unwrap_or_default();

            param.default = match definition.get("default") {
                Some(ConfigNode::String(raw)) if definition.contains_key("type") => {
                    Some(converter.convert(raw).map_err(|e| format!("invalid default: {e}"))?)
                }
                Some(default) => Some(default.clone()),
                None => None,
            };
            param.multiple = action == Action::Append || nargs.is_some_and(Nargs::is_multiple);

            arg = arg
                .value_parser(NodeParser { converter, choices })
                .action(if action == Action::Append {
                    ArgAction::Append
                } else {
                    ArgAction::Set
                });
            if let Some(nargs) = nargs {
                arg = arg.num_args(nargs.range());
            }

            let required = if positional {
                param.default.is_none() && !nargs.is_some_and(Nargs::is_optional)
            } else {
                bool_key(definition, "required")
            };
            arg = arg.required(required);
        }
    }

    Ok((arg, param))
}

fn collect(plan: &CommandPlan, matches: &ArgMatches, parsed: &mut ParsedArgs) {
    for param in &plan.params {
        let value = match param.action {
            Action::StoreTrue | Action::StoreFalse => Some(ConfigNode::Bool(matches.get_flag(&param.id))),
            Action::Count => Some(ConfigNode::Integer(i64::from(matches.get_count(&param.id)))),
            Action::Store | Action::Append if param.multiple => matches
                .get_many::<ConfigNode>(&param.id)
                .map(|values| ConfigNode::Sequence(values.cloned().collect())),
            Action::Store | Action::Append => matches.get_one::<ConfigNode>(&param.id).cloned(),
        };
        let value = value
            .or_else(|| param.default.clone())
            .unwrap_or_default();
        parsed.values.insert(param.id.clone(), value);
    }

    if let Some((name, sub_matches)) = matches.subcommand()
        && let Some(sub_plan) = plan.subcommands.get(name)
    {
        parsed.commands.push(name.to_string());
        parsed.values.insert(plan.dest.clone(), ConfigNode::from(name));
        collect(sub_plan, sub_matches, parsed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::parse_document;
    use std::path::{Path, PathBuf};

    fn tree(yaml: &str) -> CommandTree {
        let ConfigNode::Mapping(document) = parse_document(yaml, Path::new("tree.yml")).unwrap() else {
            panic!("tree must be a mapping");
        };
        CommandTree {
            root: PathBuf::from("."),
            document,
            types: TypeRegistry::builtin(),
        }
    }

    const DEMO: &str = r#"
description: demo program
options:
  loglevel:
    short: l
    default: info
    choices: [debug, info, warn]
  dry_run:
    action: store_true
  verbose:
    short: v
    action: count
  include:
    action: append
  port:
    type: int
    default: "8080"
args:
  target:
    help: what to act on
"#;

    #[test]
    fn test_options_and_arguments() {
        let cli = CommandLine::new("demo", &tree(DEMO)).unwrap();
        let args = cli
            .parse_from([
                "demo", "-l", "debug", "--dry-run", "-vv", "--include", "a", "--include", "b", "x",
            ])
            .unwrap();

        assert!(args.commands.is_empty());
        assert_eq!(args.get_str("loglevel"), Some("debug"));
        assert_eq!(args.get_bool("dry_run"), Some(true));
        assert_eq!(args.get_i64("verbose"), Some(2));
        assert_eq!(
            args.get("include"),
            Some(&ConfigNode::Sequence(vec!["a".into(), "b".into()]))
        );
        assert_eq!(args.get_i64("port"), Some(8080));
        assert_eq!(args.get_str("target"), Some("x"));
    }

    #[test]
    fn test_defaults_apply_when_absent() {
        let cli = CommandLine::new("demo", &tree(DEMO)).unwrap();
        let args = cli.parse_from(["demo", "x"]).unwrap();
        assert_eq!(args.get_str("loglevel"), Some("info"));
        assert_eq!(args.get_bool("dry_run"), Some(false));
        assert_eq!(args.get_i64("verbose"), Some(0));
        assert_eq!(args.get("include"), None);
    }

    #[test]
    fn test_choices_are_enforced() {
        let cli = CommandLine::new("demo", &tree(DEMO)).unwrap();
        match cli.parse_from(["demo", "-l", "loud", "x"]) {
            Err(ParseArgsError::Clap(e)) => assert_eq!(e.kind(), ErrorKind::InvalidValue),
            other => panic!("Expected clap error, got: {other:?}"),
        }
    }

    #[test]
    fn test_typed_value_is_converted() {
        let cli = CommandLine::new("demo", &tree(DEMO)).unwrap();
        match cli.parse_from(["demo", "--port", "eighty", "x"]) {
            Err(ParseArgsError::Clap(e)) => assert_eq!(e.kind(), ErrorKind::ValueValidation),
            other => panic!("Expected clap error, got: {other:?}"),
        }
        let args = cli.parse_from(["demo", "--port", "81", "x"]).unwrap();
        assert_eq!(args.get_i64("port"), Some(81));
    }

    #[test]
    fn test_subcommand_path_and_dest() {
        let cli = CommandLine::new(
            "demo",
            &tree(
                r"
subparsers:
  parsers:
    deploy:
      help: deploy things
      options:
        force:
          action: store_true
      subparsers:
        dest: target_kind
        parsers:
          app:
            args:
              name: {}
",
            ),
        )
        .unwrap();

        let args = cli.parse_from(["demo", "deploy", "--force", "app", "web"]).unwrap();
        assert_eq!(args.commands, ["deploy", "app"]);
        assert_eq!(args.command_path(), "deploy-app");
        assert_eq!(args.get_str("command0"), Some("deploy"));
        assert_eq!(args.get_str("target_kind"), Some("app"));
        assert_eq!(args.get_bool("force"), Some(true));
        assert_eq!(args.get_str("name"), Some("web"));
    }

    #[test]
    fn test_required_subcommand() {
        let cli = CommandLine::new(
            "demo",
            &tree("subparsers:\n  required: true\n  parsers:\n    run: {}\n"),
        )
        .unwrap();
        assert!(cli.parse_from(["demo"]).is_err());
        assert_eq!(cli.parse_from(["demo", "run"]).unwrap().commands, ["run"]);
    }

    #[test]
    fn test_nargs() {
        let cli = CommandLine::new(
            "demo",
            &tree("options:\n  pair:\n    nargs: 2\nargs:\n  files:\n    nargs: '+'\n    type: path\n"),
        )
        .unwrap();
        let args = cli.parse_from(["demo", "--pair", "a", "b", "x", "y"]).unwrap();
        assert_eq!(
            args.get("pair"),
            Some(&ConfigNode::Sequence(vec!["a".into(), "b".into()]))
        );
        assert_eq!(
            args.get("files"),
            Some(&ConfigNode::Sequence(vec!["x".into(), "y".into()]))
        );
        assert!(cli.parse_from(["demo"]).is_err());
    }

    #[test]
    fn test_optional_positional() {
        let cli = CommandLine::new("demo", &tree("args:\n  name:\n    nargs: '?'\n")).unwrap();
        assert_eq!(cli.parse_from(["demo"]).unwrap().get("name"), None);
        assert_eq!(cli.parse_from(["demo", "x"]).unwrap().get_str("name"), Some("x"));
    }

    #[test]
    fn test_unknown_type_is_a_definition_error() {
        match CommandLine::new("demo", &tree("options:\n  port:\n    type: port\n")) {
            Err(ParseArgsError::Definition { command, message }) => {
                assert_eq!(command, "demo");
                assert!(message.contains("unknown type `port`"), "message: {message}");
            }
            other => panic!("Expected definition error, got: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_action_is_a_definition_error() {
        assert!(matches!(
            CommandLine::new("demo", &tree("options:\n  x:\n    action: store_const\n")),
            Err(ParseArgsError::Definition { .. })
        ));
    }
}
