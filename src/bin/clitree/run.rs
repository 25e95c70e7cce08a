use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Args;
use log::{debug, info};

use clitree::logger::{ColorScheme, LogConfig, LogOptions, Logger};
use clitree::parser::{CommandLine, ParseArgsError};
use clitree::settings::{Settings, SettingsPaths};
use clitree::tree::CommandTree;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Main configuration file, loaded once logging is set up
    #[arg(long)]
    conf: Option<PathBuf>,

    /// Directory of per-command configuration files (defaults to `<root>/conf`)
    #[arg(long, requires = "conf")]
    conf_dir: Option<PathBuf>,

    /// Program arguments, parsed against the command tree
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

/// Parse `args.args` against the tree, initialize logging and print the parsed values.
///
/// # Errors
///
/// Returns an error if the tree cannot be turned into a command line or logging cannot
/// be set up.
pub fn run(args: &RunArgs, tree: &CommandTree) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let name = tree
        .root
        .canonicalize()
        .ok()
        .and_then(|root| root.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "clitree".to_string());

    let cli = CommandLine::new(&name, tree)?;
    let parsed = match cli.parse_from(std::iter::once(name.clone()).chain(args.args.iter().cloned())) {
        Ok(parsed) => parsed,
        Err(ParseArgsError::Clap(e)) => {
            e.print()?;
            return Ok(ExitCode::from(u8::try_from(e.exit_code()).unwrap_or(2)));
        }
        Err(e) => return Err(e.into()),
    };

    let defaults = LogConfig {
        colors: std::io::stderr().is_terminal().then(ColorScheme::default),
        ..LogConfig::default()
    };
    let logger = Logger::init(&LogConfig::from_args(&parsed, defaults)?)?;
    logger.install()?;
    debug!("Active command path: {:?}", parsed.commands);

    if let Some(conf) = &args.conf {
        let mut paths = SettingsPaths::new(tree.root.clone()).with_conf_file(conf);
        if let Some(conf_dir) = &args.conf_dir {
            paths.conf_dir.clone_from(conf_dir);
        }
        let settings = Settings::init(&paths, &parsed.commands, &[], &logger);
        info!("Loaded {} settings", settings.len());
    }

    println!("{}", serde_json::to_string_pretty(&parsed.values)?);
    logger.ok(format!("{name} {}", parsed.command_path()).trim_end(), LogOptions::new());
    Ok(ExitCode::SUCCESS)
}
