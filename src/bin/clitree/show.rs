use std::process::ExitCode;

use clap::Args;

use clitree::tree::CommandTree;

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Print JSON instead of YAML
    #[arg(long)]
    json: bool,

    /// List the registered argument types instead of the tree
    #[arg(long, conflicts_with = "json")]
    types: bool,

    /// Subcommand path to print instead of the whole tree
    command: Vec<String>,
}

/// Print the tree, or the part of it reached by `args.command`.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn run(args: &ShowArgs, tree: &CommandTree) -> Result<ExitCode, Box<dyn std::error::Error>> {
    if args.types {
        for name in tree.types.names() {
            println!("{name}");
        }
        return Ok(ExitCode::SUCCESS);
    }

    let path: Vec<&str> = args.command.iter().map(String::as_str).collect();
    let Some(definition) = tree.command(&path) else {
        eprintln!("Error: no command `{}` in {}", path.join(" "), tree.root.display());
        return Ok(ExitCode::FAILURE);
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(definition)?);
    } else {
        print!("{}", serde_yaml::to_string(definition)?);
    }
    Ok(ExitCode::SUCCESS)
}
