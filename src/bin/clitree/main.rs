mod run;
mod show;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use clitree::load_command_tree;

#[derive(Parser, Debug)]
#[command(name = "clitree", about = "Assemble and exercise YAML command trees")]
struct Cli {
    /// Directory holding the command tree
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the assembled command tree
    Show(show::ShowArgs),
    /// Parse arguments against the command tree and set up logging
    Run(run::RunArgs),
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let tree = load_command_tree(&cli.root)?;

    match cli.command {
        Commands::Show(ref args) => show::run(args, &tree),
        Commands::Run(ref args) => run::run(args, &tree),
    }
}
