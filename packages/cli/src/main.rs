//! jsontree CLI

use std::path::PathBuf;

use clap::Parser;

use jsontree::{Config, DB};
use jsontree_cli::{execute, CliError, Command};

#[derive(Parser, Debug)]
#[command(name = "jsontree")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding the store
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// JSON configuration file; --root overrides its root
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print JSON on a single line
    #[arg(long)]
    compact: bool,

    #[command(subcommand)]
    command: Command,
}

impl Args {
    fn store_config(&self) -> Result<Config, CliError> {
        let config = match (&self.config, &self.root) {
            (Some(file_path), root) => {
                let config = Config::from_json_file(file_path)?;
                match root {
                    Some(root) => Config {
                        root: root.clone(),
                        ..config
                    },
                    None => config,
                }
            }
            (None, Some(root)) => Config::new(root),
            (None, None) => return Err(CliError::MissingRoot),
        };

        // Only `watch` outlives the command, and mutations are pushed
        // explicitly before exit.
        Ok(config
            .with_unwatch(!self.command.watches())
            .with_instant_push(false))
    }
}

fn run(args: Args) -> Result<(), CliError> {
    let db = DB::open(args.store_config()?)?;
    if let Some(output) = execute(&args.command, &db, !args.compact)? {
        println!("{}", output);
    }
    Ok(())
}

fn main() {
    env_logger::init();

    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
