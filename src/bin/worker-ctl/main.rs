//! Worker control CLI - create, start, stop and clean up worker environments

mod cli;
mod commands;
mod logging;

use clap::Parser;
use cli::{Cli, Commands};
use console::style;

fn main() {
    let cli = Cli::parse();

    logging::init_logger(cli.verbose);

    let result = match cli.command {
        Commands::New { path, image } => {
            commands::resolve_env(&path.path).and_then(|env| commands::new_env(&env, &image))
        }
        Commands::Up {
            path,
            image,
            options,
            detach,
        } => commands::resolve_env(&path.path)
            .and_then(|env| commands::up(&env, &image, options.as_deref(), detach)),
        Commands::Down { path } => {
            commands::resolve_env(&path.path).and_then(|env| commands::down(&env))
        }
        Commands::Status { path } => {
            commands::resolve_env(&path.path).and_then(|env| commands::status(&env))
        }
        Commands::ForceCleanup { path } => {
            match commands::resolve_env(&path.path) {
                Ok(env) => commands::cleanup(&env),
                Err(e) => eprintln!("{} {}", style("warning:").yellow().bold(), e),
            }
            return;
        }
    };

    if let Err(e) = result {
        eprintln!("{} {}", style("error:").red().bold(), e);
        std::process::exit(1);
    }
}
