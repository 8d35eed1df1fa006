use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use worker_env::DEFAULT_BASE_IMAGE;

pub const DEFAULT_ENV_PATH: &str = "default-worker";

#[derive(Parser, Debug)]
#[command(name = "worker-ctl")]
#[command(version, about = "Manage a sandboxing worker and its environment", long_about = None)]
#[command(after_help = "EXAMPLES:
    # Create an environment and start a worker in it
    worker-ctl new -p ./my-worker
    worker-ctl up -p ./my-worker -d

    # Start with config overrides
    worker-ctl up -o worker_port=5001,limits.mem_mb=128 -d

    # Stop, inspect, clean up after a crash
    worker-ctl status
    worker-ctl down
    worker-ctl force-cleanup
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Show verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Args, Debug, Clone)]
pub struct PathArg {
    /// Worker environment directory
    #[arg(short, long, value_name = "PATH", default_value = DEFAULT_ENV_PATH)]
    pub path: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a worker environment
    New {
        #[command(flatten)]
        path: PathArg,

        /// Container image used as the base filesystem
        #[arg(short, long, value_name = "IMAGE", default_value = DEFAULT_BASE_IMAGE)]
        image: String,
    },

    /// Start a worker, creating the environment if needed
    Up {
        #[command(flatten)]
        path: PathArg,

        /// Container image used if the environment must be created
        #[arg(short, long, value_name = "IMAGE", default_value = DEFAULT_BASE_IMAGE)]
        image: String,

        /// Config overrides, e.g. worker_port=5001,limits.mem_mb=128
        #[arg(short, long, value_name = "KEY=VAL,...")]
        options: Option<String>,

        /// Run in the background and wait until the worker is ready
        #[arg(short, long)]
        detach: bool,
    },

    /// Stop a running worker
    Down {
        #[command(flatten)]
        path: PathArg,
    },

    /// Query a running worker
    Status {
        #[command(flatten)]
        path: PathArg,
    },

    /// Remove cgroups, mounts and the PID file left by a dead worker
    ForceCleanup {
        #[command(flatten)]
        path: PathArg,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_up_with_everything() {
        let cli = Cli::try_parse_from([
            "worker-ctl",
            "-v",
            "up",
            "--path",
            "/srv/env",
            "-i",
            "alpine",
            "-o",
            "worker_port=6000",
            "-d",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Up {
                path,
                image,
                options,
                detach,
            } => {
                assert_eq!(path.path, PathBuf::from("/srv/env"));
                assert_eq!(image, "alpine");
                assert_eq!(options.as_deref(), Some("worker_port=6000"));
                assert!(detach);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["worker-ctl", "new"]).unwrap();
        match cli.command {
            Commands::New { path, image } => {
                assert_eq!(path.path, PathBuf::from(DEFAULT_ENV_PATH));
                assert_eq!(image, DEFAULT_BASE_IMAGE);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_force_cleanup_and_verbose_after_subcommand() {
        let cli = Cli::try_parse_from(["worker-ctl", "force-cleanup", "-p", "x", "--verbose"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::ForceCleanup { .. }));
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["worker-ctl"]).is_err());
        assert!(Cli::try_parse_from(["worker-ctl", "down", "-o", "a=b"]).is_err());
    }
}
