//! Command-line interface for the Apigee management client.
//!
//! # Commands
//!
//! - `pull` - export an API proxy revision plus the key-value maps and target
//!   servers it references into a local work tree
//!
//! # Global Options
//!
//! - `--verbose` - debug output
//! - `--quiet` - no log output, errors only
//! - `--config` - config file instead of `~/.apigee/config.toml`
//!
//! Logs go to stderr through `tracing`; `RUST_LOG` takes precedence over the
//! flags when set.
//!
//! ```bash
//! apigee --verbose pull --name orders --environment test --revision 3
//! ```

pub mod pull;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "apigee",
    about = "Apigee Edge management client",
    version,
    long_about = "Pulls Apigee Edge API proxies, with the key-value maps and target servers \
                  they depend on, into a local work tree."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only print errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to the config file
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Export a proxy revision and its environment dependencies
    Pull(pull::PullCommand),
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        self.init_logging();

        match self.command {
            Commands::Pull(cmd) => cmd.execute(self.config).await,
        }
    }

    /// Log filter implied by the flags: `debug`, `off` or `info`.
    #[must_use]
    pub fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "off"
        } else {
            "info"
        }
    }

    fn init_logging(&self) {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(self.log_level())
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    }
}
