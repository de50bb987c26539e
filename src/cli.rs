//! Command-line surface.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Default configuration file looked up in the working directory.
pub const DEFAULT_CONFIG: &str = "config.toml";

#[derive(Parser, Debug)]
#[command(name = "bess-energy")]
#[command(about = "Daily charged/discharged energy per BESS enclosure")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Load the config, run the daily pipeline and print the output paths
    Run {
        /// Path to the TOML configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,
    },
    /// Print the installed version
    Version,
    /// Sanity check that the tool is installed
    Hello,
}

/// Parses the process arguments; exits with usage on error.
pub fn parse_args() -> Cli {
    Cli::parse()
}

/// Parses an explicit argument list (program name first).
///
/// # Errors
///
/// Returns clap's error for unknown commands or malformed options.
pub fn parse_args_from<I, T>(args: I) -> Result<Cli, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    Cli::try_parse_from(args)
}

/// Version string printed by `version`.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
