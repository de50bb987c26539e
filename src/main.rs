//! bess-energy entry point: logging setup and command dispatch.

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use bess_energy::cli::{self, Command};
use bess_energy::config::AppConfig;
use bess_energy::pipeline::run_daily;

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout carries only the output paths.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match cli::parse_args().command {
        Command::Run { config } => {
            let cfg = AppConfig::load(&config)
                .with_context(|| format!("loading configuration from {}", config.display()))?;
            let summary = run_daily(&cfg).context("daily energy run failed")?;
            eprintln!("{summary}");
            for path in summary.output_paths() {
                println!("{}", path.display());
            }
        }
        Command::Version => println!("{}", cli::version()),
        Command::Hello => println!("bess-energy is installed and the CLI works"),
    }
    Ok(())
}
