use clap::Parser;
use owo_colors::OwoColorize;
use tracing_subscriber::EnvFilter;

use ralph_wiggum::cli::Cli;
use ralph_wiggum::commands;

/// Environment variable holding a `tracing` filter directive.
const LOG_ENV_VAR: &str = "RALPH_LOG";

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose());

    let code = match commands::dispatch(cli.command).await {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(category = ?err.classify(), "{}", err);
            eprintln!("\n  {} {}\n", "Error:".red().bold(), err);
            err.exit_code()
        }
    };
    std::process::exit(code);
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "warn,ralph_wiggum=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
