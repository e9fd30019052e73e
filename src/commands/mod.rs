//! Subcommand entry points.

pub mod parallel_full;

use crate::cli::Command;
use crate::error::RalphResult;

/// Run a parsed subcommand, returning the process exit code.
pub async fn dispatch(command: Command) -> RalphResult<i32> {
    match command {
        Command::ParallelFull(args) => parallel_full::run(&args).await,
    }
}
