//! Command-line interface.

use clap::{Args, Parser, Subcommand};

use crate::config::RalphConfig;

#[derive(Parser, Debug)]
#[command(
    name = "ralph",
    version,
    about = "Run decomposed specs in isolated containers and merge their branches"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn verbose(&self) -> bool {
        match &self.command {
            Command::ParallelFull(args) => args.verbose,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run every sub-spec of a decomposed spec in parallel containers
    #[command(name = "parallel-full")]
    ParallelFull(ParallelFullArgs),
}

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct ParallelFullArgs {
    /// Spec name, as in .ralph/specs/<SPEC>.md
    pub spec: String,

    /// Maximum number of containers running at once [default: 3]
    #[arg(short = 'j', long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    pub parallel: Option<u32>,

    /// Iteration ceiling for each sub-spec [default: 100]
    #[arg(short = 'n', long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    pub iterations: Option<u32>,

    /// Pass --verbose to containers and enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Branch sub-spec branches start from [default: current branch]
    #[arg(long, value_name = "NAME")]
    pub base_branch: Option<String>,

    /// Seconds between container state polls [default: 10]
    #[arg(long, value_name = "SECONDS", value_parser = clap::value_parser!(u64).range(1..))]
    pub poll_interval: Option<u64>,

    /// Stop a container that runs longer than this many seconds
    #[arg(long, value_name = "SECONDS", value_parser = clap::value_parser!(u64).range(1..))]
    pub unit_timeout: Option<u64>,
}

impl ParallelFullArgs {
    /// Apply flags on top of file and environment configuration.
    pub fn apply(&self, config: &mut RalphConfig) {
        if let Some(parallel) = self.parallel {
            config.parallel = parallel;
        }
        if let Some(iterations) = self.iterations {
            config.iterations = iterations;
        }
        if let Some(poll_interval) = self.poll_interval {
            config.poll_interval_secs = poll_interval;
        }
        if let Some(unit_timeout) = self.unit_timeout {
            config.unit_timeout_secs = Some(unit_timeout);
        }
    }
}
