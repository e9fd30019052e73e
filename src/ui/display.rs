use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;

use crate::container::ExecutionUnit;
use crate::manifest::SubSpecStatus;

/// Progress lines printed while the scheduler runs.
///
/// Everything goes to stdout except errors; `quiet` suppresses all of it.
#[derive(Default)]
pub struct ParallelDisplay {
    quiet: bool,
    spinner: Option<ProgressBar>,
}

impl ParallelDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn quiet() -> Self {
        Self {
            quiet: true,
            spinner: None,
        }
    }

    pub fn run_header(&self, spec: &str, total: usize, complete: usize, parallel: u32) {
        if self.quiet {
            return;
        }
        println!("{}", format!("Parallel Full Mode: {}", spec).bold());
        println!("  Sub-specs: {} ({} complete)", total, complete);
        println!("  Max parallel: {}", parallel);
        println!();
    }

    pub fn stale_reset(&self, names: &[String]) {
        if self.quiet || names.is_empty() {
            return;
        }
        println!(
            "{}",
            format!(
                "Resetting {} interrupted sub-spec(s) to pending: {}",
                names.len(),
                names.join(", ")
            )
            .yellow()
        );
    }

    pub fn batch_started(&self, batch: &[String]) {
        if self.quiet {
            return;
        }
        println!();
        println!(
            "{}",
            format!("Launching batch of {} sub-specs:", batch.len()).cyan()
        );
    }

    pub fn unit_launched(&self, unit: &ExecutionUnit) {
        if self.quiet {
            return;
        }
        println!("  {}", format!("-> {}", unit.sub_spec).green());
        println!("    Container: {}", unit.container_name);
        println!("    Branch: {}", unit.branch);
    }

    pub fn launch_failed(&self, sub_spec: &str, error: &str) {
        if self.quiet {
            return;
        }
        println!("  {}", format!("-> {}", sub_spec).green());
        eprintln!("    {}", format!("Failed to launch: {}", error).red());
    }

    /// Show a spinner until [`ParallelDisplay::finish_waiting`].
    pub fn waiting(&mut self, count: usize) {
        if self.quiet {
            return;
        }
        println!();
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg} [{elapsed}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.set_message(format!("Waiting for {} containers to complete...", count));
        spinner.enable_steady_tick(Duration::from_millis(120));
        self.spinner = Some(spinner);
    }

    pub fn finish_waiting(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }

    /// Result of one unit after integration.
    pub fn unit_finished(&self, sub_spec: &str, exit_code: Option<i32>, status: SubSpecStatus) {
        if self.quiet {
            return;
        }
        match status {
            SubSpecStatus::Complete => {
                println!("  {}", format!("{} completed (exit 0)", sub_spec).green());
                println!("  {}", format!("{} merged successfully", sub_spec).green());
            }
            SubSpecStatus::MergeConflict => {
                println!("  {}", format!("{} completed (exit 0)", sub_spec).green());
                println!(
                    "  {}",
                    format!("{} has merge conflicts - needs manual resolution", sub_spec).red()
                );
            }
            _ => match exit_code {
                Some(code) => println!("  {}", format!("{} failed (exit {})", sub_spec, code).red()),
                None => println!("  {}", format!("{} failed", sub_spec).red()),
            },
        }
    }

    pub fn progress(&self, complete: usize, total: usize) {
        if self.quiet {
            return;
        }
        println!();
        println!(
            "{}",
            format!("Progress: {}/{} sub-specs complete", complete, total).cyan()
        );
    }

    pub fn interrupted(&self, stopped: usize) {
        if self.quiet {
            return;
        }
        eprintln!(
            "{}",
            format!("Interrupted: stopped {} execution unit(s)", stopped).yellow()
        );
    }

    /// Closing summary. `unfinished` lists failed and conflicted sub-specs.
    pub fn summary(
        &self,
        spec: &str,
        complete: usize,
        total: usize,
        unfinished: &[(String, SubSpecStatus)],
    ) {
        if self.quiet {
            return;
        }
        println!();
        if complete == total {
            println!("{}", "All sub-specs completed successfully!".green().bold());
            println!();
            println!("Run \"ralph full {}\" for master completion check", spec);
            return;
        }

        println!("{}/{} sub-specs completed", complete, total);
        if !unfinished.is_empty() {
            println!();
            println!("{}", "Failed sub-specs:".red());
            for (name, status) in unfinished {
                println!("{}", format!("  - {} ({})", name, status).red());
            }
        }
    }
}
