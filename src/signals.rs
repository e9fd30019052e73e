//! Ctrl-C / SIGTERM handling for a parallel run.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use owo_colors::OwoColorize;
use tokio::sync::watch;

use crate::container::UnitTracker;
use crate::error::INTERRUPTED_EXIT_CODE;

/// Install the process signal handler.
///
/// The first signal asks the scheduler to stop through `cancel`; it then
/// stops and removes its units and persists statuses. A second signal
/// force-removes every tracked unit and exits immediately.
pub fn install(cancel: Arc<watch::Sender<bool>>, tracker: UnitTracker) -> Result<(), ctrlc::Error> {
    let received = AtomicUsize::new(0);
    ctrlc::set_handler(move || {
        if received.fetch_add(1, Ordering::SeqCst) == 0 {
            eprintln!(
                "\n{}",
                "Interrupt received, stopping execution units (press Ctrl-C again to force)"
                    .yellow()
            );
            let _ = cancel.send(true);
        } else {
            let removed = tracker.force_remove_all();
            eprintln!("{}", format!("Force-removed {} container(s)", removed).red());
            std::process::exit(INTERRUPTED_EXIT_CODE);
        }
    })
}
