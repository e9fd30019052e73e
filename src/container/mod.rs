//! Execution units: one detached container per sub-spec.

pub mod launcher;
pub mod runtime;
pub mod tracker;
pub mod waiter;

pub use launcher::{
    container_name, image_name, ExecutionUnit, LaunchError, LaunchOptions, UnitLauncher,
};
pub use runtime::{ContainerRuntime, DockerCli, RunSpec, RuntimeError, UnitState};
pub use tracker::{TrackerGuard, UnitTracker};
pub use waiter::{CompletionWaiter, MISSING_EXIT_CODE, TIMEOUT_EXIT_CODE};
