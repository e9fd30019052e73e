//! Parallel sub-spec scheduling: dependency graph, eligibility and the
//! batch loop that drives execution units to completion.

pub mod dependency;
pub mod scheduler;

pub use dependency::{BlockedNode, DependencyGraph, GraphError, SubSpecNode};
pub use scheduler::{ParallelScheduler, RunSummary, SchedulerConfig};
