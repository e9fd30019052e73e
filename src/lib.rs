//! Ralph parallel sub-spec scheduler.
//!
//! `ralph parallel-full <spec>` takes a spec that has already been decomposed
//! into a manifest of sub-specs, runs every sub-spec in its own container on
//! its own branch (respecting declared dependencies and a concurrency bound),
//! merges finished branches into the shared `ralph/<spec>` branch, and
//! persists progress after every batch so an interrupted run can be resumed.

pub mod cli;
pub mod commands;
pub mod config;
pub mod container;
pub mod error;
pub mod evidence;
pub mod git;
pub mod lock;
pub mod manifest;
pub mod parallel;
pub mod paths;
pub mod signals;
pub mod timeout;
pub mod ui;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{RalphError, RalphResult};
