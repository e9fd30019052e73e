//! Timeout configuration for execution units and git operations.
//!
//! Execution units have no wall-clock limit unless one is configured; a hung
//! unit otherwise holds its batch slot until it exits or is removed.

use std::time::Duration;

/// Default interval between execution unit state polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Configuration for timing behavior during a parallel run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Interval between lifecycle state polls of a running unit.
    /// Default: 10 seconds
    pub poll_interval: Duration,

    /// Maximum wall-clock time for one execution unit. `None` disables the
    /// limit. When exceeded the unit is stopped and counted as failed.
    /// Default: none
    pub unit_timeout: Option<Duration>,

    /// Maximum time allowed for a single git command (fetch, merge, push...).
    /// Default: 60 seconds
    pub git_timeout: Duration,

    /// Grace period given to a unit between stop and kill.
    /// Default: 10 seconds
    pub stop_grace_period: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            unit_timeout: None,
            git_timeout: Duration::from_secs(60),
            stop_grace_period: Duration::from_secs(10),
        }
    }
}

impl TimeoutConfig {
    /// Creates a new TimeoutConfig with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the unit state poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets (or clears) the per-unit wall-clock limit.
    pub fn with_unit_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.unit_timeout = timeout;
        self
    }

    /// Sets the git command timeout.
    pub fn with_git_timeout(mut self, timeout: Duration) -> Self {
        self.git_timeout = timeout;
        self
    }

    /// Sets the stop grace period.
    pub fn with_stop_grace_period(mut self, grace: Duration) -> Self {
        self.stop_grace_period = grace;
        self
    }
}
