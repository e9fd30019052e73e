//! Failure taxonomy for parallel runs.

/// Where a failure sits in the run, and therefore how far it reaches.
///
/// Only `Configuration` and `Interrupted` end a run. Every other category is
/// isolated to a single sub-spec (or, for `Persistence`, to a single cycle's
/// checkpoint) and scheduling continues around it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Missing or invalid inputs: no manifest, malformed graph, cycle, lock held.
    Configuration,
    /// An execution unit could not be started.
    Launch,
    /// An execution unit ran but exited non-zero (or timed out).
    Execution,
    /// A finished sub-spec branch could not be merged.
    Integration,
    /// The manifest or its checkpoint commit could not be written.
    Persistence,
    /// The user asked the run to stop.
    Interrupted,
}

impl ErrorCategory {
    /// Returns true when a failure of this category ends the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ErrorCategory::Configuration | ErrorCategory::Interrupted
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_configuration_and_interrupt_are_fatal() {
        assert!(ErrorCategory::Configuration.is_fatal());
        assert!(ErrorCategory::Interrupted.is_fatal());
        assert!(!ErrorCategory::Launch.is_fatal());
        assert!(!ErrorCategory::Execution.is_fatal());
        assert!(!ErrorCategory::Integration.is_fatal());
        assert!(!ErrorCategory::Persistence.is_fatal());
    }
}
