use serde::{Deserialize, Serialize};

use crate::manifest::SubSpecStatus;

/// Lifecycle events recorded for a parallel run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    RunStart {
        spec: String,
        total: usize,
        complete: usize,
        parallel: u32,
        base_branch: String,
    },
    /// An execution unit was started for a sub-spec.
    Launched {
        sub_spec: String,
        container: String,
        branch: String,
    },
    /// A sub-spec reached its status for this cycle.
    SubSpecFinished {
        sub_spec: String,
        status: SubSpecStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_type: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_message: Option<String>,
    },
    /// Statuses were persisted at the end of a cycle.
    Checkpoint {
        complete: usize,
        total: usize,
        saved: bool,
    },
    RunComplete {
        status: String,
        complete: usize,
        total: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_type: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_message: Option<String>,
    },
}

impl LifecycleEvent {
    /// The `event` tag this variant serializes with.
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::RunStart { .. } => "run_start",
            LifecycleEvent::Launched { .. } => "launched",
            LifecycleEvent::SubSpecFinished { .. } => "sub_spec_finished",
            LifecycleEvent::Checkpoint { .. } => "checkpoint",
            LifecycleEvent::RunComplete { .. } => "run_complete",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_is_tagged_and_omits_empty_fields() {
        let event = LifecycleEvent::SubSpecFinished {
            sub_spec: "api".to_string(),
            status: SubSpecStatus::Complete,
            exit_code: Some(0),
            error_type: None,
            error_message: None,
        };
        let value = serde_json::to_value(&event).expect("serialize");
        assert_eq!(
            value,
            json!({
                "event": "sub_spec_finished",
                "sub_spec": "api",
                "status": "complete",
                "exit_code": 0
            })
        );
        assert_eq!(event.name(), "sub_spec_finished");
    }
}
