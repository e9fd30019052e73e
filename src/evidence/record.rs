use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::evidence::lifecycle::LifecycleEvent;

/// Current evidence schema version.
pub const EVIDENCE_SCHEMA_VERSION: u32 = 2;

/// One line of `events.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    pub schema_version: u32,
    pub run_id: String,
    pub recorded_at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: LifecycleEvent,
}

impl EvidenceRecord {
    /// Create a record stamped with the current time.
    pub fn new(run_id: impl Into<String>, event: LifecycleEvent) -> Self {
        Self {
            schema_version: EVIDENCE_SCHEMA_VERSION,
            run_id: run_id.into(),
            recorded_at: Utc::now(),
            event,
        }
    }
}

/// Contents of `run.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRunMetadata {
    pub schema_version: u32,
    pub run_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub record_count: u64,
    /// Final run status, set by the `run_complete` event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
}

impl EvidenceRunMetadata {
    pub fn new(run_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            schema_version: EVIDENCE_SCHEMA_VERSION,
            run_id: run_id.into(),
            spec: None,
            created_at: timestamp,
            updated_at: timestamp,
            record_count: 0,
            outcome: None,
        }
    }

    /// Fold a newly appended record into the summary.
    pub fn record(&mut self, record: &EvidenceRecord) {
        self.updated_at = record.recorded_at;
        self.record_count = self.record_count.saturating_add(1);
        match &record.event {
            LifecycleEvent::RunStart { spec, .. } => self.spec = Some(spec.clone()),
            LifecycleEvent::RunComplete { status, .. } => self.outcome = Some(status.clone()),
            _ => {}
        }
    }
}
