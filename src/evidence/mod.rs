//! Append-only audit log of parallel runs.
//!
//! Every run writes `.ralph/evidence/runs/<run_id>/events.jsonl` (one JSON
//! record per lifecycle event) and a `run.json` summary that is rewritten
//! atomically after each event.

pub mod labels;
pub mod lifecycle;
pub mod record;
pub mod store;
pub mod writer;

pub use labels::error_category_label;
pub use lifecycle::LifecycleEvent;
pub use record::{EvidenceRecord, EvidenceRunMetadata, EVIDENCE_SCHEMA_VERSION};
pub use store::{EvidenceError, EvidenceResult, EvidenceStore};
pub use writer::{generate_run_id, EvidenceWriter};
