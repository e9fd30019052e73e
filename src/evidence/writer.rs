use std::time::{SystemTime, UNIX_EPOCH};

use tracing::warn;

use crate::evidence::lifecycle::LifecycleEvent;
use crate::evidence::record::EvidenceRecord;
use crate::evidence::store::{retention_days_from_env, EvidenceResult, EvidenceStore};
use crate::paths::RalphPaths;

/// Records lifecycle events for one run. Write failures are logged and
/// otherwise ignored; evidence never changes the outcome of a run.
#[derive(Debug)]
pub struct EvidenceWriter {
    run_id: String,
    store: EvidenceStore,
}

impl EvidenceWriter {
    /// Open the evidence store and prune runs past retention.
    pub fn try_new(paths: &RalphPaths, run_id: String) -> EvidenceResult<Self> {
        let store = EvidenceStore::new(paths, retention_days_from_env())?;
        match store.enforce_retention() {
            Ok(0) => {}
            Ok(pruned) => tracing::debug!(pruned, "pruned expired evidence runs"),
            Err(err) => warn!("Failed to prune evidence runs: {}", err),
        }
        Ok(Self { run_id, store })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn store(&self) -> &EvidenceStore {
        &self.store
    }

    pub fn emit(&mut self, event: LifecycleEvent) {
        let name = event.name();
        let record = EvidenceRecord::new(self.run_id.clone(), event);
        if let Err(err) = self.store.append_record(&record) {
            warn!(
                "Failed to write {} evidence event to {}: {}",
                name,
                self.store.root_dir().display(),
                err
            );
        }
    }
}

/// Emit an event when a writer is available.
pub fn emit(writer: &mut Option<EvidenceWriter>, event: LifecycleEvent) {
    if let Some(writer) = writer.as_mut() {
        writer.emit(event);
    }
}

pub fn generate_run_id() -> String {
    let timestamp_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    format!("run-{}-{}", timestamp_ms, std::process::id())
}
