use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{info, warn};

use crate::container::runtime::ContainerRuntime;

/// Live execution units, from launch until removal.
///
/// Cloned handles share the same set, so the signal handler and the
/// scheduler see the same units.
#[derive(Clone)]
pub struct UnitTracker {
    runtime: Arc<dyn ContainerRuntime>,
    live: Arc<Mutex<BTreeSet<String>>>,
}

impl UnitTracker {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            runtime,
            live: Arc::new(Mutex::new(BTreeSet::new())),
        }
    }

    fn live(&self) -> MutexGuard<'_, BTreeSet<String>> {
        self.live.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn track(&self, container: &str) {
        self.live().insert(container.to_string());
    }

    pub fn untrack(&self, container: &str) {
        self.live().remove(container);
    }

    pub fn tracked(&self) -> Vec<String> {
        self.live().iter().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.live().is_empty()
    }

    /// Force-remove a unit whose result is in and stop tracking it.
    ///
    /// The unit may still be running when its state could not be read. If
    /// removal fails it stays tracked, so the drop guard and a forced
    /// interrupt still clean it up. Returns whether it was removed.
    pub async fn remove(&self, container: &str) -> bool {
        match self.runtime.remove(container, true).await {
            Ok(()) => {
                self.untrack(container);
                true
            }
            Err(err) => {
                warn!("Failed to remove container {}: {}", container, err);
                false
            }
        }
    }

    /// Stop and force-remove every tracked unit. Returns how many were live.
    pub async fn stop_all(&self, grace: Duration) -> usize {
        let containers = self.tracked();
        for container in &containers {
            info!(container = %container, "stopping execution unit");
            if let Err(err) = self.runtime.stop(container, grace).await {
                warn!("Failed to stop container {}: {}", container, err);
            }
            self.remove(container).await;
        }
        containers.len()
    }

    /// Force-remove every tracked unit without an async runtime.
    pub fn force_remove_all(&self) -> usize {
        let containers: Vec<String> = std::mem::take(&mut *self.live()).into_iter().collect();
        for container in &containers {
            self.runtime.force_remove_blocking(container);
        }
        containers.len()
    }

    /// Guard that force-removes leftover units when dropped.
    pub fn guard(&self) -> TrackerGuard {
        TrackerGuard {
            tracker: self.clone(),
        }
    }
}

/// Force-removes whatever is still tracked on drop, so a panicking or
/// cancelled run does not leak containers.
pub struct TrackerGuard {
    tracker: UnitTracker,
}

impl Drop for TrackerGuard {
    fn drop(&mut self) {
        if !self.tracker.is_empty() {
            let removed = self.tracker.force_remove_all();
            warn!("Removed {} leftover execution unit(s)", removed);
        }
    }
}
