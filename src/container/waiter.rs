use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::container::launcher::ExecutionUnit;
use crate::container::runtime::{ContainerRuntime, UnitState};
use crate::timeout::TimeoutConfig;

/// Exit code reported when a unit vanished or could not be inspected.
pub const MISSING_EXIT_CODE: i32 = 1;

/// Exit code reported when a unit exceeded its time limit.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Polls a unit until it reaches a terminal state.
#[derive(Clone)]
pub struct CompletionWaiter {
    runtime: Arc<dyn ContainerRuntime>,
    poll_interval: Duration,
    unit_timeout: Option<Duration>,
    stop_grace_period: Duration,
}

impl CompletionWaiter {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, timeouts: &TimeoutConfig) -> Self {
        Self {
            runtime,
            poll_interval: timeouts.poll_interval,
            unit_timeout: timeouts.unit_timeout,
            stop_grace_period: timeouts.stop_grace_period,
        }
    }

    /// Wait for `unit` to finish and return its exit code.
    ///
    /// A unit the runtime no longer knows (or cannot inspect) yields
    /// [`MISSING_EXIT_CODE`]. A unit past its time limit is stopped and
    /// yields [`TIMEOUT_EXIT_CODE`].
    pub async fn wait(&self, unit: &ExecutionUnit) -> i32 {
        let started = Instant::now();
        loop {
            match self.runtime.inspect(&unit.container_name).await {
                Ok(UnitState::Missing) => {
                    warn!("Container {} disappeared", unit.container_name);
                    return MISSING_EXIT_CODE;
                }
                Ok(state) => {
                    if let Some(code) = state.exit_code() {
                        debug!(container = %unit.container_name, code, "unit finished");
                        return code;
                    }
                }
                Err(err) => {
                    warn!("Failed to inspect {}: {}", unit.container_name, err);
                    return MISSING_EXIT_CODE;
                }
            }

            if let Some(limit) = self.unit_timeout {
                if started.elapsed() >= limit {
                    warn!(
                        "Container {} exceeded {}s, stopping it",
                        unit.container_name,
                        limit.as_secs()
                    );
                    if let Err(err) = self
                        .runtime
                        .stop(&unit.container_name, self.stop_grace_period)
                        .await
                    {
                        warn!("Failed to stop {}: {}", unit.container_name, err);
                    }
                    return TIMEOUT_EXIT_CODE;
                }
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::runtime::RunSpec;
    use crate::test_support::FakeRuntime;

    fn unit(name: &str) -> ExecutionUnit {
        ExecutionUnit {
            sub_spec: name.to_string(),
            container_name: format!("ralph-app-auth-{}", name),
            branch: format!("ralph/auth/{}", name),
        }
    }

    async fn start(runtime: &FakeRuntime, sub_spec: &str) -> ExecutionUnit {
        let unit = unit(sub_spec);
        runtime
            .run_detached(&RunSpec {
                name: unit.container_name.clone(),
                env: vec![("RALPH_SUBSPEC_NAME".to_string(), sub_spec.to_string())],
                ..RunSpec::default()
            })
            .await
            .expect("run");
        unit
    }

    fn timeouts() -> TimeoutConfig {
        TimeoutConfig::new().with_poll_interval(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_returns_recorded_exit_code_after_polling() {
        let runtime = Arc::new(FakeRuntime::new().with_exit_code("api", 3).with_polls(3));
        let unit = start(&runtime, "api").await;

        let waiter = CompletionWaiter::new(runtime.clone(), &timeouts());
        assert_eq!(waiter.wait(&unit).await, 3);
        assert!(runtime.inspections("ralph-app-auth-api") >= 3);
    }

    #[tokio::test]
    async fn test_missing_unit_is_failure() {
        let runtime = Arc::new(FakeRuntime::new());
        let waiter = CompletionWaiter::new(runtime, &timeouts());
        assert_eq!(waiter.wait(&unit("ghost")).await, MISSING_EXIT_CODE);
    }

    #[tokio::test]
    async fn test_timeout_stops_the_unit() {
        let runtime = Arc::new(FakeRuntime::new().hanging("api"));
        let unit = start(&runtime, "api").await;

        let waiter = CompletionWaiter::new(
            runtime.clone(),
            &timeouts().with_unit_timeout(Some(Duration::from_millis(20))),
        );
        assert_eq!(waiter.wait(&unit).await, TIMEOUT_EXIT_CODE);
        assert_eq!(runtime.stopped(), ["ralph-app-auth-api"]);
    }
}
