//! In-memory fakes of the docker and git seams for unit tests.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::container::runtime::{ContainerRuntime, RunSpec, RuntimeError, UnitState};
use crate::git::ops::{GitError, GitOps};

/// Exit code docker reports for a container killed by `docker stop`.
const STOPPED_EXIT_CODE: i32 = 137;

/// What `git rev-parse HEAD` returns from [`FakeGit`].
pub const FAKE_HEAD: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

struct FakeContainer {
    sub_spec: String,
    remaining_polls: u32,
    stopped: bool,
    exited: bool,
}

struct RuntimeState {
    image_present: bool,
    builds: usize,
    polls: u32,
    exit_codes: HashMap<String, i32>,
    launch_failures: HashSet<String>,
    hanging: HashSet<String>,
    inspect_errors: HashSet<String>,
    remove_failures: HashSet<String>,
    containers: HashMap<String, FakeContainer>,
    runs: HashMap<String, RunSpec>,
    launched: Vec<String>,
    events: Vec<String>,
    active: usize,
    max_active: usize,
    stopped: Vec<String>,
    removed: Vec<String>,
    inspections: HashMap<String, usize>,
}

/// Container runtime that keys behavior on the `RALPH_SUBSPEC_NAME` of each run.
pub struct FakeRuntime {
    state: Mutex<RuntimeState>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RuntimeState {
                image_present: true,
                builds: 0,
                polls: 1,
                exit_codes: HashMap::new(),
                launch_failures: HashSet::new(),
                hanging: HashSet::new(),
                inspect_errors: HashSet::new(),
                remove_failures: HashSet::new(),
                containers: HashMap::new(),
                runs: HashMap::new(),
                launched: Vec::new(),
                events: Vec::new(),
                active: 0,
                max_active: 0,
                stopped: Vec::new(),
                removed: Vec::new(),
                inspections: HashMap::new(),
            }),
        }
    }

    fn with_state(self, f: impl FnOnce(&mut RuntimeState)) -> Self {
        f(&mut self.state.lock().unwrap());
        self
    }

    pub fn without_image(self) -> Self {
        self.with_state(|s| s.image_present = false)
    }

    /// Number of `running` inspections before a unit exits.
    pub fn with_polls(self, polls: u32) -> Self {
        self.with_state(|s| s.polls = polls)
    }

    pub fn with_exit_code(self, sub_spec: &str, code: i32) -> Self {
        self.with_state(|s| {
            s.exit_codes.insert(sub_spec.to_string(), code);
        })
    }

    pub fn failing_launch(self, sub_spec: &str) -> Self {
        self.with_state(|s| {
            s.launch_failures.insert(sub_spec.to_string());
        })
    }

    /// The unit keeps running until stopped.
    pub fn hanging(self, sub_spec: &str) -> Self {
        self.with_state(|s| {
            s.hanging.insert(sub_spec.to_string());
        })
    }

    /// The first inspection of the unit fails while it keeps running.
    pub fn with_inspect_error(self, sub_spec: &str) -> Self {
        self.with_state(|s| {
            s.inspect_errors.insert(sub_spec.to_string());
        })
    }

    /// `remove` fails for the unit, forced or not.
    pub fn failing_remove(self, sub_spec: &str) -> Self {
        self.with_state(|s| {
            s.remove_failures.insert(sub_spec.to_string());
        })
    }

    pub fn builds(&self) -> usize {
        self.state.lock().unwrap().builds
    }

    /// Sub-specs in launch order.
    pub fn launched(&self) -> Vec<String> {
        self.state.lock().unwrap().launched.clone()
    }

    /// `run <sub>` / `rm <sub>` in the order they happened.
    pub fn events(&self) -> Vec<String> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn active(&self) -> usize {
        self.state.lock().unwrap().active
    }

    pub fn max_active(&self) -> usize {
        self.state.lock().unwrap().max_active
    }

    pub fn stopped(&self) -> Vec<String> {
        self.state.lock().unwrap().stopped.clone()
    }

    /// Containers that existed when they were removed.
    pub fn removed(&self) -> Vec<String> {
        self.state.lock().unwrap().removed.clone()
    }

    pub fn run_spec(&self, container: &str) -> Option<RunSpec> {
        self.state.lock().unwrap().runs.get(container).cloned()
    }

    pub fn inspections(&self, container: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .inspections
            .get(container)
            .copied()
            .unwrap_or(0)
    }

    fn remove_now(&self, name: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(container) = state.containers.remove(name) {
            state.active -= 1;
            state.removed.push(name.to_string());
            state.events.push(format!("rm {}", container.sub_spec));
        }
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn image_exists(&self, _image: &str) -> Result<bool, RuntimeError> {
        Ok(self.state.lock().unwrap().image_present)
    }

    async fn build_image(&self, _image: &str, _context: &Path) -> Result<(), RuntimeError> {
        let mut state = self.state.lock().unwrap();
        state.builds += 1;
        state.image_present = true;
        Ok(())
    }

    async fn run_detached(&self, spec: &RunSpec) -> Result<String, RuntimeError> {
        let sub_spec = spec
            .env_var("RALPH_SUBSPEC_NAME")
            .unwrap_or(&spec.name)
            .to_string();
        let mut state = self.state.lock().unwrap();
        if state.launch_failures.contains(&sub_spec) {
            return Err(RuntimeError::Failed {
                command: "docker run".to_string(),
                code: Some(125),
                stderr: format!("cannot start {}", sub_spec),
            });
        }

        let remaining_polls = state.polls;
        state.containers.insert(
            spec.name.clone(),
            FakeContainer {
                sub_spec: sub_spec.clone(),
                remaining_polls,
                stopped: false,
                exited: false,
            },
        );
        state.runs.insert(spec.name.clone(), spec.clone());
        state.launched.push(sub_spec.clone());
        state.events.push(format!("run {}", sub_spec));
        state.active += 1;
        state.max_active = state.max_active.max(state.active);
        Ok(format!("id-{}", spec.name))
    }

    async fn inspect(&self, name: &str) -> Result<UnitState, RuntimeError> {
        let mut state = self.state.lock().unwrap();
        *state.inspections.entry(name.to_string()).or_insert(0) += 1;

        let RuntimeState {
            containers,
            hanging,
            exit_codes,
            inspect_errors,
            ..
        } = &mut *state;
        let Some(container) = containers.get_mut(name) else {
            return Ok(UnitState::Missing);
        };
        if inspect_errors.remove(&container.sub_spec) {
            return Err(RuntimeError::Failed {
                command: "docker inspect".to_string(),
                code: Some(1),
                stderr: "Cannot connect to the Docker daemon".to_string(),
            });
        }
        if container.stopped {
            container.exited = true;
            return Ok(UnitState::Exited {
                code: STOPPED_EXIT_CODE,
            });
        }
        if hanging.contains(&container.sub_spec) {
            return Ok(UnitState::Running);
        }
        if container.remaining_polls > 0 {
            container.remaining_polls -= 1;
            return Ok(UnitState::Running);
        }
        container.exited = true;
        let code = exit_codes.get(&container.sub_spec).copied().unwrap_or(0);
        Ok(UnitState::Exited { code })
    }

    async fn stop(&self, name: &str, _grace: Duration) -> Result<(), RuntimeError> {
        let mut state = self.state.lock().unwrap();
        state.stopped.push(name.to_string());
        if let Some(container) = state.containers.get_mut(name) {
            container.stopped = true;
        }
        Ok(())
    }

    /// Like docker, refuses to remove a running unit unless forced.
    async fn remove(&self, name: &str, force: bool) -> Result<(), RuntimeError> {
        {
            let state = self.state.lock().unwrap();
            if let Some(container) = state.containers.get(name) {
                let refuse = if state.remove_failures.contains(&container.sub_spec) {
                    Some("removal of container failed")
                } else if !force && !container.stopped && !container.exited {
                    Some("cannot remove a running container")
                } else {
                    None
                };
                if let Some(stderr) = refuse {
                    return Err(RuntimeError::Failed {
                        command: format!("docker rm {}", name),
                        code: Some(1),
                        stderr: stderr.to_string(),
                    });
                }
            }
        }
        self.remove_now(name);
        Ok(())
    }

    fn force_remove_blocking(&self, name: &str) {
        self.remove_now(name);
    }
}

struct GitState {
    calls: Vec<String>,
    conflicting: HashSet<String>,
    fail_commit: bool,
    fail_push: bool,
    fail_fetch: bool,
    remote: Option<String>,
    branch: Option<String>,
}

/// Git that records every command and succeeds unless told otherwise.
pub struct FakeGit {
    state: Mutex<GitState>,
}

impl FakeGit {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GitState {
                calls: Vec::new(),
                conflicting: HashSet::new(),
                fail_commit: false,
                fail_push: false,
                fail_fetch: false,
                remote: Some("git@github.com:acme/app.git".to_string()),
                branch: Some("feature/x".to_string()),
            }),
        }
    }

    fn with_state(self, f: impl FnOnce(&mut GitState)) -> Self {
        f(&mut self.state.lock().unwrap());
        self
    }

    /// Merging `origin/<branch>` fails.
    pub fn with_conflict(self, branch: &str) -> Self {
        self.with_state(|s| {
            s.conflicting.insert(branch.to_string());
        })
    }

    pub fn failing_commit(self) -> Self {
        self.with_state(|s| s.fail_commit = true)
    }

    /// Every `push` is rejected.
    pub fn failing_push(self) -> Self {
        self.with_state(|s| s.fail_push = true)
    }

    pub fn failing_fetch(self) -> Self {
        self.with_state(|s| s.fail_fetch = true)
    }

    pub fn without_remote(self) -> Self {
        self.with_state(|s| s.remote = None)
    }

    pub fn detached(self) -> Self {
        self.with_state(|s| s.branch = None)
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn calls_starting_with(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }
}

fn failed(args: &[&str], stderr: &str) -> GitError {
    GitError::Failed {
        command: args.join(" "),
        status: "exit 1".to_string(),
        stderr: stderr.to_string(),
    }
}

#[async_trait]
impl GitOps for FakeGit {
    async fn run(&self, args: &[&str]) -> Result<String, GitError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(args.join(" "));

        match args {
            ["remote", "get-url", "origin"] => state
                .remote
                .clone()
                .ok_or_else(|| failed(args, "No such remote 'origin'")),
            ["branch", "--show-current"] => Ok(state.branch.clone().unwrap_or_default()),
            ["merge", "--no-ff", target, ..] => {
                let branch = target.strip_prefix("origin/").unwrap_or(target);
                if state.conflicting.contains(branch) {
                    Err(failed(args, "CONFLICT (content): Merge conflict"))
                } else {
                    Ok(String::new())
                }
            }
            ["commit", ..] if state.fail_commit => Err(failed(args, "nothing to commit")),
            ["push", ..] if state.fail_push => Err(failed(args, "! [rejected] (fetch first)")),
            ["fetch", ..] if state.fail_fetch => Err(failed(args, "Could not read from remote")),
            ["rev-parse", "HEAD"] => Ok(FAKE_HEAD.to_string()),
            _ => Ok(String::new()),
        }
    }
}
