use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Errors from the container runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} failed ({}): {stderr}", describe_code(.code))]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit {}", code),
        None => "terminated by signal".to_string(),
    }
}

/// Lifecycle state of a container as reported by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Created,
    Running,
    Paused,
    Restarting,
    Removing,
    Exited { code: i32 },
    Dead { code: i32 },
    /// The runtime does not know the container.
    Missing,
}

impl UnitState {
    /// Recorded exit code once the unit is terminal.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            UnitState::Exited { code } | UnitState::Dead { code } => Some(*code),
            _ => None,
        }
    }
}

/// Format string handed to `docker inspect`.
pub const INSPECT_FORMAT: &str = "{{.State.Status}} {{.State.ExitCode}}";

/// Parse `docker inspect --format "{{.State.Status}} {{.State.ExitCode}}"`.
pub fn parse_inspect_output(output: &str) -> UnitState {
    let mut parts = output.split_whitespace();
    let status = parts.next().unwrap_or_default();
    let code = parts
        .next()
        .and_then(|c| c.parse::<i32>().ok())
        .unwrap_or(0);
    match status {
        "created" => UnitState::Created,
        "running" => UnitState::Running,
        "paused" => UnitState::Paused,
        "restarting" => UnitState::Restarting,
        "removing" => UnitState::Removing,
        "exited" => UnitState::Exited { code },
        "dead" => UnitState::Dead { code },
        _ => UnitState::Missing,
    }
}

/// A bind mount for `docker run -v`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub host: String,
    pub container: String,
    pub read_only: bool,
}

/// Everything needed for one `docker run -d`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSpec {
    pub name: String,
    pub image: String,
    pub env_file: Option<PathBuf>,
    pub mounts: Vec<Mount>,
    pub env: Vec<(String, String)>,
    pub command: Vec<String>,
}

impl RunSpec {
    /// Arguments following the runtime binary.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            self.name.clone(),
        ];
        if let Some(env_file) = &self.env_file {
            args.push("--env-file".to_string());
            args.push(env_file.to_string_lossy().into_owned());
        }
        for mount in &self.mounts {
            args.push("-v".to_string());
            let suffix = if mount.read_only { ":ro" } else { "" };
            args.push(format!("{}:{}{}", mount.host, mount.container, suffix));
        }
        for (key, value) in &self.env {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }
        args.push(self.image.clone());
        args.extend(self.command.iter().cloned());
        args
    }

    pub fn env_var(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Container runtime operations used by the scheduler.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn image_exists(&self, image: &str) -> Result<bool, RuntimeError>;

    async fn build_image(&self, image: &str, context: &Path) -> Result<(), RuntimeError>;

    /// Start a detached container, returning its id.
    async fn run_detached(&self, spec: &RunSpec) -> Result<String, RuntimeError>;

    async fn inspect(&self, name: &str) -> Result<UnitState, RuntimeError>;

    /// Ask a container to stop, killing it after `grace`.
    async fn stop(&self, name: &str, grace: Duration) -> Result<(), RuntimeError>;

    async fn remove(&self, name: &str, force: bool) -> Result<(), RuntimeError>;

    /// Force-remove a container without an async runtime. Used from the
    /// signal handler and from drop guards; errors are ignored.
    fn force_remove_blocking(&self, name: &str);
}

/// [`ContainerRuntime`] backed by the `docker` CLI.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl DockerCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn output(&self, args: &[&str]) -> Result<Output, RuntimeError> {
        let command = format!("{} {}", self.binary, args.join(" "));
        debug!("{}", command);
        Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| RuntimeError::Spawn { command, source })
    }

    async fn checked(&self, args: &[&str]) -> Result<String, RuntimeError> {
        let output = self.output(args).await?;
        if !output.status.success() {
            return Err(RuntimeError::Failed {
                command: format!("{} {}", self.binary, args.first().copied().unwrap_or_default()),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn image_exists(&self, image: &str) -> Result<bool, RuntimeError> {
        let output = self.output(&["image", "inspect", image]).await?;
        Ok(output.status.success())
    }

    async fn build_image(&self, image: &str, context: &Path) -> Result<(), RuntimeError> {
        let context = context.to_string_lossy();
        self.checked(&["build", "-t", image, &context]).await?;
        Ok(())
    }

    async fn run_detached(&self, spec: &RunSpec) -> Result<String, RuntimeError> {
        let args = spec.to_args();
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.checked(&args).await
    }

    async fn inspect(&self, name: &str) -> Result<UnitState, RuntimeError> {
        let output = self
            .output(&["inspect", "--format", INSPECT_FORMAT, name])
            .await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("No such") {
                return Ok(UnitState::Missing);
            }
            return Err(RuntimeError::Failed {
                command: format!("{} inspect", self.binary),
                code: output.status.code(),
                stderr: stderr.trim().to_string(),
            });
        }
        Ok(parse_inspect_output(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn stop(&self, name: &str, grace: Duration) -> Result<(), RuntimeError> {
        let grace = grace.as_secs().to_string();
        self.checked(&["stop", "-t", &grace, name]).await?;
        Ok(())
    }

    async fn remove(&self, name: &str, force: bool) -> Result<(), RuntimeError> {
        if force {
            self.checked(&["rm", "-f", name]).await?;
        } else {
            self.checked(&["rm", name]).await?;
        }
        Ok(())
    }

    fn force_remove_blocking(&self, name: &str) {
        let _ = std::process::Command::new(&self.binary)
            .args(["rm", "-f", name])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }
}
