use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

/// Errors from a single git invocation.
#[derive(Error, Debug)]
pub enum GitError {
    #[error("Failed to run git {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("git {command} timed out after {}s", timeout.as_secs())]
    Timeout { command: String, timeout: Duration },

    #[error("git {command} failed ({status}): {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },
}

/// Git command execution against the user's repository.
#[async_trait]
pub trait GitOps: Send + Sync {
    /// Run `git <args>` and return trimmed stdout.
    async fn run(&self, args: &[&str]) -> Result<String, GitError>;
}

/// [`GitOps`] backed by the `git` binary.
#[derive(Debug, Clone)]
pub struct GitCli {
    repo_dir: PathBuf,
    timeout: Duration,
}

impl GitCli {
    pub fn new(repo_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            timeout,
        }
    }
}

#[async_trait]
impl GitOps for GitCli {
    async fn run(&self, args: &[&str]) -> Result<String, GitError> {
        let command = args.join(" ");
        debug!(cwd = %self.repo_dir.display(), "git {}", command);

        let child = Command::new("git")
            .args(args)
            .current_dir(&self.repo_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = match timeout(self.timeout, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => return Err(GitError::Spawn { command, source }),
            Err(_) => {
                return Err(GitError::Timeout {
                    command,
                    timeout: self.timeout,
                })
            }
        };

        if !output.status.success() {
            let status = match output.status.code() {
                Some(code) => format!("exit {}", code),
                None => "terminated by signal".to_string(),
            };
            return Err(GitError::Failed {
                command,
                status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
