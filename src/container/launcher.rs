use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::container::runtime::{ContainerRuntime, Mount, RunSpec, RuntimeError};
use crate::git::{self, GitOps};
use crate::paths::{sanitize_name, to_docker_path, RalphPaths};

/// Mount point of the Ralph library inside every unit.
pub const LIB_MOUNT: &str = "/ralph-lib";

/// Errors that prevent an execution unit from starting.
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("Failed to build image {image}: {source}")]
    Image {
        image: String,
        #[source]
        source: RuntimeError,
    },

    #[error("Could not get git remote URL")]
    NoRemote,

    #[error("Failed to start container {container}: {source}")]
    Run {
        container: String,
        #[source]
        source: RuntimeError,
    },
}

/// Per-run settings shared by every launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOptions {
    pub base_branch: String,
    pub iterations: u32,
    pub verbose: bool,
}

/// A started container working on one sub-spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionUnit {
    pub sub_spec: String,
    pub container_name: String,
    pub branch: String,
}

/// Deterministic container name for a sub-spec.
pub fn container_name(repo: &str, spec: &str, sub_spec: &str) -> String {
    sanitize_name(&format!("ralph-{}-{}-{}", repo, spec, sub_spec))
}

/// Image used by every unit of a spec.
pub fn image_name(repo: &str, spec: &str) -> String {
    sanitize_name(&format!("ralph-wiggum-{}-{}", repo, spec))
}

/// Starts one detached container per sub-spec.
pub struct UnitLauncher {
    runtime: Arc<dyn ContainerRuntime>,
    git: Arc<dyn GitOps>,
    paths: RalphPaths,
    lib_dir: PathBuf,
    docker_context: PathBuf,
    image_ready: AtomicBool,
}

impl UnitLauncher {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        git: Arc<dyn GitOps>,
        paths: RalphPaths,
    ) -> Self {
        let lib_dir = paths.default_lib_dir();
        let docker_context = paths.default_docker_context();
        Self {
            runtime,
            git,
            paths,
            lib_dir,
            docker_context,
            image_ready: AtomicBool::new(false),
        }
    }

    /// Override the directory mounted at [`LIB_MOUNT`].
    pub fn with_lib_dir(mut self, lib_dir: PathBuf) -> Self {
        self.lib_dir = lib_dir;
        self
    }

    /// Override the image build context.
    pub fn with_docker_context(mut self, context: PathBuf) -> Self {
        self.docker_context = context;
        self
    }

    /// Start the execution unit for `sub_spec` on branch `ralph/<spec>/<sub_spec>`.
    pub async fn launch(
        &self,
        spec: &str,
        sub_spec: &str,
        options: &LaunchOptions,
    ) -> Result<ExecutionUnit, LaunchError> {
        let repo = self.paths.repo_name();
        let image = image_name(&repo, spec);
        self.ensure_image(&image).await?;

        let repo_url = git::remote_url(self.git.as_ref())
            .await
            .ok_or(LaunchError::NoRemote)?;

        let unit = ExecutionUnit {
            sub_spec: sub_spec.to_string(),
            container_name: container_name(&repo, spec, sub_spec),
            branch: git::sub_spec_branch(spec, sub_spec),
        };

        // Leftover from an earlier run with the same name.
        if let Err(err) = self.runtime.remove(&unit.container_name, true).await {
            debug!("no stale container {}: {}", unit.container_name, err);
        }

        let run = self.run_spec(spec, &image, &repo_url, &unit, options);
        self.runtime
            .run_detached(&run)
            .await
            .map_err(|source| LaunchError::Run {
                container: unit.container_name.clone(),
                source,
            })?;

        info!(
            sub_spec,
            container = %unit.container_name,
            branch = %unit.branch,
            "launched execution unit"
        );
        Ok(unit)
    }

    async fn ensure_image(&self, image: &str) -> Result<(), LaunchError> {
        if self.image_ready.load(Ordering::SeqCst) {
            return Ok(());
        }
        let image_error = |source| LaunchError::Image {
            image: image.to_string(),
            source,
        };

        if !self.runtime.image_exists(image).await.map_err(image_error)? {
            info!(image, context = %self.docker_context.display(), "building image");
            self.runtime
                .build_image(image, &self.docker_context)
                .await
                .map_err(image_error)?;
        }
        self.image_ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn run_spec(
        &self,
        spec: &str,
        image: &str,
        repo_url: &str,
        unit: &ExecutionUnit,
        options: &LaunchOptions,
    ) -> RunSpec {
        let mut command = vec![
            "bash".to_string(),
            format!("{}/scripts/loop.sh", LIB_MOUNT),
            spec.to_string(),
            "full".to_string(),
            options.iterations.to_string(),
        ];
        if options.verbose {
            command.push("--verbose".to_string());
        }

        RunSpec {
            name: unit.container_name.clone(),
            image: image.to_string(),
            env_file: Some(self.paths.env_file()),
            mounts: vec![Mount {
                host: to_docker_path(&self.lib_dir),
                container: LIB_MOUNT.to_string(),
                read_only: true,
            }],
            env: vec![
                ("RALPH_REPO_URL".to_string(), repo_url.to_string()),
                ("RALPH_BRANCH".to_string(), unit.branch.clone()),
                ("RALPH_BASE_BRANCH".to_string(), options.base_branch.clone()),
                ("RALPH_SUBSPEC_NAME".to_string(), unit.sub_spec.clone()),
                ("RALPH_SUBSPEC_BRANCH".to_string(), unit.branch.clone()),
            ],
            command,
        }
    }
}
