//! `ralph parallel-full <spec>`.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::cli::ParallelFullArgs;
use crate::config::RalphConfig;
use crate::container::{ContainerRuntime, DockerCli};
use crate::error::{RalphError, RalphResult};
use crate::git::{self, GitCli, GitOps};
use crate::lock::RunLock;
use crate::manifest::ManifestStore;
use crate::parallel::{ParallelScheduler, SchedulerConfig};
use crate::paths::RalphPaths;
use crate::signals;

/// Run from the current directory.
pub async fn run(args: &ParallelFullArgs) -> RalphResult<i32> {
    run_in(RalphPaths::from_current_dir()?, args).await
}

/// Run against the repository at `paths`.
pub async fn run_in(paths: RalphPaths, args: &ParallelFullArgs) -> RalphResult<i32> {
    preflight(&paths, &args.spec)?;

    let mut config = RalphConfig::load(&paths.config_file())?;
    args.apply(&mut config);
    config.validate()?;

    let _lock = RunLock::acquire(&paths.lock_file(&args.spec))?;

    let timeouts = config.timeouts();
    let git: Arc<dyn GitOps> = Arc::new(GitCli::new(paths.repo_dir(), timeouts.git_timeout));
    let runtime: Arc<dyn ContainerRuntime> = Arc::new(DockerCli::new(config.docker_binary.clone()));

    let base_branch = match &args.base_branch {
        Some(branch) => branch.clone(),
        None => git::current_branch(git.as_ref()).await,
    };
    debug!(base_branch = %base_branch, "resolved base branch");

    let scheduler_config = SchedulerConfig {
        spec: args.spec.clone(),
        parallel: config.parallel,
        iterations: config.iterations,
        verbose: args.verbose,
        base_branch,
        timeouts,
    };
    let resolve = |dir: &Option<PathBuf>| dir.as_ref().map(|d| paths.repo_dir().join(d));
    let mut scheduler = ParallelScheduler::new(scheduler_config, paths.clone(), runtime, git)
        .with_launch_dirs(resolve(&config.lib_dir), resolve(&config.docker_context));

    if let Err(err) = signals::install(scheduler.cancel_handle(), scheduler.tracker()) {
        warn!("Failed to install signal handler: {}", err);
    }

    let summary = scheduler.run().await?;
    Ok(summary.exit_code())
}

/// Inputs that must exist before anything is locked or launched.
fn preflight(paths: &RalphPaths, spec: &str) -> RalphResult<()> {
    if !paths.is_initialized() {
        return Err(RalphError::NotInitialized(paths.repo_dir().to_path_buf()));
    }

    let spec_file = paths.spec_file(spec);
    if !spec_file.is_file() {
        return Err(RalphError::SpecNotFound(spec_file));
    }

    ManifestStore::new(paths.clone()).load(spec)?;

    let env_file = paths.env_file();
    if !env_file.is_file() {
        return Err(RalphError::EnvFileMissing(env_file));
    }
    Ok(())
}
