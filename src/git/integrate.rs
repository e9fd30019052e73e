use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::git::ops::{GitError, GitOps};
use crate::git::spec_branch;
use crate::paths::RalphPaths;

/// Result of merging one sub-spec branch into the spec branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    Merged,
    /// The merge (or a step around it) failed and was aborted.
    Conflict {
        reason: String,
        /// Where the manual resolution recipe was written, if it could be.
        record: Option<PathBuf>,
    },
}

impl MergeOutcome {
    pub fn is_merged(&self) -> bool {
        matches!(self, MergeOutcome::Merged)
    }
}

/// Markdown written to `.ralph/paused.md` when a merge needs a human.
pub fn conflict_record(main_branch: &str, sub_branch: &str) -> String {
    format!(
        "# Merge Conflict\n\n\
         Failed to merge `{sub}` into `{main}`.\n\n\
         Resolve manually:\n\
         ```bash\n\
         git checkout {main}\n\
         git merge origin/{sub}\n\
         # resolve conflicts\n\
         git add . && git commit\n\
         git push\n\
         ```\n",
        main = main_branch,
        sub = sub_branch
    )
}

/// Integrates finished sub-spec branches into `ralph/<spec>` and commits
/// manifest checkpoints there.
///
/// Never force-pushes and never deletes branches.
pub struct BranchIntegrator {
    git: Arc<dyn GitOps>,
    paths: RalphPaths,
}

impl BranchIntegrator {
    pub fn new(git: Arc<dyn GitOps>, paths: RalphPaths) -> Self {
        Self { git, paths }
    }

    /// Merge `origin/<sub_branch>` into the spec branch and push it.
    ///
    /// Any failing step writes the conflict record and reports
    /// [`MergeOutcome::Conflict`]. A failure at or after the merge step
    /// aborts the merge and resets the spec branch to the commit it had
    /// after the pull, so an unpublished merge never rides along with a
    /// later push.
    pub async fn merge(&self, spec: &str, sub_branch: &str) -> MergeOutcome {
        let main_branch = spec_branch(spec);
        match self.try_merge(&main_branch, sub_branch).await {
            Ok(()) => {
                info!(sub_branch, main_branch = %main_branch, "merged sub-spec branch");
                MergeOutcome::Merged
            }
            Err(err) => {
                warn!("Merge of {} into {} failed: {}", sub_branch, main_branch, err);
                MergeOutcome::Conflict {
                    reason: err.to_string(),
                    record: self.write_conflict_record(&main_branch, sub_branch),
                }
            }
        }
    }

    async fn try_merge(&self, main_branch: &str, sub_branch: &str) -> Result<(), GitError> {
        self.git.run(&["fetch", "origin"]).await?;
        self.git.run(&["checkout", main_branch]).await?;
        self.git.run(&["pull", "origin", main_branch]).await?;
        let head = self.git.run(&["rev-parse", "HEAD"]).await?;

        let result = self.merge_and_push(main_branch, sub_branch).await;
        if result.is_err() {
            self.roll_back(&head).await;
        }
        result
    }

    async fn merge_and_push(&self, main_branch: &str, sub_branch: &str) -> Result<(), GitError> {
        let remote_sub = format!("origin/{}", sub_branch);
        let message = format!("Merge sub-spec {}", sub_branch);

        self.git
            .run(&["merge", "--no-ff", &remote_sub, "-m", &message])
            .await?;
        self.git.run(&["push", "origin", main_branch]).await?;
        Ok(())
    }

    async fn roll_back(&self, head: &str) {
        if let Err(err) = self.git.run(&["merge", "--abort"]).await {
            debug!("merge --abort: {}", err);
        }
        if let Err(err) = self.git.run(&["reset", "--hard", head]).await {
            warn!("Failed to reset spec branch to {}: {}", head, err);
        }
    }

    fn write_conflict_record(&self, main_branch: &str, sub_branch: &str) -> Option<PathBuf> {
        let path = self.paths.paused_file();
        match fs::write(&path, conflict_record(main_branch, sub_branch)) {
            Ok(()) => Some(path),
            Err(err) => {
                warn!("Failed to write {}: {}", path.display(), err);
                None
            }
        }
    }

    /// Check out the spec branch, commit the manifest there and push it.
    pub async fn commit_checkpoint(
        &self,
        spec: &str,
        complete: usize,
        total: usize,
    ) -> Result<(), GitError> {
        let manifest = self.paths.manifest_repo_path(spec);
        let message = format!("Update manifest: {}/{} sub-specs complete", complete, total);
        let main_branch = spec_branch(spec);

        self.git.run(&["checkout", &main_branch]).await?;
        self.git.run(&["add", &manifest]).await?;
        self.git.run(&["commit", "-m", &message]).await?;
        self.git.run(&["push", "origin", &main_branch]).await?;
        Ok(())
    }
}
