//! Git plumbing: branch naming, repository queries and branch integration.

pub mod integrate;
pub mod ops;

use tracing::debug;

pub use integrate::{conflict_record, BranchIntegrator, MergeOutcome};
pub use ops::{GitCli, GitError, GitOps};

/// Fallback when the current branch cannot be determined.
pub const DEFAULT_BASE_BRANCH: &str = "main";

/// The shared integration branch for a spec, `ralph/<spec>`.
pub fn spec_branch(spec: &str) -> String {
    format!("ralph/{}", spec)
}

/// The working branch of one sub-spec, `ralph/<spec>/<sub_spec>`.
pub fn sub_spec_branch(spec: &str, sub_spec: &str) -> String {
    format!("ralph/{}/{}", spec, sub_spec)
}

/// Rewrite SSH GitHub remotes to HTTPS so units can clone with a token.
pub fn normalize_remote_url(url: &str) -> String {
    match url.strip_prefix("git@github.com:") {
        Some(path) => format!("https://github.com/{}", path),
        None => url.to_string(),
    }
}

/// URL of the `origin` remote, normalized. `None` when there is no remote.
pub async fn remote_url(git: &dyn GitOps) -> Option<String> {
    match git.run(&["remote", "get-url", "origin"]).await {
        Ok(url) if !url.is_empty() => Some(normalize_remote_url(&url)),
        Ok(_) => None,
        Err(err) => {
            debug!("no origin remote: {}", err);
            None
        }
    }
}

/// The checked-out branch, or [`DEFAULT_BASE_BRANCH`] when detached or not
/// in a repository.
pub async fn current_branch(git: &dyn GitOps) -> String {
    match git.run(&["branch", "--show-current"]).await {
        Ok(branch) if !branch.is_empty() => branch,
        Ok(_) => DEFAULT_BASE_BRANCH.to_string(),
        Err(err) => {
            debug!("could not determine current branch: {}", err);
            DEFAULT_BASE_BRANCH.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeGit;

    #[test]
    fn test_branch_names() {
        assert_eq!(spec_branch("auth"), "ralph/auth");
        assert_eq!(sub_spec_branch("auth", "login-api"), "ralph/auth/login-api");
    }

    #[test]
    fn test_normalize_remote_url() {
        assert_eq!(
            normalize_remote_url("git@github.com:acme/app.git"),
            "https://github.com/acme/app.git"
        );
        assert_eq!(
            normalize_remote_url("https://gitlab.com/acme/app.git"),
            "https://gitlab.com/acme/app.git"
        );
    }

    #[tokio::test]
    async fn test_remote_url_and_branch_from_git() {
        let git = FakeGit::new();
        assert_eq!(
            remote_url(&git).await.as_deref(),
            Some("https://github.com/acme/app.git")
        );
        assert_eq!(current_branch(&git).await, "feature/x");
    }

    #[tokio::test]
    async fn test_fallbacks_without_repository() {
        let git = FakeGit::new().without_remote().detached();
        assert_eq!(remote_url(&git).await, None);
        assert_eq!(current_branch(&git).await, DEFAULT_BASE_BRANCH);
    }
}
