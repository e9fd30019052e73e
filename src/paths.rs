//! Well-known locations inside a Ralph-enabled repository.

use std::io;
use std::path::{Path, PathBuf};

const RALPH_DIR_NAME: &str = ".ralph";
const SPECS_DIR_NAME: &str = "specs";
const MANIFEST_FILE_NAME: &str = "manifest.json";
const ENV_FILE_NAME: &str = ".env";
const PAUSED_FILE_NAME: &str = "paused.md";
const CONFIG_FILE_NAME: &str = "config.toml";
const LOCK_FILE_NAME: &str = ".parallel-full.lock";

/// Paths rooted at the user's repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RalphPaths {
    repo_dir: PathBuf,
    ralph_dir: PathBuf,
}

impl RalphPaths {
    /// Create paths rooted at the given repository directory.
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        let repo_dir = repo_dir.into();
        let ralph_dir = repo_dir.join(RALPH_DIR_NAME);
        Self {
            repo_dir,
            ralph_dir,
        }
    }

    /// Create paths rooted at the process working directory.
    pub fn from_current_dir() -> io::Result<Self> {
        Ok(Self::new(std::env::current_dir()?))
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    pub fn ralph_dir(&self) -> &Path {
        &self.ralph_dir
    }

    /// Whether `ralph init` has been run in this repository.
    pub fn is_initialized(&self) -> bool {
        self.ralph_dir.is_dir()
    }

    pub fn specs_dir(&self) -> PathBuf {
        self.ralph_dir.join(SPECS_DIR_NAME)
    }

    /// The spec markdown file, `.ralph/specs/<spec>.md`.
    pub fn spec_file(&self, spec: &str) -> PathBuf {
        self.specs_dir().join(format!("{}.md", spec))
    }

    /// Per-spec working directory, `.ralph/specs/<spec>/`.
    pub fn spec_dir(&self, spec: &str) -> PathBuf {
        self.specs_dir().join(spec)
    }

    pub fn manifest_path(&self, spec: &str) -> PathBuf {
        self.spec_dir(spec).join(MANIFEST_FILE_NAME)
    }

    /// Manifest path relative to the repository root, as git expects it.
    pub fn manifest_repo_path(&self, spec: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            RALPH_DIR_NAME, SPECS_DIR_NAME, spec, MANIFEST_FILE_NAME
        )
    }

    pub fn env_file(&self) -> PathBuf {
        self.ralph_dir.join(ENV_FILE_NAME)
    }

    /// Conflict record written when a sub-spec branch cannot be merged.
    pub fn paused_file(&self) -> PathBuf {
        self.ralph_dir.join(PAUSED_FILE_NAME)
    }

    pub fn config_file(&self) -> PathBuf {
        self.ralph_dir.join(CONFIG_FILE_NAME)
    }

    pub fn lock_file(&self, spec: &str) -> PathBuf {
        self.spec_dir(spec).join(LOCK_FILE_NAME)
    }

    /// Directory mounted read-only into every execution unit.
    pub fn default_lib_dir(&self) -> PathBuf {
        self.ralph_dir.join("lib")
    }

    /// Build context for the execution image.
    pub fn default_docker_context(&self) -> PathBuf {
        self.default_lib_dir().join("docker")
    }

    /// Repository directory name, normalized for image and container names.
    pub fn repo_name(&self) -> String {
        let name = self
            .repo_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "repo".to_string());
        sanitize_name(&name)
    }
}

/// Lowercase a name and replace anything outside `[a-z0-9-]` with `-`.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Convert a host path into the form `docker -v` accepts on this platform.
pub fn to_docker_path(path: &Path) -> String {
    let raw = path.to_string_lossy();
    if !cfg!(windows) {
        return raw.into_owned();
    }
    let forward = raw.replace('\\', "/");
    let mut chars = forward.chars();
    match (chars.next(), chars.next()) {
        (Some(drive), Some(':')) if drive.is_ascii_alphabetic() => {
            format!("/{}{}", drive.to_ascii_lowercase(), chars.as_str())
        }
        _ => forward,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let paths = RalphPaths::new("/work/My Repo");
        assert_eq!(paths.ralph_dir(), Path::new("/work/My Repo/.ralph"));
        assert_eq!(
            paths.manifest_path("auth"),
            PathBuf::from("/work/My Repo/.ralph/specs/auth/manifest.json")
        );
        assert_eq!(
            paths.spec_file("auth"),
            PathBuf::from("/work/My Repo/.ralph/specs/auth.md")
        );
        assert_eq!(
            paths.manifest_repo_path("auth"),
            ".ralph/specs/auth/manifest.json"
        );
        assert_eq!(paths.paused_file(), PathBuf::from("/work/My Repo/.ralph/paused.md"));
    }

    #[test]
    fn test_repo_name_is_sanitized() {
        let paths = RalphPaths::new("/work/My_Repo.v2");
        assert_eq!(paths.repo_name(), "my-repo-v2");
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("Auth/Login API"), "auth-login-api");
        assert_eq!(sanitize_name("already-ok-42"), "already-ok-42");
    }

    #[cfg(not(windows))]
    #[test]
    fn test_docker_path_is_unchanged_off_windows() {
        assert_eq!(to_docker_path(Path::new("/opt/ralph/lib")), "/opt/ralph/lib");
    }
}
