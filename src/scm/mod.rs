//! Source-control abstraction layer.
//!
//! The [Scm] trait defines the capability set the versioning engine needs:
//! dirty-state check, branch lookup, version description, tag listing, and
//! the commit/tag/push operations behind `bump`. Implementations:
//!
//! - [git::GitScm]: shells out to the `git` executable
//! - [snapshot::SnapshotScm]: no-history fallback reading a checked-in
//!   descriptor, for trees extracted from an archive
//! - [mock::MockScm]: canned state for tests
//!
//! All mutating operations take a `dry_run` flag; when set they print the
//! exact command they would run and report success without touching
//! anything, so callers behave identically in both modes.

pub mod git;
pub mod mock;
pub mod snapshot;

pub use git::GitScm;
pub use mock::{MockScm, ScmOp};
pub use snapshot::SnapshotScm;

use std::collections::BTreeSet;
use std::env;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::version::Version;

/// Environment variable overriding the snapshot descriptor
pub const SCM_DESCRIBE_VAR: &str = "SCM_DESCRIBE";
/// Checked-in snapshot descriptor file, one line, at the project root
pub const SCM_DESCRIBE_FILE: &str = ".scm-describe";

/// Stderr fragments of known-benign command failures, matched lowercase.
///
/// These are the "brand-new repository" situations: no tags to describe, no
/// commits yet, no remote configured. They are swallowed silently; every
/// other failure is surfaced.
pub const BENIGN_FAILURES: [&str; 8] = [
    "no names found",
    "cannot describe",
    "does not have any commits",
    "unknown revision",
    "bad revision",
    "no upstream configured",
    "does not appear to be a git repository",
    "no such remote",
];

/// True iff `stderr` matches the benign-failure allow-list
pub fn is_benign_failure(stderr: &str) -> bool {
    let stderr = stderr.to_lowercase();
    BENIGN_FAILURES.iter().any(|b| stderr.contains(b))
}

/// Captured result of one subprocess invocation.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(&self) -> bool {
        self.code == 0
    }
}

/// Render an argv the way it would be typed in a shell, quoting arguments
/// with embedded spaces. Used by dry-run echoes.
pub fn represented_args<S: AsRef<str>>(args: &[S]) -> String {
    args.iter()
        .map(|a| {
            let a = a.as_ref();
            if a.chars().any(char::is_whitespace) {
                format!("\"{}\"", a)
            } else {
                a.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Version-control backend capability set.
///
/// The resolution pass is single-threaded, so implementations take `&self`
/// everywhere and need no locking.
pub trait Scm: std::fmt::Debug {
    /// Backend name as used in source attributions, e.g. "git"
    fn name(&self) -> &'static str;

    /// Root directory of the checkout
    fn root(&self) -> &Path;

    /// Uncommitted changes present? Both the working tree and the staged
    /// index must be clean for `false`.
    fn is_dirty(&self) -> Result<bool>;

    /// Currently checked-out branch
    fn get_branch(&self) -> Result<String>;

    /// Current version per tag history, `None` when nothing is known
    fn get_version(&self) -> Result<Option<Version>>;

    /// Tags present in the local checkout
    fn local_tags(&self) -> Result<BTreeSet<String>>;

    /// Tags present on the origin remote
    fn remote_tags(&self) -> Result<BTreeSet<String>>;

    /// Stage and commit the given files with message "Version {next_version}"
    fn commit_files(&self, paths: &[PathBuf], next_version: &str, dry_run: bool) -> Result<()>;

    /// Apply tag `v{next_version}` on `branch`, pushing branch and tags to
    /// origin when `push` is set
    fn apply_tag(&self, branch: &str, next_version: &str, push: bool, dry_run: bool) -> Result<()>;
}

/// Pick the backend for a project tree.
///
/// `scm_attr` forces a backend by name; otherwise a snapshot descriptor
/// (environment or checked-in file) selects the snapshot backend, and an
/// upward search for a `.git` entry selects git. `repo_attr` pins the
/// source-control root explicitly, for packaging a subdirectory of a larger
/// checkout.
///
/// "No supported backend" is a configuration problem for the caller to
/// carry, not a fatal error, hence the `String` error type.
pub fn detect(
    project_root: &Path,
    scm_attr: Option<&str>,
    repo_attr: Option<&Path>,
) -> std::result::Result<Box<dyn Scm>, String> {
    match scm_attr {
        Some("git") => {
            let root = repo_attr
                .map(Path::to_path_buf)
                .or_else(|| find_git_root(project_root))
                .unwrap_or_else(|| project_root.to_path_buf());
            Ok(Box::new(GitScm::new(root)))
        }
        Some("snapshot") => Ok(Box::new(SnapshotScm::new(project_root))),
        Some(other) => Err(format!("unsupported scm '{}'", other)),
        None => {
            if snapshot_descriptor(project_root).is_some() {
                return Ok(Box::new(SnapshotScm::new(project_root)));
            }
            if let Some(root) = repo_attr {
                return Ok(Box::new(GitScm::new(root)));
            }
            match find_git_root(project_root) {
                Some(root) => Ok(Box::new(GitScm::new(root))),
                None => Err("project is not under a supported source-control system".to_string()),
            }
        }
    }
}

/// Walk upward from `start` looking for a `.git` entry (directory, or file
/// for linked worktrees).
pub fn find_git_root(start: &Path) -> Option<PathBuf> {
    let mut dir = Some(start);
    while let Some(d) = dir {
        if d.join(".git").exists() {
            return Some(d.to_path_buf());
        }
        dir = d.parent();
    }
    None
}

/// The snapshot descriptor for `root`, if one is configured: the
/// `SCM_DESCRIBE` environment variable wins over the checked-in file.
pub fn snapshot_descriptor(root: &Path) -> Option<String> {
    if let Ok(text) = env::var(SCM_DESCRIBE_VAR) {
        let text = text.trim().to_string();
        if !text.is_empty() {
            return Some(text);
        }
    }
    let file = root.join(SCM_DESCRIBE_FILE);
    let text = std::fs::read_to_string(file).ok()?;
    let line = text.lines().next().unwrap_or("").trim().to_string();
    if line.is_empty() {
        None
    } else {
        Some(line)
    }
}
