//! Live git backend, shelling out to the `git` executable.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{PymetaError, Result};
use crate::scm::{is_benign_failure, represented_args, CommandOutput, Scm};
use crate::version::Version;

/// Git adapter rooted at a checkout directory. Every operation runs `git`
/// with that directory as working directory and fully captured output.
#[derive(Debug)]
pub struct GitScm {
    root: PathBuf,
}

impl GitScm {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        GitScm { root: root.into() }
    }

    fn run_captured(&self, args: &[&str]) -> Result<CommandOutput> {
        tracing::debug!(args = %args.join(" "), root = %self.root.display(), "git");
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()
            .map_err(|e| PymetaError::scm(format!("could not run git: {}", e)))?;
        Ok(CommandOutput {
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    /// Run a read-only command. Benign failures yield `None` silently;
    /// other failures are fatal or downgraded to a logged warning depending
    /// on `fatal`.
    fn get_output(&self, args: &[&str], fatal: bool) -> Result<Option<String>> {
        let out = self.run_captured(args)?;
        if out.ok() {
            return Ok(Some(out.stdout));
        }
        if is_benign_failure(&out.stderr) {
            tracing::debug!("git {} failed benignly: {}", args.join(" "), out.stderr);
            return Ok(None);
        }
        let message = format!("git {} exited {}: {}", args.join(" "), out.code, out.stderr);
        if fatal {
            return Err(PymetaError::scm(message));
        }
        tracing::warn!("{}", message);
        Ok(None)
    }

    /// Run a mutating command, or echo it when `dry_run` is set.
    fn run(&self, dry_run: bool, args: &[&str]) -> Result<()> {
        if dry_run {
            println!("Would run: git {}", represented_args(args));
            return Ok(());
        }
        let out = self.run_captured(args)?;
        if !out.ok() {
            return Err(PymetaError::scm(format!(
                "git {} exited {}: {}",
                args.join(" "),
                out.code,
                out.stderr
            )));
        }
        Ok(())
    }

    /// True when the diff selected by `args` is empty. Exit code 1 means
    /// differences; a benign failure (fresh repository) counts as clean.
    fn diff_clean(&self, args: &[&str]) -> Result<bool> {
        let out = self.run_captured(args)?;
        match out.code {
            0 => Ok(true),
            1 => Ok(false),
            _ if is_benign_failure(&out.stderr) => Ok(true),
            _ => Err(PymetaError::scm(format!(
                "git {} exited {}: {}",
                args.join(" "),
                out.code,
                out.stderr
            ))),
        }
    }

    fn tag_set(&self, lines: Option<String>) -> BTreeSet<String> {
        lines
            .map(|text| {
                text.lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Paths as git should see them: relative to the checkout root when
    /// possible, absolute otherwise.
    fn repo_relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .display()
            .to_string()
    }

    /// Commits on origin/`branch` that the local branch does not have.
    /// `None` when origin or the remote-tracking ref is absent.
    fn behind_origin(&self, branch: &str) -> Result<Option<u32>> {
        let range = format!("HEAD..origin/{}", branch);
        let count = self.get_output(&["rev-list", "--count", &range], false)?;
        Ok(count.and_then(|c| c.parse().ok()))
    }
}

impl Scm for GitScm {
    fn name(&self) -> &'static str {
        "git"
    }

    fn root(&self) -> &Path {
        &self.root
    }

    fn is_dirty(&self) -> Result<bool> {
        let working = self.diff_clean(&["diff", "--quiet"])?;
        let staged = self.diff_clean(&["diff", "--cached", "--quiet"])?;
        Ok(!(working && staged))
    }

    fn get_branch(&self) -> Result<String> {
        let branch = self.get_output(&["rev-parse", "--abbrev-ref", "HEAD"], true)?;
        Ok(branch.unwrap_or_default())
    }

    fn get_version(&self) -> Result<Option<Version>> {
        let mut describe =
            self.get_output(&["describe", "--dirty", "--tags", "--long", "--match", "v*.*"], false)?;
        if describe.is_none() {
            // no versioned tag yet, accept any tag
            describe = self.get_output(&["describe", "--dirty", "--tags", "--long"], false)?;
        }
        if let Some(text) = describe {
            return Ok(Some(Version::from_descriptor(&text)));
        }
        // no tags at all: synthesize from commit count and head id
        let commitid = self
            .get_output(&["rev-parse", "--short", "HEAD"], false)?
            .map(|id| format!("g{}", id));
        let distance = self
            .get_output(&["rev-list", "--count", "HEAD"], false)?
            .and_then(|c| c.parse().ok())
            .unwrap_or(0);
        let dirty = self.is_dirty()?;
        Ok(Some(Version::new(None, distance, commitid.as_deref(), dirty)))
    }

    fn local_tags(&self) -> Result<BTreeSet<String>> {
        let out = self.get_output(&["tag", "--list"], false)?;
        Ok(self.tag_set(out))
    }

    fn remote_tags(&self) -> Result<BTreeSet<String>> {
        let out = self.get_output(&["ls-remote", "--tags", "origin"], false)?;
        let tags = out.map(|text| {
            text.lines()
                .filter_map(|line| line.split("refs/tags/").nth(1))
                .map(|t| t.trim_end_matches("^{}").trim().to_string())
                .filter(|t| !t.is_empty())
                .collect()
        });
        Ok(tags.unwrap_or_default())
    }

    fn commit_files(&self, paths: &[PathBuf], next_version: &str, dry_run: bool) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let mut relative: Vec<String> = paths.iter().map(|p| self.repo_relative(p)).collect();
        relative.sort();
        relative.dedup();

        let mut add_args = vec!["add"];
        add_args.extend(relative.iter().map(String::as_str));
        self.run(dry_run, &add_args)?;
        self.run(dry_run, &["commit", "-m", &format!("Version {}", next_version)])
    }

    fn apply_tag(&self, branch: &str, next_version: &str, push: bool, dry_run: bool) -> Result<()> {
        let tag = format!("v{}", next_version);
        if self.local_tags()?.contains(&tag) || self.remote_tags()?.contains(&tag) {
            return Err(PymetaError::usage(format!("tag {} already exists", tag)));
        }
        if let Some(behind) = self.behind_origin(branch)? {
            if behind > 0 {
                return Err(PymetaError::usage(format!(
                    "branch '{}' is out of date, {} commit(s) behind origin/{}, pull first",
                    branch, behind, branch
                )));
            }
        }
        let message = format!("Version {}", next_version);
        self.run(dry_run, &["tag", "-a", &tag, "-m", &message])?;
        if push {
            self.run(dry_run, &["push", "--tags", "origin", branch])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repo_relative_paths() {
        let scm = GitScm::new("/work/project");
        assert_eq!(scm.repo_relative(Path::new("/work/project/pkg/__init__.py")), "pkg/__init__.py");
        assert_eq!(scm.repo_relative(Path::new("/elsewhere/setup.py")), "/elsewhere/setup.py");
    }

    #[test]
    fn test_tag_set_splits_lines() {
        let scm = GitScm::new(".");
        let tags = scm.tag_set(Some("v1.0.0\nv1.1.0\n\n".to_string()));
        assert_eq!(tags.len(), 2);
        assert!(tags.contains("v1.0.0"));
        assert!(scm.tag_set(None).is_empty());
    }
}
