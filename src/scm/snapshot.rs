//! No-history fallback backend.
//!
//! A tree extracted from an archive has no source-control metadata; the
//! descriptor is instead taken from the `SCM_DESCRIBE` environment variable
//! or a one-line `.scm-describe` file checked in at the project root. This
//! backend never shells out, and refuses every mutating operation.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::error::{PymetaError, Result};
use crate::scm::{snapshot_descriptor, Scm};
use crate::version::Version;

#[derive(Debug)]
pub struct SnapshotScm {
    root: PathBuf,
    descriptor: Option<String>,
}

impl SnapshotScm {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let descriptor = snapshot_descriptor(&root);
        SnapshotScm { root, descriptor }
    }

    fn unsupported<T>(&self, operation: &str) -> Result<T> {
        Err(PymetaError::usage(format!(
            "can't run {}: no source-control metadata in snapshot mode",
            operation
        )))
    }
}

impl Scm for SnapshotScm {
    fn name(&self) -> &'static str {
        "snapshot"
    }

    fn root(&self) -> &Path {
        &self.root
    }

    fn is_dirty(&self) -> Result<bool> {
        Ok(self
            .descriptor
            .as_deref()
            .map(|d| Version::from_descriptor(d).dirty)
            .unwrap_or(false))
    }

    fn get_branch(&self) -> Result<String> {
        self.unsupported("branch lookup")
    }

    fn get_version(&self) -> Result<Option<Version>> {
        Ok(self.descriptor.as_deref().map(Version::from_descriptor))
    }

    fn local_tags(&self) -> Result<BTreeSet<String>> {
        Ok(BTreeSet::new())
    }

    fn remote_tags(&self) -> Result<BTreeSet<String>> {
        Ok(BTreeSet::new())
    }

    fn commit_files(&self, _paths: &[PathBuf], _next_version: &str, _dry_run: bool) -> Result<()> {
        self.unsupported("commit")
    }

    fn apply_tag(&self, _branch: &str, _next_version: &str, _push: bool, _dry_run: bool) -> Result<()> {
        self.unsupported("tag")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_version_from_descriptor_file() {
        let dir = tempfile::tempdir().unwrap();
        std::env::remove_var(crate::scm::SCM_DESCRIBE_VAR);
        std::fs::write(dir.path().join(".scm-describe"), "v1.4.0-2-gfeed123-dirty\n").unwrap();

        let scm = SnapshotScm::new(dir.path());
        let version = scm.get_version().unwrap().unwrap();
        assert_eq!(version.main_text(), "1.4.0");
        assert_eq!(version.distance, 2);
        assert!(version.dirty);
        assert!(scm.is_dirty().unwrap());
    }

    #[test]
    #[serial]
    fn test_no_descriptor_means_no_version() {
        let dir = tempfile::tempdir().unwrap();
        std::env::remove_var(crate::scm::SCM_DESCRIBE_VAR);

        let scm = SnapshotScm::new(dir.path());
        assert!(scm.get_version().unwrap().is_none());
        assert!(!scm.is_dirty().unwrap());
    }

    #[test]
    #[serial]
    fn test_mutations_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        std::env::remove_var(crate::scm::SCM_DESCRIBE_VAR);
        let scm = SnapshotScm::new(dir.path());

        assert!(scm.commit_files(&[], "1.0.0", true).is_err());
        assert!(scm.apply_tag("master", "1.0.0", false, true).is_err());
        assert!(scm.get_branch().is_err());
    }
}
