//! Canned source-control state for tests.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::scm::Scm;
use crate::version::Version;

/// One recorded mutating operation, for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScmOp {
    Commit {
        files: Vec<String>,
        message: String,
        dry_run: bool,
    },
    Tag {
        name: String,
        message: String,
        dry_run: bool,
    },
    Push {
        branch: String,
        dry_run: bool,
    },
}

/// Mock backend with fixed answers and an operation log.
#[derive(Debug)]
pub struct MockScm {
    root: PathBuf,
    branch: String,
    dirty: bool,
    version: Option<Version>,
    local: BTreeSet<String>,
    remote: BTreeSet<String>,
    operations: RefCell<Vec<ScmOp>>,
}

impl MockScm {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        MockScm {
            root: root.into(),
            branch: "master".to_string(),
            dirty: false,
            version: None,
            local: BTreeSet::new(),
            remote: BTreeSet::new(),
            operations: RefCell::new(Vec::new()),
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    pub fn with_dirty(mut self, dirty: bool) -> Self {
        self.dirty = dirty;
        self
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_local_tag(mut self, tag: impl Into<String>) -> Self {
        self.local.insert(tag.into());
        self
    }

    pub fn with_remote_tag(mut self, tag: impl Into<String>) -> Self {
        self.remote.insert(tag.into());
        self
    }

    /// Everything recorded so far, in call order
    pub fn recorded(&self) -> Vec<ScmOp> {
        self.operations.borrow().clone()
    }
}

impl Scm for MockScm {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn root(&self) -> &Path {
        &self.root
    }

    fn is_dirty(&self) -> Result<bool> {
        Ok(self.dirty)
    }

    fn get_branch(&self) -> Result<String> {
        Ok(self.branch.clone())
    }

    fn get_version(&self) -> Result<Option<Version>> {
        Ok(self.version.clone())
    }

    fn local_tags(&self) -> Result<BTreeSet<String>> {
        Ok(self.local.clone())
    }

    fn remote_tags(&self) -> Result<BTreeSet<String>> {
        Ok(self.remote.clone())
    }

    fn commit_files(&self, paths: &[PathBuf], next_version: &str, dry_run: bool) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        self.operations.borrow_mut().push(ScmOp::Commit {
            files: paths.iter().map(|p| p.display().to_string()).collect(),
            message: format!("Version {}", next_version),
            dry_run,
        });
        Ok(())
    }

    fn apply_tag(&self, branch: &str, next_version: &str, push: bool, dry_run: bool) -> Result<()> {
        self.operations.borrow_mut().push(ScmOp::Tag {
            name: format!("v{}", next_version),
            message: format!("Version {}", next_version),
            dry_run,
        });
        if push {
            self.operations.borrow_mut().push(ScmOp::Push {
                branch: branch.to_string(),
                dry_run,
            });
        }
        Ok(())
    }
}
