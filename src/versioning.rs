//! Versioning engine: auto-fills the version field and runs bumps.
//!
//! Ties a parsed [Strategy] to a source-control backend. The engine is in
//! one of three states: disabled (no versioning requested), misconfigured
//! (requested, but the format failed to parse or no backend was found) and
//! active. Only the active state touches the backend; misconfiguration
//! degrades to warnings so a resolution pass always completes.

use std::env;
use std::path::{Path, PathBuf};

use crate::error::{PymetaError, Result};
use crate::hooks::{self, HookContext, HookExecutor};
use crate::scm::Scm;
use crate::store::{read_optional, MetaValue, SettingsStore, SourceRef};
use crate::strategy::Strategy;
use crate::ui;
use crate::version::Version;

/// CI override: when set non-empty, its value is used verbatim as the
/// version, skipping the backend entirely.
pub const VERSION_OVERRIDE_VAR: &str = "PYMETA_VERSION";

pub struct Versioning {
    project_root: PathBuf,
    strategy: Option<Strategy>,
    scm: Option<Box<dyn Scm>>,
    problem: Option<String>,
}

impl Versioning {
    /// Assemble the engine. `strategy` is `None` when the project does not
    /// request versioning; `scm` carries either the detected backend or the
    /// reason none was found.
    pub fn new(
        project_root: impl Into<PathBuf>,
        strategy: Option<Strategy>,
        scm: std::result::Result<Box<dyn Scm>, String>,
    ) -> Self {
        let project_root = project_root.into();
        let Some(strategy) = strategy else {
            return Versioning {
                project_root,
                strategy: None,
                scm: None,
                problem: None,
            };
        };
        let (scm, scm_problem) = match scm {
            Ok(scm) => (Some(scm), None),
            Err(problem) => (None, Some(problem)),
        };
        let problem = strategy.problem.clone().or(scm_problem);
        Versioning {
            project_root,
            strategy: Some(strategy),
            scm,
            problem,
        }
    }

    /// Versioning requested by the project?
    pub fn enabled(&self) -> bool {
        self.strategy.is_some()
    }

    /// Why the engine is unusable, when it is
    pub fn problem(&self) -> Option<&str> {
        self.problem.as_deref()
    }

    pub fn strategy(&self) -> Option<&Strategy> {
        self.strategy.as_ref()
    }

    fn require_active(&self) -> Result<(&Strategy, &dyn Scm)> {
        if !self.enabled() {
            return Err(PymetaError::usage("versioning is not enabled, can't bump"));
        }
        if let Some(problem) = &self.problem {
            return Err(PymetaError::usage(problem.clone()));
        }
        match (&self.strategy, &self.scm) {
            (Some(strategy), Some(scm)) => Ok((strategy, scm.as_ref())),
            _ => Err(PymetaError::usage("versioning is not enabled, can't bump")),
        }
    }

    fn current_version(&self, scm: &dyn Scm) -> Result<Version> {
        match scm.get_version()? {
            Some(version) => Ok(version),
            None => Err(PymetaError::usage(format!(
                "could not determine current version from {}",
                scm.name()
            ))),
        }
    }

    /// Contribute the version field to a resolution pass.
    ///
    /// No-op when disabled. The `PYMETA_VERSION` override wins over
    /// everything, including a misconfigured engine. A misconfigured engine
    /// warns and falls back to a "0.0.0" placeholder so resolution always
    /// yields some version. An active engine renders the backend's
    /// descriptor through the strategy and overrides whatever the file scan
    /// recorded, warning when the recorded value is not a prefix of the
    /// rendered one.
    pub fn auto_fill_version(&self, store: &mut SettingsStore) -> Result<()> {
        if !self.enabled() {
            return Ok(());
        }
        if let Ok(value) = env::var(VERSION_OVERRIDE_VAR) {
            let value = value.trim().to_string();
            if !value.is_empty() {
                store.auto_fill(
                    "version",
                    MetaValue::str(value),
                    SourceRef::named(format!("${}", VERSION_OVERRIDE_VAR)),
                    true,
                );
                return Ok(());
            }
        }
        if let Some(problem) = &self.problem {
            store.warn(problem.clone());
            if store.value("version").is_none() {
                store.auto_fill(
                    "version",
                    MetaValue::str("0.0.0"),
                    SourceRef::auto_fill(),
                    false,
                );
            }
            return Ok(());
        }
        let (strategy, scm) = self.require_active()?;
        let Some(version) = scm.get_version()? else {
            tracing::debug!("no version information from {}", scm.name());
            return Ok(());
        };
        let Some(rendered) = strategy.rendered(&version) else {
            return Ok(());
        };
        let mismatch = store
            .definition("version")
            .and_then(|d| d.entries().first())
            .and_then(|entry| {
                let existing = entry.value.as_str()?;
                let expected: String = rendered.chars().take(existing.chars().count()).collect();
                (expected != existing).then(|| {
                    format!(
                        "in {} version should be {}, not {}",
                        entry.source, expected, existing
                    )
                })
            });
        if let Some(message) = mismatch {
            store.warn(message);
        }
        store.auto_fill(
            "version",
            MetaValue::str(rendered),
            SourceRef::named(scm.name()),
            true,
        );
        Ok(())
    }

    /// Next version `what` would bump to, without touching anything
    pub fn get_bump(&self, what: &str) -> Result<String> {
        let (strategy, scm) = self.require_active()?;
        let current = self.current_version(scm)?;
        strategy.bumped(what, &current)
    }

    /// Run the bump workflow: check branch and tree state, compute the next
    /// version, rewrite recorded version lines, then commit, tag and
    /// optionally push. Without `commit` every mutation is echoed instead of
    /// executed. Returns the next version.
    pub fn bump(
        &self,
        store: &SettingsStore,
        what: &str,
        commit: bool,
        push: bool,
        commit_all: bool,
    ) -> Result<String> {
        let (strategy, scm) = self.require_active()?;
        let branch = scm.get_branch()?;
        if !strategy.branch_allowed(&branch) {
            return Err(PymetaError::usage(format!(
                "can't bump branch '{}', need one of: {}",
                branch,
                strategy.branches.join(", ")
            )));
        }
        let current = self.current_version(scm)?;
        if commit && current.dirty && !commit_all {
            return Err(PymetaError::usage(
                "checkout is dirty, commit pending changes first (or pass --all to commit everything)",
            ));
        }
        let next = strategy.bumped(what, &current)?;
        warn_if_not_increasing(&current, &next);
        let dry_run = !commit;
        if dry_run {
            ui::display_status("Not committing bump, use --commit to effectively bump");
        }
        let updated = self.update_sources(store, &next, dry_run)?;
        let paths = if commit_all && (current.dirty || !updated.is_empty()) {
            vec![PathBuf::from(".")]
        } else {
            updated
        };
        scm.commit_files(&paths, &next, dry_run)?;
        scm.apply_tag(&branch, &next, push, dry_run)?;
        if let Some(hook) = hooks::find_bump_hook(&self.project_root) {
            let context = HookContext {
                version: next.clone(),
                tag: format!("v{}", next),
                branch,
                dry_run,
            };
            HookExecutor::execute_permissive(&hook, &context);
        }
        Ok(next)
    }

    /// Rewrite every file location on record for the version field to carry
    /// `next`. Returns the paths that were (or in a dry run, would be)
    /// rewritten.
    fn update_sources(
        &self,
        store: &SettingsStore,
        next: &str,
        dry_run: bool,
    ) -> Result<Vec<PathBuf>> {
        let Some(definition) = store.definition("version") else {
            return Ok(Vec::new());
        };
        let mut updated = Vec::new();
        for entry in definition.entries() {
            let Some(relative) = entry.source.file_path() else {
                continue;
            };
            let Some(line_number) = entry.source.line() else {
                continue;
            };
            let Some(recorded) = entry.value.as_str() else {
                continue;
            };
            if self.update_one(relative, line_number, recorded, next, dry_run)? {
                updated.push(self.project_root.join(relative));
            }
        }
        Ok(updated)
    }

    fn update_one(
        &self,
        relative: &Path,
        line_number: usize,
        recorded: &str,
        next: &str,
        dry_run: bool,
    ) -> Result<bool> {
        let full = self.project_root.join(relative);
        let Some(content) = read_optional(&full)? else {
            ui::display_warning(&format!(
                "{} no longer exists, version line not updated",
                relative.display()
            ));
            return Ok(false);
        };
        let Some(revised) = rewritten_content(&content, line_number, recorded, next) else {
            ui::display_warning(&format!(
                "{} line {} doesn't contain version {}, leaving as-is",
                relative.display(),
                line_number,
                recorded
            ));
            return Ok(false);
        };
        if dry_run {
            println!("Would update {}", relative.display());
        } else {
            std::fs::write(&full, revised)?;
            println!("Updated {}", relative.display());
        }
        Ok(true)
    }
}

/// Replace the first occurrence of `recorded` on 1-based `line_number` with
/// `next`, leaving every other byte untouched. Quoting, the `=` vs `:`
/// operator and any trailing text survive because only the value text is
/// substituted. `None` when the line no longer carries the recorded value.
fn rewritten_content(
    content: &str,
    line_number: usize,
    recorded: &str,
    next: &str,
) -> Option<String> {
    if recorded.is_empty() {
        return None;
    }
    let mut out = String::with_capacity(content.len());
    let mut found = false;
    for (index, line) in content.split_inclusive('\n').enumerate() {
        if index + 1 == line_number {
            if !line.contains(recorded) {
                return None;
            }
            out.push_str(&line.replacen(recorded, next, 1));
            found = true;
        } else {
            out.push_str(line);
        }
    }
    found.then_some(out)
}

/// Flag a bump that does not move the version forward. Only applies when
/// both sides parse as full three-component semver.
fn warn_if_not_increasing(current: &Version, next: &str) {
    let Ok(next_version) = semver::Version::parse(next) else {
        return;
    };
    let Ok(current_version) = semver::Version::parse(&current.main_text()) else {
        return;
    };
    if next_version <= current_version {
        ui::display_warning(&format!(
            "next version {} does not exceed current {}",
            next_version, current_version
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scm::{MockScm, ScmOp};
    use serial_test::serial;
    use std::collections::BTreeSet;
    use std::rc::Rc;

    /// Delegating wrapper so a test can keep a handle on the mock after
    /// moving it into the engine.
    #[derive(Debug)]
    struct SharedScm(Rc<MockScm>);

    impl Scm for SharedScm {
        fn name(&self) -> &'static str {
            self.0.name()
        }
        fn root(&self) -> &Path {
            self.0.root()
        }
        fn is_dirty(&self) -> Result<bool> {
            self.0.is_dirty()
        }
        fn get_branch(&self) -> Result<String> {
            self.0.get_branch()
        }
        fn get_version(&self) -> Result<Option<Version>> {
            self.0.get_version()
        }
        fn local_tags(&self) -> Result<BTreeSet<String>> {
            self.0.local_tags()
        }
        fn remote_tags(&self) -> Result<BTreeSet<String>> {
            self.0.remote_tags()
        }
        fn commit_files(&self, paths: &[PathBuf], next_version: &str, dry_run: bool) -> Result<()> {
            self.0.commit_files(paths, next_version, dry_run)
        }
        fn apply_tag(&self, branch: &str, next_version: &str, push: bool, dry_run: bool) -> Result<()> {
            self.0.apply_tag(branch, next_version, push, dry_run)
        }
    }

    fn engine_with(mock: MockScm, format: &str, root: &Path) -> (Versioning, Rc<MockScm>) {
        let mock = Rc::new(mock);
        let versioning = Versioning::new(
            root,
            Some(Strategy::from_text(format)),
            Ok(Box::new(SharedScm(Rc::clone(&mock)))),
        );
        (versioning, mock)
    }

    fn tagged(main: &str, distance: u32, dirty: bool) -> Version {
        Version::new(Some(main), distance, Some("gabc1234"), dirty)
    }

    #[test]
    fn test_disabled_engine_is_inert() {
        let versioning = Versioning::new(".", None, Err("no backend".to_string()));
        assert!(!versioning.enabled());
        assert!(versioning.problem().is_none());

        let mut store = SettingsStore::new();
        versioning.auto_fill_version(&mut store).unwrap();
        assert!(store.definition("version").is_none());
        assert!(store.warnings().is_empty());

        let err = versioning.get_bump("minor").unwrap_err();
        assert!(err.to_string().contains("not enabled"));
    }

    #[test]
    #[serial]
    fn test_misconfigured_fills_placeholder_and_warns() {
        env::remove_var(VERSION_OVERRIDE_VAR);
        let versioning = Versioning::new(
            ".",
            Some(Strategy::from_text("{oops}")),
            Err("ignored".to_string()),
        );
        assert!(versioning.enabled());
        assert_eq!(versioning.problem(), Some("unknown field '{oops}'"));

        let mut store = SettingsStore::new();
        versioning.auto_fill_version(&mut store).unwrap();
        assert_eq!(store.value_str("version"), Some("0.0.0"));
        assert_eq!(store.warnings(), ["unknown field '{oops}'"]);

        // bump escalates the same problem to a fatal error
        let err = versioning.get_bump("minor").unwrap_err();
        assert!(err.to_string().contains("unknown field"));
    }

    #[test]
    #[serial]
    fn test_misconfigured_keeps_existing_version() {
        env::remove_var(VERSION_OVERRIDE_VAR);
        let versioning = Versioning::new(
            ".",
            Some(Strategy::from_text("post")),
            Err("project is not under a supported source-control system".to_string()),
        );

        let mut store = SettingsStore::new();
        store.add_definition(
            "version",
            MetaValue::str("1.0"),
            SourceRef::file("setup.py", Some(4)),
            false,
        );
        versioning.auto_fill_version(&mut store).unwrap();
        assert_eq!(store.value_str("version"), Some("1.0"));
        assert_eq!(store.definition("version").unwrap().entries().len(), 1);
        assert_eq!(store.warnings().len(), 1);
    }

    #[test]
    #[serial]
    fn test_active_renders_and_overrides() {
        env::remove_var(VERSION_OVERRIDE_VAR);
        let dir = tempfile::tempdir().unwrap();
        let mock = MockScm::new(dir.path()).with_version(tagged("1.2.3", 2, false));
        let (versioning, _) = engine_with(mock, "post", dir.path());

        let mut store = SettingsStore::new();
        store.add_definition(
            "version",
            MetaValue::str("1.2.3"),
            SourceRef::file("pkg/__init__.py", Some(3)),
            false,
        );
        versioning.auto_fill_version(&mut store).unwrap();

        assert_eq!(store.value_str("version"), Some("1.2.3.post2"));
        let def = store.definition("version").unwrap();
        assert_eq!(def.entries()[0].source.label(), "mock");
        assert_eq!(def.entries()[1].source.label(), "pkg/__init__.py");
        // recorded value is a prefix of the rendered one, no mismatch
        assert!(store.warnings().is_empty());
    }

    #[test]
    #[serial]
    fn test_active_warns_on_prefix_mismatch() {
        env::remove_var(VERSION_OVERRIDE_VAR);
        let dir = tempfile::tempdir().unwrap();
        let mock = MockScm::new(dir.path()).with_version(tagged("1.2.3", 2, false));
        let (versioning, _) = engine_with(mock, "post", dir.path());

        let mut store = SettingsStore::new();
        store.add_definition(
            "version",
            MetaValue::str("2.0"),
            SourceRef::file("setup.py", Some(3)),
            false,
        );
        versioning.auto_fill_version(&mut store).unwrap();

        assert_eq!(store.value_str("version"), Some("1.2.3.post2"));
        assert_eq!(
            store.warnings(),
            ["in setup.py:3 version should be 1.2, not 2.0"]
        );
    }

    #[test]
    #[serial]
    fn test_version_override_env_wins() {
        let versioning = Versioning::new(
            ".",
            Some(Strategy::from_text("{oops}")),
            Err("no backend".to_string()),
        );

        env::set_var(VERSION_OVERRIDE_VAR, "9.9.9");
        let mut store = SettingsStore::new();
        versioning.auto_fill_version(&mut store).unwrap();
        env::remove_var(VERSION_OVERRIDE_VAR);

        assert_eq!(store.value_str("version"), Some("9.9.9"));
        let def = store.definition("version").unwrap();
        assert_eq!(def.entries()[0].source.label(), "$PYMETA_VERSION");
        // the override sidesteps the configuration problem entirely
        assert!(store.warnings().is_empty());
    }

    #[test]
    fn test_bump_refuses_wrong_branch() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockScm::new(dir.path())
            .with_branch("feature/x")
            .with_version(tagged("1.2.3", 0, false));
        let (versioning, _) = engine_with(mock, "post", dir.path());

        let store = SettingsStore::new();
        let err = versioning
            .bump(&store, "minor", false, false, false)
            .unwrap_err();
        assert!(err.to_string().contains("can't bump branch 'feature/x'"));
        assert!(err.to_string().contains("master"));
    }

    #[test]
    fn test_bump_refuses_dirty_commit_without_all() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockScm::new(dir.path())
            .with_dirty(true)
            .with_version(tagged("1.2.3", 0, true));
        let (versioning, mock) = engine_with(mock, "post", dir.path());

        let store = SettingsStore::new();
        let err = versioning
            .bump(&store, "patch", true, false, false)
            .unwrap_err();
        assert!(err.to_string().contains("dirty"));

        // a dry run on a dirty tree is fine
        let next = versioning.bump(&store, "patch", false, false, false).unwrap();
        assert_eq!(next, "1.2.4");
        let ops = mock.recorded();
        assert_eq!(ops.len(), 1);
        assert!(matches!(&ops[0], ScmOp::Tag { name, dry_run: true, .. } if name == "v1.2.4"));
    }

    #[test]
    fn test_bump_rewrites_commits_tags_and_pushes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("pkg")).unwrap();
        let init = dir.path().join("pkg/__init__.py");
        std::fs::write(&init, "\"\"\"Demo.\"\"\"\n__version__ = \"1.2.3\"\n").unwrap();

        let mock = MockScm::new(dir.path()).with_version(tagged("1.2.3", 0, false));
        let (versioning, mock) = engine_with(mock, "post", dir.path());

        let mut store = SettingsStore::new();
        store.add_definition(
            "version",
            MetaValue::str("1.2.3"),
            SourceRef::file("pkg/__init__.py", Some(2)),
            false,
        );

        let next = versioning.bump(&store, "minor", true, true, false).unwrap();
        assert_eq!(next, "1.3.0");
        assert_eq!(
            std::fs::read_to_string(&init).unwrap(),
            "\"\"\"Demo.\"\"\"\n__version__ = \"1.3.0\"\n"
        );

        let ops = mock.recorded();
        assert_eq!(ops.len(), 3);
        assert_eq!(
            ops[0],
            ScmOp::Commit {
                files: vec![init.display().to_string()],
                message: "Version 1.3.0".to_string(),
                dry_run: false,
            }
        );
        assert!(matches!(&ops[1], ScmOp::Tag { name, dry_run: false, .. } if name == "v1.3.0"));
        assert!(matches!(&ops[2], ScmOp::Push { branch, dry_run: false } if branch == "master"));
    }

    #[test]
    fn test_bump_dry_run_leaves_files_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let setup = dir.path().join("setup.py");
        std::fs::write(&setup, "setup(\n    version=\"0.4.0\",\n)\n").unwrap();

        let mock = MockScm::new(dir.path()).with_version(tagged("0.4.0", 1, false));
        let (versioning, mock) = engine_with(mock, "post", dir.path());

        let mut store = SettingsStore::new();
        store.add_definition(
            "version",
            MetaValue::str("0.4.0"),
            SourceRef::file("setup.py", Some(2)),
            false,
        );

        let next = versioning.bump(&store, "patch", false, false, false).unwrap();
        assert_eq!(next, "0.4.1");
        assert_eq!(
            std::fs::read_to_string(&setup).unwrap(),
            "setup(\n    version=\"0.4.0\",\n)\n"
        );
        let ops = mock.recorded();
        assert!(matches!(&ops[0], ScmOp::Commit { dry_run: true, .. }));
        assert!(matches!(&ops[1], ScmOp::Tag { dry_run: true, .. }));
    }

    #[test]
    fn test_bump_commit_all_stages_everything() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockScm::new(dir.path())
            .with_dirty(true)
            .with_version(tagged("1.0.0", 0, true));
        let (versioning, mock) = engine_with(mock, "post", dir.path());

        let store = SettingsStore::new();
        let next = versioning.bump(&store, "major", true, false, true).unwrap();
        assert_eq!(next, "2.0.0");
        let ops = mock.recorded();
        assert_eq!(
            ops[0],
            ScmOp::Commit {
                files: vec![".".to_string()],
                message: "Version 2.0.0".to_string(),
                dry_run: false,
            }
        );
    }

    #[test]
    fn test_get_bump_reports_next_version() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockScm::new(dir.path()).with_version(tagged("1.2.3", 5, false));
        let (versioning, _) = engine_with(mock, "post", dir.path());

        assert_eq!(versioning.get_bump("major").unwrap(), "2.0.0");
        assert_eq!(versioning.get_bump("patch").unwrap(), "1.2.4");
        assert!(versioning.get_bump("nano").is_err());
    }

    #[test]
    fn test_rewritten_content_preserves_style() {
        let content = "a = 1\nversion = '1.2.3'  # pinned\n";
        let out = rewritten_content(content, 2, "1.2.3", "1.3.0").unwrap();
        assert_eq!(out, "a = 1\nversion = '1.3.0'  # pinned\n");

        let content = "\"\"\"\nversion: 1.2.3\n\"\"\"\n";
        let out = rewritten_content(content, 2, "1.2.3", "1.3.0").unwrap();
        assert_eq!(out, "\"\"\"\nversion: 1.3.0\n\"\"\"\n");
    }

    #[test]
    fn test_rewritten_content_mismatch_is_none() {
        let content = "version = \"2.0.0\"\n";
        assert!(rewritten_content(content, 1, "1.2.3", "1.3.0").is_none());
        // line number past the end of the file
        assert!(rewritten_content(content, 5, "2.0.0", "2.1.0").is_none());
        assert!(rewritten_content(content, 1, "", "2.1.0").is_none());
    }
}
