//! Requirements-file parsing.
//!
//! Pinned runtime requirements feed `install_requires`, their test
//! counterpart feeds `tests_require`. Editable and VCS lines become
//! `dependency_links` with a best-effort distribution name. `-r` includes
//! are followed recursively with a cycle guard.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::store::{read_optional, MetaValue, SettingsStore, SourceRef};

/// Files consulted for runtime requirements, in order
const INSTALL_CANDIDATES: [&str; 2] = ["requirements.txt", "requirements/production.txt"];

/// Files consulted for test requirements, in order
const TEST_CANDIDATES: [&str; 2] = ["tests/requirements.txt", "requirements-dev.txt"];

const VCS_PREFIXES: [&str; 4] = ["git+", "hg+", "svn+", "bzr+"];

#[derive(Debug, Default)]
struct ParsedRequirements {
    requirements: Vec<String>,
    links: Vec<String>,
}

impl ParsedRequirements {
    fn add_link(&mut self, url: &str) {
        if let Some(name) = distribution_name(url) {
            self.requirements.push(name);
        }
        if !self.links.iter().any(|l| l == url) {
            self.links.push(url.to_string());
        }
    }
}

/// Parse one requirements file, following `-r` includes.
fn parse(path: &Path, visited: &mut BTreeSet<PathBuf>, out: &mut ParsedRequirements) -> Result<()> {
    if !visited.insert(path.to_path_buf()) {
        return Ok(());
    }
    let Some(content) = read_optional(path)? else {
        return Ok(());
    };
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(included) = option_value(line, "-r", "--requirement") {
            let base = path.parent().unwrap_or_else(|| Path::new("."));
            parse(&base.join(included), visited, out)?;
            continue;
        }
        if let Some(url) = option_value(line, "-e", "--editable") {
            out.add_link(url);
            continue;
        }
        if VCS_PREFIXES.iter().any(|p| line.starts_with(p)) {
            out.add_link(line);
            continue;
        }
        if line.starts_with('-') {
            // pip options like --index-url have no setup.py counterpart
            continue;
        }
        out.requirements.push(line.to_string());
    }
    Ok(())
}

/// Argument of `-x value`, `--long value` or `--long=value` forms
fn option_value<'a>(line: &'a str, short: &str, long: &str) -> Option<&'a str> {
    for flag in [long, short] {
        if let Some(rest) = line.strip_prefix(flag) {
            let rest = rest.strip_prefix('=').unwrap_or(rest).trim();
            if !rest.is_empty() {
                return Some(rest);
            }
        }
    }
    None
}

/// Best-effort distribution name for a VCS or editable url: the `#egg=`
/// fragment when present, otherwise the last path segment without its
/// `.git` suffix or revision pin.
fn distribution_name(url: &str) -> Option<String> {
    if let Some((_, fragment)) = url.split_once("#egg=") {
        let name = fragment.split('&').next().unwrap_or(fragment).trim();
        return (!name.is_empty()).then(|| name.to_string());
    }
    let segment = url.trim_end_matches('/').rsplit('/').next()?;
    let segment = segment.split('@').next().unwrap_or(segment);
    let name = segment.trim_end_matches(".git").trim();
    (!name.is_empty()).then(|| name.to_string())
}

/// Fill `install_requires`, `tests_require` and `dependency_links` from
/// checked-in requirements files.
pub fn scan_requirements(root: &Path, store: &mut SettingsStore) -> Result<()> {
    let mut links: Vec<String> = Vec::new();
    let mut links_label: Option<String> = None;

    for (names, field) in [
        (&INSTALL_CANDIDATES, "install_requires"),
        (&TEST_CANDIDATES, "tests_require"),
    ] {
        let Some((path, label)) = super::first_candidate(root, names) else {
            continue;
        };
        let mut parsed = ParsedRequirements::default();
        parse(&path, &mut BTreeSet::new(), &mut parsed)?;
        store.auto_fill(
            field,
            MetaValue::list(parsed.requirements),
            SourceRef::file(label.as_str(), None),
            false,
        );
        for link in parsed.links {
            if !links.contains(&link) {
                links.push(link);
            }
        }
        links_label.get_or_insert(label);
    }

    if let (false, Some(label)) = (links.is_empty(), links_label) {
        store.auto_fill(
            "dependency_links",
            MetaValue::list(links),
            SourceRef::file(label.as_str(), None),
            false,
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(content: &str) -> ParsedRequirements {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("requirements.txt");
        std::fs::write(&path, content).unwrap();
        let mut out = ParsedRequirements::default();
        parse(&path, &mut BTreeSet::new(), &mut out).unwrap();
        out
    }

    #[test]
    fn test_plain_lines_kept_verbatim() {
        let out = parsed("# pinned\nrequests>=2.0\n\nclick==8.1.7  \ntomli; python_version < \"3.11\"\n");
        assert_eq!(
            out.requirements,
            ["requests>=2.0", "click==8.1.7", "tomli; python_version < \"3.11\""]
        );
        assert!(out.links.is_empty());
    }

    #[test]
    fn test_editable_and_vcs_lines_become_links() {
        let out = parsed(
            "-e git+https://github.com/acme/widget.git#egg=widget&subdirectory=py\n\
             git+https://github.com/acme/gadget.git@v1.2\n",
        );
        assert_eq!(out.requirements, ["widget", "gadget"]);
        assert_eq!(
            out.links,
            [
                "git+https://github.com/acme/widget.git#egg=widget&subdirectory=py",
                "git+https://github.com/acme/gadget.git@v1.2"
            ]
        );
    }

    #[test]
    fn test_duplicate_links_collapse() {
        let out = parsed("-e git+https://x/y.git#egg=y\n--editable git+https://x/y.git#egg=y\n");
        assert_eq!(out.links.len(), 1);
    }

    #[test]
    fn test_other_options_skipped() {
        let out = parsed("--index-url https://pypi.org/simple\n-c constraints.txt\nrequests\n");
        assert_eq!(out.requirements, ["requests"]);
    }

    #[test]
    fn test_includes_followed_with_cycle_guard() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("requirements.txt"),
            "-r base.txt\nextra==1.0\n",
        )
        .unwrap();
        // base includes the top file right back
        std::fs::write(
            dir.path().join("base.txt"),
            "-r requirements.txt\ncore==2.0\n",
        )
        .unwrap();

        let mut out = ParsedRequirements::default();
        parse(
            &dir.path().join("requirements.txt"),
            &mut BTreeSet::new(),
            &mut out,
        )
        .unwrap();
        assert_eq!(out.requirements, ["core==2.0", "extra==1.0"]);
    }

    #[test]
    fn test_scan_fills_all_three_fields() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("requirements.txt"),
            "requests\ngit+https://x/tool.git#egg=tool\n",
        )
        .unwrap();
        std::fs::create_dir(dir.path().join("tests")).unwrap();
        std::fs::write(dir.path().join("tests/requirements.txt"), "pytest\n").unwrap();

        let mut store = SettingsStore::new();
        scan_requirements(dir.path(), &mut store).unwrap();

        assert_eq!(
            store.value("install_requires"),
            Some(&MetaValue::list(["requests", "tool"]))
        );
        assert_eq!(
            store.value("tests_require"),
            Some(&MetaValue::list(["pytest"]))
        );
        assert_eq!(
            store.value("dependency_links"),
            Some(&MetaValue::list(["git+https://x/tool.git#egg=tool"]))
        );
        let def = store.definition("install_requires").unwrap();
        assert_eq!(def.entries()[0].source.to_string(), "requirements.txt");
    }

    #[test]
    fn test_production_fallback() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("requirements")).unwrap();
        std::fs::write(dir.path().join("requirements/production.txt"), "uvicorn\n").unwrap();

        let mut store = SettingsStore::new();
        scan_requirements(dir.path(), &mut store).unwrap();
        assert_eq!(
            store.value("install_requires"),
            Some(&MetaValue::list(["uvicorn"]))
        );
    }

    #[test]
    fn test_missing_files_are_silent() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SettingsStore::new();
        scan_requirements(dir.path(), &mut store).unwrap();
        assert!(store.value("install_requires").is_none());
        assert!(store.value("dependency_links").is_none());
    }
}
