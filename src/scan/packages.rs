//! Package and module discovery.

use std::path::Path;

use crate::error::Result;
use crate::store::{MetaValue, SettingsStore, SourceRef};

/// What the project tree offers for the `packages` / `py_modules` fields.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Discovered {
    pub packages: Vec<String>,
    pub py_modules: Vec<String>,
}

impl Discovered {
    /// Best name hint for the project: the first package, else the first
    /// single-file module.
    pub fn name_hint(&self) -> Option<&str> {
        self.packages
            .first()
            .or_else(|| self.py_modules.first())
            .map(String::as_str)
    }
}

/// Find top-level packages: directories holding an `__init__.py`, directly
/// under the root or under `src/`. Single-file modules are only considered
/// when no package exists; a project is one or the other.
pub fn discover(root: &Path) -> Discovered {
    let mut packages = packages_in(root);
    packages.extend(packages_in(&root.join("src")));
    packages.sort();
    packages.dedup();

    let mut py_modules = Vec::new();
    if packages.is_empty() {
        py_modules = modules_in(root);
        py_modules.sort();
    }
    Discovered {
        packages,
        py_modules,
    }
}

fn packages_in(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_dir() && p.join("__init__.py").is_file())
        .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_string))
        .filter(|name| !name.starts_with('.'))
        .collect()
}

fn modules_in(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter_map(|p| {
            let name = p.file_name()?.to_str()?;
            let stem = name.strip_suffix(".py")?;
            if stem == "setup" || stem == "conftest" {
                return None;
            }
            Some(stem.to_string())
        })
        .collect()
}

/// Contribute `packages`, `py_modules` and an inferred `name`; the project
/// directory's own name is the name of last resort.
pub fn scan_packages(root: &Path, store: &mut SettingsStore) -> Result<()> {
    let discovered = discover(root);
    if !discovered.packages.is_empty() {
        store.auto_fill(
            "packages",
            MetaValue::list(discovered.packages.clone()),
            SourceRef::auto_fill(),
            false,
        );
    }
    if !discovered.py_modules.is_empty() {
        store.auto_fill(
            "py_modules",
            MetaValue::list(discovered.py_modules.clone()),
            SourceRef::auto_fill(),
            false,
        );
    }
    let name = discovered
        .name_hint()
        .map(str::to_string)
        .or_else(|| project_dir_name(root));
    if let Some(name) = name {
        store.auto_fill("name", MetaValue::str(name), SourceRef::auto_fill(), false);
    }
    Ok(())
}

fn project_dir_name(root: &Path) -> Option<String> {
    // canonicalize so "." still yields the actual directory name
    let canonical = root.canonicalize().ok()?;
    canonical
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_package_discovery() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("demo")).unwrap();
        std::fs::write(dir.path().join("demo/__init__.py"), "").unwrap();
        std::fs::create_dir(dir.path().join("docs")).unwrap();
        std::fs::write(dir.path().join("util.py"), "").unwrap();

        let discovered = discover(dir.path());
        assert_eq!(discovered.packages, ["demo"]);
        // packages exist, so loose modules are not considered
        assert!(discovered.py_modules.is_empty());
        assert_eq!(discovered.name_hint(), Some("demo"));
    }

    #[test]
    fn test_src_layout_discovery() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src/demo")).unwrap();
        std::fs::write(dir.path().join("src/demo/__init__.py"), "").unwrap();

        let discovered = discover(dir.path());
        assert_eq!(discovered.packages, ["demo"]);
    }

    #[test]
    fn test_module_only_project() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tool.py"), "").unwrap();
        std::fs::write(dir.path().join("setup.py"), "").unwrap();
        std::fs::write(dir.path().join("conftest.py"), "").unwrap();

        let discovered = discover(dir.path());
        assert!(discovered.packages.is_empty());
        assert_eq!(discovered.py_modules, ["tool"]);
        assert_eq!(discovered.name_hint(), Some("tool"));
    }

    #[test]
    fn test_scan_fills_packages_and_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("demo")).unwrap();
        std::fs::write(dir.path().join("demo/__init__.py"), "").unwrap();

        let mut store = SettingsStore::new();
        scan_packages(dir.path(), &mut store).unwrap();
        assert_eq!(store.value("packages"), Some(&MetaValue::list(["demo"])));
        assert_eq!(store.value_str("name"), Some("demo"));
    }

    #[test]
    fn test_explicit_name_outranks_discovery() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("demo")).unwrap();
        std::fs::write(dir.path().join("demo/__init__.py"), "").unwrap();

        let mut store = SettingsStore::new();
        store.note_explicit_key("name");
        store.add_definition(
            "name",
            MetaValue::str("fancy-demo"),
            SourceRef::explicit(),
            false,
        );
        scan_packages(dir.path(), &mut store).unwrap();
        assert_eq!(store.value_str("name"), Some("fancy-demo"));
    }

    #[test]
    fn test_directory_name_is_last_resort() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SettingsStore::new();
        scan_packages(dir.path(), &mut store).unwrap();

        let expected = dir
            .path()
            .canonicalize()
            .unwrap()
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert_eq!(store.value_str("name"), Some(expected.as_str()));
    }
}
