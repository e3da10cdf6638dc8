//! Project-tree scanners.
//!
//! Each scanner inspects one conventional artifact and feeds `(key, value)`
//! facts into the store with file (and line, when derivable) attribution.
//! A missing artifact is never an error; inference simply skips it.

pub mod licenses;
pub mod packages;
pub mod python;
pub mod requirements;

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::store::{read_optional, MetaValue, SettingsStore, SourceRef};

/// README candidates, most specific first. The `README*` glob catches
/// anything else carrying the conventional prefix.
const README_CANDIDATES: [&str; 5] = ["README.rst", "README.md", "README.txt", "README*", "README"];

/// First existing regular file for `name` under `root`; a trailing `*`
/// makes it a prefix glob, resolved in sorted order.
pub(crate) fn find_candidate(root: &Path, name: &str) -> Option<PathBuf> {
    if let Some(prefix) = name.strip_suffix('*') {
        let mut matches: Vec<PathBuf> = std::fs::read_dir(root)
            .ok()?
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with(prefix))
                    .unwrap_or(false)
            })
            .collect();
        matches.sort();
        return matches.into_iter().next();
    }
    let path = root.join(name);
    path.is_file().then_some(path)
}

/// First existing file among `names`, with its root-relative label
pub(crate) fn first_candidate(root: &Path, names: &[&str]) -> Option<(PathBuf, String)> {
    for name in names {
        if let Some(path) = find_candidate(root, name) {
            let label = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .display()
                .to_string();
            return Some((path, label));
        }
    }
    None
}

/// Fill `long_description` (and its content type) from the first README
/// found by the priority list.
pub fn scan_readme(root: &Path, store: &mut SettingsStore) -> Result<()> {
    let Some((path, label)) = first_candidate(root, &README_CANDIDATES) else {
        return Ok(());
    };
    let Some(content) = read_optional(&path)? else {
        return Ok(());
    };
    let content_type = match path.extension().and_then(|e| e.to_str()) {
        Some("md") => Some("text/markdown"),
        Some("rst") => Some("text/x-rst"),
        _ => None,
    };
    store.auto_fill(
        "long_description",
        MetaValue::str(content),
        SourceRef::file(label.as_str(), None),
        false,
    );
    if let Some(content_type) = content_type {
        store.auto_fill(
            "long_description_content_type",
            MetaValue::str(content_type),
            SourceRef::file(label.as_str(), None),
            false,
        );
    }
    Ok(())
}

/// Fill `classifiers` from a checked-in `classifiers.txt`, one per line,
/// `#` comments and blank lines ignored.
pub fn scan_classifiers(root: &Path, store: &mut SettingsStore) -> Result<()> {
    let Some(content) = read_optional(&root.join("classifiers.txt"))? else {
        return Ok(());
    };
    let items: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect();
    if items.is_empty() {
        return Ok(());
    }
    store.auto_fill(
        "classifiers",
        MetaValue::list(items),
        SourceRef::file("classifiers.txt", None),
        false,
    );
    Ok(())
}

/// Fill `entry_points` from a checked-in `entry_points.ini`, verbatim.
pub fn scan_entry_points(root: &Path, store: &mut SettingsStore) -> Result<()> {
    let Some(content) = read_optional(&root.join("entry_points.ini"))? else {
        return Ok(());
    };
    let content = content.trim_end();
    if content.is_empty() {
        return Ok(());
    }
    store.auto_fill(
        "entry_points",
        MetaValue::str(content),
        SourceRef::file("entry_points.ini", None),
        false,
    );
    Ok(())
}
