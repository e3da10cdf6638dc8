//! Python source scanner: module docstrings and dunder assignments.
//!
//! A module docstring contributes `key: value` lines for recognized keys
//! plus its lead line (recorded under the transient docstring pseudo-field);
//! top-level `__key__ = "value"` assignments contribute directly. Every fact
//! carries its file and 1-based line number.

use std::path::Path;

use regex::Regex;

use crate::error::Result;
use crate::store::{read_optional, MetaValue, SettingsStore, SourceRef, DOCSTRING_LEAD};

/// Metadata keys recognized in docstring lines and dunder assignments
const SCANNED_KEYS: [&str; 10] = [
    "author",
    "author_email",
    "description",
    "download_url",
    "keywords",
    "license",
    "maintainer",
    "maintainer_email",
    "url",
    "version",
];

/// Candidate files for the literal scan, in priority order. `name` is the
/// project or package name when one is already known.
pub fn candidate_files(name: Option<&str>) -> Vec<String> {
    let mut candidates = vec!["setup.py".to_string()];
    if let Some(name) = name {
        candidates.push(format!("{}.py", name));
        candidates.push(format!("{}/__init__.py", name));
        candidates.push(format!("src/{}/__init__.py", name));
        candidates.push(format!("{}/__about__.py", name));
        candidates.push(format!("{}/__version__.py", name));
    }
    candidates
}

/// Scan every present candidate file. First-write-wins in the store keeps
/// the priority of earlier files; later files show up as alternates.
pub fn scan_python_sources(
    root: &Path,
    name: Option<&str>,
    store: &mut SettingsStore,
) -> Result<()> {
    for candidate in candidate_files(name) {
        let path = root.join(&candidate);
        if let Some(content) = read_optional(&path)? {
            scan_content(&candidate, &content, store);
        }
    }
    Ok(())
}

/// Extract facts from one Python source text. `label` is the root-relative
/// path used in source attributions.
pub fn scan_content(label: &str, content: &str, store: &mut SettingsStore) {
    scan_docstring(label, content, store);
    scan_dunders(label, content, store);
}

fn scan_docstring(label: &str, content: &str, store: &mut SettingsStore) {
    let mut lines = content.lines().enumerate();
    // first statement line, skipping the shebang and comments
    let (start_index, first) = loop {
        let Some((index, line)) = lines.next() else {
            return;
        };
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        break (index, trimmed);
    };
    let Some(delimiter) = ["\"\"\"", "'''"].into_iter().find(|d| first.starts_with(d)) else {
        return;
    };
    // inner docstring lines with their 1-based line numbers
    let mut inner: Vec<(usize, String)> = Vec::new();
    let after = &first[delimiter.len()..];
    if let Some(end) = after.find(delimiter) {
        inner.push((start_index + 1, after[..end].to_string()));
    } else {
        if !after.trim().is_empty() {
            inner.push((start_index + 1, after.to_string()));
        }
        for (index, line) in lines {
            if let Some(end) = line.find(delimiter) {
                let head = &line[..end];
                if !head.trim().is_empty() {
                    inner.push((index + 1, head.to_string()));
                }
                break;
            }
            inner.push((index + 1, line.to_string()));
        }
    }
    let mut lead_taken = false;
    for (line_number, text) in inner {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some((key, value)) = docstring_entry(trimmed) {
            store.add_definition(
                key,
                MetaValue::str(value),
                SourceRef::file(label, Some(line_number)),
                false,
            );
            continue;
        }
        if !lead_taken {
            store.add_definition(
                DOCSTRING_LEAD,
                MetaValue::str(trimmed),
                SourceRef::file(label, Some(line_number)),
                false,
            );
            lead_taken = true;
        }
    }
}

/// `key: value` when `key` is a recognized metadata key
fn docstring_entry(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once(':')?;
    let key = key.trim();
    let value = value.trim();
    if value.is_empty() || !SCANNED_KEYS.contains(&key) {
        return None;
    }
    Some((key, value))
}

fn scan_dunders(label: &str, content: &str, store: &mut SettingsStore) {
    // top-level assignments only, anything after the closing quote ignored
    let Some(re) = Regex::new(r#"^__(\w+)__\s*=\s*['"](.*?)['"]"#).ok() else {
        return;
    };
    for (index, line) in content.lines().enumerate() {
        let Some(captures) = re.captures(line) else {
            continue;
        };
        let key = &captures[1];
        if !SCANNED_KEYS.contains(&key) {
            continue;
        }
        store.add_definition(
            key,
            MetaValue::str(&captures[2]),
            SourceRef::file(label, Some(index + 1)),
            false,
        );
    }
}
