//! Best-effort license classification.
//!
//! An ordered candidate table: the first candidate whose required fragments
//! all appear in the license text wins. Matching is case-insensitive and
//! considers only the first lines of the file. No match silently skips the
//! license auto-fill.

use std::path::Path;

use regex::Regex;

use crate::error::Result;
use crate::store::{read_optional, MetaValue, SettingsStore, SourceRef};

/// How many leading lines of the license file are considered
const SCANNED_LINES: usize = 20;

struct Candidate {
    /// Lowercase fragments that must all be present
    required: &'static [&'static str],
    resolve: fn(&str) -> (String, String),
}

/// Ordered candidates; first full match wins, not best match
const CANDIDATES: [Candidate; 4] = [
    Candidate {
        required: &["mit license"],
        resolve: resolve_mit,
    },
    Candidate {
        required: &["apache license"],
        resolve: resolve_apache,
    },
    Candidate {
        required: &["gnu"],
        resolve: resolve_gnu,
    },
    Candidate {
        // canonical BSD text never says "BSD", only its boilerplate does
        required: &["redistribution and use in source and binary forms"],
        resolve: resolve_bsd,
    },
];

/// Classify license text into `(short name, trove classifier)`.
pub fn classify(text: &str) -> Option<(String, String)> {
    let haystack = text.to_lowercase();
    CANDIDATES
        .iter()
        .find(|c| c.required.iter().all(|fragment| haystack.contains(fragment)))
        .map(|c| (c.resolve)(text))
}

fn resolve_mit(_text: &str) -> (String, String) {
    (
        "MIT".to_string(),
        "License :: OSI Approved :: MIT License".to_string(),
    )
}

fn resolve_apache(text: &str) -> (String, String) {
    let short = match version_number(text) {
        Some(version) => format!("Apache {}", version),
        None => "Apache".to_string(),
    };
    (
        short,
        "License :: OSI Approved :: Apache Software License".to_string(),
    )
}

/// The GNU family needs disambiguation: Lesser and Affero variants, plus a
/// trailing version digit feeding both the short code and the classifier.
fn resolve_gnu(text: &str) -> (String, String) {
    let haystack = text.to_lowercase();
    let (base, family) = if haystack.contains("lesser") {
        ("LGPL", "GNU Lesser General Public License")
    } else if haystack.contains("affero") {
        ("AGPL", "GNU Affero General Public License")
    } else {
        ("GPL", "GNU General Public License")
    };
    match version_digit(text) {
        Some(digit) => {
            let short = format!("{}v{}", base, digit);
            let classifier = format!("License :: OSI Approved :: {} v{} ({})", family, digit, short);
            (short, classifier)
        }
        None => (
            base.to_string(),
            format!("License :: OSI Approved :: {} ({})", family, base),
        ),
    }
}

fn resolve_bsd(_text: &str) -> (String, String) {
    (
        "BSD".to_string(),
        "License :: OSI Approved :: BSD License".to_string(),
    )
}

/// Version digit, e.g. "Version 3, 29 June 2007" yields '3'
fn version_digit(text: &str) -> Option<char> {
    Regex::new(r"(?i)version\s+(\d)")
        .ok()
        .and_then(|re| re.captures(text))
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().chars().next())
}

/// Dotted version number, e.g. "Version 2.0, January 2004" yields "2.0"
fn version_number(text: &str) -> Option<String> {
    Regex::new(r"(?i)version\s+(\d+(?:\.\d+)?)")
        .ok()
        .and_then(|re| re.captures(text))
        .map(|c| c[1].to_string())
}

/// Auto-fill `license` from the first `LICENSE*` file found, merging the
/// matching trove classifier into `classifiers`.
pub fn scan_license(root: &Path, store: &mut SettingsStore) -> Result<()> {
    let Some((path, label)) = super::first_candidate(root, &["LICENSE*"]) else {
        return Ok(());
    };
    let Some(content) = read_optional(&path)? else {
        return Ok(());
    };
    let head: Vec<&str> = content.lines().take(SCANNED_LINES).collect();
    let Some((short, classifier)) = classify(&head.join("\n")) else {
        return Ok(());
    };
    store.auto_fill(
        "license",
        MetaValue::str(short),
        SourceRef::file(label.as_str(), None),
        false,
    );
    let mut merged: Vec<String> = store
        .value("classifiers")
        .and_then(|v| v.as_list())
        .map(|items| items.to_vec())
        .unwrap_or_default();
    if !merged.contains(&classifier) {
        merged.push(classifier);
        store.auto_fill(
            "classifiers",
            MetaValue::list(merged),
            SourceRef::file(label.as_str(), None),
            false,
        );
    }
    Ok(())
}
