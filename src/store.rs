//! Keyed, source-attributed value store with override semantics.
//!
//! Every fact discovered about the project ("version is 1.2.3, found on line
//! 4 of `foo/__init__.py`") is recorded as a [DefinitionEntry]. Entries for
//! the same field accumulate in a [Definition]; the first write wins unless a
//! later write explicitly overrides. [SettingsStore] owns one definition per
//! field and produces the final resolved mapping.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

use serde::Serialize;

use crate::error::Result;

/// Field name of the transient docstring lead line, consumed during
/// finalization and removed from the store afterwards.
pub const DOCSTRING_LEAD: &str = "docstring.lead";

/// What kind of place a value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Supplied by the user in the original attribute bag
    Explicit,
    /// Contributed by inference with no better locator
    AutoFill,
    /// Contributed by a named subsystem (an SCM backend, an env variable)
    Named,
    /// Found in a project file, optionally at a specific line
    File,
}

/// Locator for one recorded value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRef {
    kind: SourceKind,
    label: String,
    line: Option<usize>,
}

impl SourceRef {
    /// The explicit-input marker: user-supplied attributes
    pub fn explicit() -> Self {
        SourceRef {
            kind: SourceKind::Explicit,
            label: "explicit".to_string(),
            line: None,
        }
    }

    /// A generic auto-fill marker
    pub fn auto_fill() -> Self {
        SourceRef {
            kind: SourceKind::AutoFill,
            label: "auto-fill".to_string(),
            line: None,
        }
    }

    /// A named subsystem, e.g. "git" or "$PYMETA_VERSION"
    pub fn named(label: impl Into<String>) -> Self {
        SourceRef {
            kind: SourceKind::Named,
            label: label.into(),
            line: None,
        }
    }

    /// A project file, path relative to the project root
    pub fn file(path: impl Into<String>, line: Option<usize>) -> Self {
        SourceRef {
            kind: SourceKind::File,
            label: path.into(),
            line,
        }
    }

    pub fn is_explicit(&self) -> bool {
        self.kind == SourceKind::Explicit
    }

    /// Relative file path when this locator points into a project file
    pub fn file_path(&self) -> Option<&Path> {
        match self.kind {
            SourceKind::File => Some(Path::new(&self.label)),
            _ => None,
        }
    }

    pub fn line(&self) -> Option<usize> {
        self.line
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(n) => write!(f, "{}:{}", self.label, n),
            None => write!(f, "{}", self.label),
        }
    }
}

/// A metadata value: either plain text or a list of strings.
///
/// Lists cover `keywords`, `classifiers`, `install_requires` and friends;
/// everything else is text. Serializes as the bare string or array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum MetaValue {
    Str(String),
    List(Vec<String>),
}

impl MetaValue {
    pub fn str(s: impl Into<String>) -> Self {
        MetaValue::Str(s.into())
    }

    pub fn list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        MetaValue::List(items.into_iter().map(Into::into).collect())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            MetaValue::Str(s) => s.is_empty(),
            MetaValue::List(items) => items.is_empty(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetaValue::Str(s) => Some(s.as_str()),
            MetaValue::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            MetaValue::Str(_) => None,
            MetaValue::List(items) => Some(items),
        }
    }
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaValue::Str(s) => write!(f, "{}", s),
            MetaValue::List(items) => write!(f, "{}", items.join(", ")),
        }
    }
}

impl From<&str> for MetaValue {
    fn from(s: &str) -> Self {
        MetaValue::Str(s.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(s: String) -> Self {
        MetaValue::Str(s)
    }
}

/// One immutable fact about a field: value plus where it was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionEntry {
    pub key: String,
    pub value: MetaValue,
    pub source: SourceRef,
}

/// All recorded facts for one field.
///
/// `entries[0]` is always the winning entry: the first write wins, and an
/// override write is inserted at the head. Later non-override writes are
/// appended as lower-priority alternates, kept for diagnostics.
#[derive(Debug, Clone)]
pub struct Definition {
    pub key: String,
    entries: Vec<DefinitionEntry>,
}

impl Definition {
    fn new(key: impl Into<String>) -> Self {
        Definition {
            key: key.into(),
            entries: Vec::new(),
        }
    }

    fn add(&mut self, value: MetaValue, source: SourceRef, override_current: bool) {
        let entry = DefinitionEntry {
            key: self.key.clone(),
            value,
            source,
        };
        if override_current {
            self.entries.insert(0, entry);
        } else {
            self.entries.push(entry);
        }
    }

    /// The currently winning value
    pub fn value(&self) -> Option<&MetaValue> {
        self.entries.first().map(|e| &e.value)
    }

    /// All recorded entries, winning entry first
    pub fn entries(&self) -> &[DefinitionEntry] {
        &self.entries
    }

    /// True iff any entry came from the explicit-input marker
    pub fn is_explicit(&self) -> bool {
        self.entries.iter().any(|e| e.source.is_explicit())
    }

    /// Eligible for the final resolved mapping: non-empty, or explicitly set
    pub fn is_meaningful(&self) -> bool {
        self.value().map(|v| !v.is_empty()).unwrap_or(false) || self.is_explicit()
    }
}

/// Field-name → [Definition] mapping for one resolution pass.
///
/// Also accumulates the non-fatal warnings raised along the way; the caller
/// decides when and how to show them.
#[derive(Debug, Default)]
pub struct SettingsStore {
    definitions: BTreeMap<String, Definition>,
    order: Vec<String>,
    explicit_keys: BTreeSet<String>,
    warnings: Vec<String>,
}

impl SettingsStore {
    pub fn new() -> Self {
        SettingsStore::default()
    }

    /// Record that `key` was present in the originally user-supplied set,
    /// whether or not it carried a value. Auto-fill treats absence from this
    /// set as permission to override.
    pub fn note_explicit_key(&mut self, key: impl Into<String>) {
        self.explicit_keys.insert(key.into());
    }

    pub fn has_explicit_key(&self, key: &str) -> bool {
        self.explicit_keys.contains(key)
    }

    /// Record one fact about `key`. First write wins; `override_current`
    /// forces the new value to the head of the list. A `None` value is a
    /// no-op.
    pub fn add_definition(
        &mut self,
        key: &str,
        value: impl Into<Option<MetaValue>>,
        source: SourceRef,
        override_current: bool,
    ) {
        let Some(value) = value.into() else { return };
        let value = normalize(key, value);
        tracing::debug!(key, source = %source, override_current, "definition");
        if !self.definitions.contains_key(key) {
            self.order.push(key.to_string());
        }
        let def = self
            .definitions
            .entry(key.to_string())
            .or_insert_with(|| Definition::new(key));
        def.add(value, source, override_current);
    }

    /// Contribute an inferred value for `field`.
    ///
    /// Writes are suppressed when the value is empty or identical to the
    /// current one. A field absent from the originally user-supplied set is
    /// implicitly overridable: inference then replaces whatever earlier
    /// inference recorded, while explicit input keeps outranking it.
    pub fn auto_fill(
        &mut self,
        field: &str,
        value: impl Into<Option<MetaValue>>,
        source: SourceRef,
        override_current: bool,
    ) {
        let Some(value) = value.into() else { return };
        if value.is_empty() {
            return;
        }
        if self.value(field) == Some(&normalize(field, value.clone())) {
            return;
        }
        let override_current = override_current || !self.explicit_keys.contains(field);
        self.add_definition(field, value, source, override_current);
    }

    pub fn definition(&self, key: &str) -> Option<&Definition> {
        self.definitions.get(key)
    }

    /// Currently winning value for `key`
    pub fn value(&self, key: &str) -> Option<&MetaValue> {
        self.definitions.get(key).and_then(|d| d.value())
    }

    /// Winning value as text, when it is text
    pub fn value_str(&self, key: &str) -> Option<&str> {
        self.value(key).and_then(|v| v.as_str())
    }

    /// Remove an internal pseudo-field once it has been consumed. Regular
    /// fields are never removed.
    pub fn take_transient(&mut self, key: &str) -> Option<Definition> {
        debug_assert!(key.starts_with("docstring."));
        let def = self.definitions.remove(key)?;
        self.order.retain(|k| k != key);
        Some(def)
    }

    /// Definitions in insertion order, for display
    pub fn iter_ordered(&self) -> impl Iterator<Item = &Definition> {
        self.order.iter().filter_map(|k| self.definitions.get(k))
    }

    /// Flattened `key -> value` mapping of every meaningful definition.
    /// Empty auto-fill attempts never leak placeholder values into this.
    pub fn to_dict(&self) -> BTreeMap<String, MetaValue> {
        self.definitions
            .iter()
            .filter(|(_, d)| d.is_meaningful())
            .filter_map(|(k, d)| d.value().map(|v| (k.clone(), v.clone())))
            .collect()
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{}", message);
        self.warnings.push(message);
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }
}

/// Field-specific value normalization. `keywords` always becomes a list:
/// comma-split, trimmed, empty segments discarded, whatever shape the source
/// supplied.
fn normalize(key: &str, value: MetaValue) -> MetaValue {
    if key != "keywords" {
        return value;
    }
    let items: Vec<String> = match value {
        MetaValue::Str(s) => split_keywords(&s),
        MetaValue::List(items) => items.iter().flat_map(|s| split_keywords(s)).collect(),
    };
    MetaValue::List(items)
}

fn split_keywords(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Read a whole file if it exists; `Ok(None)` when it does not.
pub fn read_optional(path: &Path) -> Result<Option<String>> {
    if !path.is_file() {
        return Ok(None);
    }
    Ok(Some(std::fs::read_to_string(path)?))
}
