//! Top-level resolution pass.
//!
//! One [Resolution] per invocation: seed the store with explicit input, run
//! the scanners in their fixed precedence order, derive the version, then
//! apply the finalization fixups. The resolved mapping goes back to the host
//! through [Resolution::to_dict].

use std::collections::BTreeMap;

use crate::config::ProjectContext;
use crate::error::Result;
use crate::scan;
use crate::scm;
use crate::store::{MetaValue, SettingsStore, SourceRef, DOCSTRING_LEAD};
use crate::versioning::Versioning;

pub struct Resolution {
    context: ProjectContext,
    store: SettingsStore,
    versioning: Versioning,
}

impl Resolution {
    /// Run the full pass for `context`.
    ///
    /// Scanner order fixes cross-source precedence: explicit input first,
    /// python literals, package discovery, version derivation, then the
    /// best-effort file scanners. First-write-wins in the store turns that
    /// order into priority.
    pub fn resolve(context: ProjectContext) -> Result<Self> {
        let root = context.root().to_path_buf();
        tracing::debug!(root = %root.display(), "resolving metadata");
        let mut store = SettingsStore::new();

        for (key, value) in &context.attrs().fields {
            store.note_explicit_key(key.as_str());
            store.add_definition(key, value.clone(), SourceRef::explicit(), false);
        }

        // the explicit name steers the python candidate list; a discovered
        // package stands in when there is none
        let discovered = scan::packages::discover(&root);
        let name = store
            .value_str("name")
            .map(str::to_string)
            .or_else(|| discovered.name_hint().map(str::to_string));
        scan::python::scan_python_sources(&root, name.as_deref(), &mut store)?;
        scan::packages::scan_packages(&root, &mut store)?;

        let strategy = context.attrs().versioning.as_ref().map(|v| v.to_strategy());
        let backend = scm::detect(
            &root,
            context.attrs().scm.as_deref(),
            context.repo_override().as_deref(),
        );
        let versioning = Versioning::new(&root, strategy, backend);
        versioning.auto_fill_version(&mut store)?;

        scan::scan_readme(&root, &mut store)?;
        scan::licenses::scan_license(&root, &mut store)?;
        scan::requirements::scan_requirements(&root, &mut store)?;
        scan::scan_classifiers(&root, &mut store)?;
        scan::scan_entry_points(&root, &mut store)?;

        finalize(&mut store);

        Ok(Resolution {
            context,
            store,
            versioning,
        })
    }

    pub fn context(&self) -> &ProjectContext {
        &self.context
    }

    pub fn store(&self) -> &SettingsStore {
        &self.store
    }

    pub fn versioning(&self) -> &Versioning {
        &self.versioning
    }

    /// Resolved version text, when one was determined
    pub fn version(&self) -> Option<&str> {
        self.store.value_str("version")
    }

    /// Final resolved mapping handed back to the host tool
    pub fn to_dict(&self) -> BTreeMap<String, MetaValue> {
        self.store.to_dict()
    }

    /// Next version for `what` without touching anything
    pub fn get_bump(&self, what: &str) -> Result<String> {
        self.versioning.get_bump(what)
    }

    /// The bump workflow against this resolution's recorded sources
    pub fn bump(&self, what: &str, commit: bool, push: bool, commit_all: bool) -> Result<String> {
        self.versioning.bump(&self.store, what, commit, push, commit_all)
    }
}

/// Post-scan fixups that need every scanner's contribution in place.
fn finalize(store: &mut SettingsStore) {
    let lead = store.take_transient(DOCSTRING_LEAD);
    if store.value_str("description").map_or(true, str::is_empty) {
        if let Some(entry) = lead.as_ref().and_then(|d| d.entries().first()) {
            store.auto_fill("description", entry.value.clone(), entry.source.clone(), false);
        }
    }
    split_contact(store, "author", "author_email");
    split_contact(store, "maintainer", "maintainer_email");
}

/// Normalize a combined `Name <email>` contact into its two fields.
fn split_contact(store: &mut SettingsStore, field: &str, email_field: &str) {
    let parsed = store
        .definition(field)
        .and_then(|d| d.entries().first())
        .and_then(|entry| {
            let (name, email) = split_email(entry.value.as_str()?.trim())?;
            Some((name.to_string(), email.to_string(), entry.source.clone()))
        });
    let Some((name, email, source)) = parsed else {
        return;
    };
    store.auto_fill(field, MetaValue::str(name), source.clone(), true);
    store.auto_fill(email_field, MetaValue::str(email), source, false);
}

fn split_email(text: &str) -> Option<(&str, &str)> {
    let (name, rest) = text.split_once('<')?;
    let email = rest.strip_suffix('>')?.trim();
    let name = name.trim();
    (!name.is_empty() && !email.is_empty()).then_some((name, email))
}
