use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{PymetaError, Result};
use crate::store::{read_optional, MetaValue};
use crate::strategy::Strategy;

/// Project file consulted for explicit metadata
pub const PYPROJECT_FILE: &str = "pyproject.toml";

/// User-level defaults file, looked up in the platform config directory
const USER_DEFAULTS_FILE: &str = "pymeta.toml";

/// Raw attribute bag at the host boundary: string keys, arbitrary TOML
/// values. Recognized keys are the conventional packaging metadata fields
/// plus the engine's own `versioning`, `scm` and `repo`.
pub type RawAttrs = BTreeMap<String, toml::Value>;

/// Requested versioning scheme, as written by the user; parses into a
/// [Strategy] on demand. A bad format is not an error here: the strategy
/// carries it as a problem for the engine to surface.
#[derive(Debug, Clone, PartialEq)]
pub enum VersioningSpec {
    /// A format string or one of its short aliases, e.g. `"post"`
    Text(String),

    /// Independently given main/local formats and branch restriction
    Parts {
        main: Option<String>,
        local: Option<String>,
        branches: Option<Vec<String>>,
    },
}

impl VersioningSpec {
    pub fn to_strategy(&self) -> Strategy {
        match self {
            VersioningSpec::Text(text) => Strategy::from_text(text),
            VersioningSpec::Parts {
                main,
                local,
                branches,
            } => Strategy::from_parts(main.as_deref(), local.as_deref(), branches.as_deref()),
        }
    }
}

/// Explicit input after boundary validation.
///
/// The engine's own keys are pulled out and type-checked here, once, instead
/// of being re-interpreted wherever they are consumed. Conventional metadata
/// fields pass through as-is and seed the store as explicit definitions.
#[derive(Debug, Default)]
pub struct ExplicitAttrs {
    pub versioning: Option<VersioningSpec>,
    pub scm: Option<String>,
    pub repo: Option<PathBuf>,
    pub fields: BTreeMap<String, MetaValue>,
}

impl ExplicitAttrs {
    /// Validate a raw attribute bag.
    ///
    /// # Returns
    /// * `Ok(ExplicitAttrs)` - Typed engine keys plus pass-through fields
    /// * `Err` - An engine key carries the wrong shape (e.g. a numeric `scm`)
    pub fn from_raw(raw: RawAttrs) -> Result<Self> {
        let mut attrs = ExplicitAttrs::default();
        for (key, value) in raw {
            match key.as_str() {
                "versioning" => attrs.versioning = Some(versioning_spec(&value)?),
                "scm" => {
                    let name = value
                        .as_str()
                        .ok_or_else(|| PymetaError::config("scm must be a string"))?;
                    attrs.scm = Some(name.to_string());
                }
                "repo" => {
                    let path = value
                        .as_str()
                        .ok_or_else(|| PymetaError::config("repo must be a string path"))?;
                    attrs.repo = Some(PathBuf::from(path));
                }
                _ => match meta_value(&value) {
                    Some(converted) => {
                        attrs.fields.insert(key, converted);
                    }
                    None => tracing::debug!(key, "skipping non-scalar pyproject field"),
                },
            }
        }
        Ok(attrs)
    }

    pub fn name(&self) -> Option<&str> {
        self.fields.get("name").and_then(MetaValue::as_str)
    }
}

fn versioning_spec(value: &toml::Value) -> Result<VersioningSpec> {
    match value {
        toml::Value::String(text) => Ok(VersioningSpec::Text(text.clone())),
        toml::Value::Table(table) => {
            for key in table.keys() {
                if !matches!(key.as_str(), "main" | "local" | "branches") {
                    return Err(PymetaError::config(format!(
                        "unknown versioning key '{}', expected main, local or branches",
                        key
                    )));
                }
            }
            Ok(VersioningSpec::Parts {
                main: table_str(table, "main")?,
                local: table_str(table, "local")?,
                branches: table_branches(table)?,
            })
        }
        _ => Err(PymetaError::config("versioning must be a string or a table")),
    }
}

fn table_str(table: &toml::Table, key: &str) -> Result<Option<String>> {
    match table.get(key) {
        None => Ok(None),
        Some(toml::Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(PymetaError::config(format!(
            "versioning {} must be a string",
            key
        ))),
    }
}

/// Branch restriction accepts a comma-separated string or a string list
fn table_branches(table: &toml::Table) -> Result<Option<Vec<String>>> {
    match table.get("branches") {
        None => Ok(None),
        Some(toml::Value::String(s)) => Ok(Some(
            s.split(',')
                .map(str::trim)
                .filter(|b| !b.is_empty())
                .map(str::to_string)
                .collect(),
        )),
        Some(toml::Value::Array(items)) => items
            .iter()
            .map(|i| i.as_str().map(str::to_string))
            .collect::<Option<Vec<String>>>()
            .map(Some)
            .ok_or_else(|| PymetaError::config("versioning branches must be strings")),
        Some(_) => Err(PymetaError::config(
            "versioning branches must be a string or a list",
        )),
    }
}

/// Store-compatible conversion for one pyproject value. Structured tables
/// have no flat equivalent and are skipped.
fn meta_value(value: &toml::Value) -> Option<MetaValue> {
    match value {
        toml::Value::String(s) => Some(MetaValue::str(s)),
        toml::Value::Integer(n) => Some(MetaValue::str(n.to_string())),
        toml::Value::Float(n) => Some(MetaValue::str(n.to_string())),
        toml::Value::Boolean(b) => Some(MetaValue::str(b.to_string())),
        toml::Value::Datetime(d) => Some(MetaValue::str(d.to_string())),
        toml::Value::Array(items) => items
            .iter()
            .map(toml::Value::as_str)
            .collect::<Option<Vec<&str>>>()
            .map(MetaValue::list),
        toml::Value::Table(_) => None,
    }
}

#[derive(Debug, Default, Deserialize)]
struct PyProject {
    #[serde(default)]
    project: toml::Table,
    #[serde(default)]
    tool: ToolSection,
}

#[derive(Debug, Default, Deserialize)]
struct ToolSection {
    #[serde(default)]
    pymeta: toml::Table,
}

/// Assemble the raw attribute bag for a project tree.
///
/// `[project]` supplies the conventional metadata fields and `[tool.pymeta]`
/// the engine keys; on a key collision the `[tool.pymeta]` entry wins. A
/// missing pyproject.toml yields an empty bag.
pub fn raw_attrs(root: &Path) -> Result<RawAttrs> {
    let Some(content) = read_optional(&root.join(PYPROJECT_FILE))? else {
        return Ok(RawAttrs::new());
    };
    let parsed: PyProject = toml::from_str(&content)
        .map_err(|e| PymetaError::config(format!("invalid {}: {}", PYPROJECT_FILE, e)))?;
    let mut bag: RawAttrs = parsed.project.into_iter().collect();
    bag.extend(parsed.tool.pymeta);
    Ok(bag)
}

/// User-level defaults for engine keys the project leaves unset. Metadata
/// fields never come from here; they belong to the project.
#[derive(Debug, Default, Deserialize, PartialEq)]
pub struct UserDefaults {
    pub versioning: Option<String>,
    pub scm: Option<String>,
}

fn load_user_defaults() -> Result<UserDefaults> {
    match dirs::config_dir() {
        Some(dir) => user_defaults_from(&dir.join(USER_DEFAULTS_FILE)),
        None => Ok(UserDefaults::default()),
    }
}

fn user_defaults_from(path: &Path) -> Result<UserDefaults> {
    let Some(content) = read_optional(path)? else {
        return Ok(UserDefaults::default());
    };
    toml::from_str(&content)
        .map_err(|e| PymetaError::config(format!("invalid {}: {}", path.display(), e)))
}

fn apply_defaults(attrs: &mut ExplicitAttrs, defaults: UserDefaults) {
    if attrs.versioning.is_none() {
        attrs.versioning = defaults.versioning.map(VersioningSpec::Text);
    }
    if attrs.scm.is_none() {
        attrs.scm = defaults.scm;
    }
}

/// Everything one resolution pass needs to know about its surroundings,
/// threaded explicitly through the call chain.
#[derive(Debug)]
pub struct ProjectContext {
    root: PathBuf,
    attrs: ExplicitAttrs,
}

impl ProjectContext {
    /// Context for a host-supplied attribute bag
    pub fn new(root: impl Into<PathBuf>, raw: RawAttrs) -> Result<Self> {
        Ok(ProjectContext {
            root: root.into(),
            attrs: ExplicitAttrs::from_raw(raw)?,
        })
    }

    /// Load context for a project tree.
    ///
    /// Attempts to assemble explicit input in the following order:
    /// 1. `pyproject.toml` at the project root
    /// 2. `pymeta.toml` in the user config directory, for engine keys only
    /// 3. Empty explicit input if neither file exists
    pub fn load(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        // a relative root breaks upward discovery of the scm root
        let root = root.canonicalize().unwrap_or(root);
        let mut attrs = ExplicitAttrs::from_raw(raw_attrs(&root)?)?;
        apply_defaults(&mut attrs, load_user_defaults()?);
        Ok(ProjectContext { root, attrs })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn attrs(&self) -> &ExplicitAttrs {
        &self.attrs
    }

    /// Explicit source-control root, resolved against the project root
    pub fn repo_override(&self) -> Option<PathBuf> {
        self.attrs.repo.as_ref().map(|repo| {
            if repo.is_absolute() {
                repo.clone()
            } else {
                self.root.join(repo)
            }
        })
    }
}
