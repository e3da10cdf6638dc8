//! Version-format strategy: the compact template language that turns a
//! [Version] into a rendered version string.
//!
//! A format string like `{major}.{minor}.{patch}{post}+{dirty}` is parsed
//! into bits (literal text, version fields, `{$VAR:default}` environment
//! lookups). The part before the first `+` is the stable segment, the part
//! after it the local segment. A `branch(a,b):` prefix restricts which
//! branches may run version bumps.

use std::env;
use std::fmt;

use regex::Regex;

use crate::error::{PymetaError, Result};
use crate::version::{self, Version};

/// Components eligible for `bumped()`
pub const BUMPABLE: [&str; 3] = ["major", "minor", "patch"];

const DEFAULT_BRANCHES: &[&str] = &["master"];
const DEFAULT_MAIN: &str = "{major}.{minor}.{patch}{post}";
const DEFAULT_LOCAL: &str = "{devcommit}";

/// One parsed unit of a format string.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Bit {
    Literal(String),
    Field(String),
    EnvVar { name: String, default: String },
}

impl Bit {
    fn rendered(&self, version: &Version) -> String {
        match self {
            Bit::Literal(text) => text.clone(),
            Bit::Field(name) => version.field(name).unwrap_or_default(),
            Bit::EnvVar { name, default } => match env::var(name) {
                Ok(value) if !value.is_empty() => value,
                _ => default.clone(),
            },
        }
    }
}

impl fmt::Display for Bit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bit::Literal(text) => write!(f, "{}", text),
            Bit::Field(name) => write!(f, "{{{}}}", name),
            Bit::EnvVar { name, default } if default.is_empty() => write!(f, "{{${}}}", name),
            Bit::EnvVar { name, default } => write!(f, "{{${}:{}}}", name, default),
        }
    }
}

/// Parsed versioning strategy.
///
/// A parse failure does not raise: it is recorded in `problem` and the
/// strategy stays constructed but inert (`rendered()` yields nothing,
/// `bumped()` refuses).
#[derive(Debug, Clone)]
pub struct Strategy {
    pub branches: Vec<String>,
    main_bits: Vec<Bit>,
    local_bits: Vec<Bit>,
    pub problem: Option<String>,
}

impl Strategy {
    /// Parse the one-line form: `[branch(a,b):]FORMAT`, where FORMAT is a
    /// short alias or a literal `main[+local]` template.
    pub fn from_text(text: &str) -> Self {
        let text = text.trim();
        let (branches, format) = split_branches(text);
        let format = expand_alias(format);
        let (main, local) = match format.split_once('+') {
            Some((main, local)) => (main, Some(local)),
            None => (format.as_str(), None),
        };
        Strategy::assemble(main, local, branches)
    }

    /// Build from separately-given parts, as the table form of the
    /// `versioning` setting supplies them. An unspecified local segment
    /// defaults to a bare dev marker.
    pub fn from_parts(main: Option<&str>, local: Option<&str>, branches: Option<&[String]>) -> Self {
        let branches = branches
            .map(|b| b.iter().map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
            .filter(|b: &Vec<String>| !b.is_empty())
            .unwrap_or_else(default_branches);
        Strategy::assemble(
            main.unwrap_or(DEFAULT_MAIN),
            Some(local.unwrap_or(DEFAULT_LOCAL)),
            branches,
        )
    }

    fn assemble(main: &str, local: Option<&str>, branches: Vec<String>) -> Self {
        let (main_bits, mut problem) = parse_bits(main);
        let (local_bits, local_problem) = match local {
            Some(local) => parse_bits(local),
            None => (Vec::new(), None),
        };
        if problem.is_none() {
            problem = local_problem;
        }
        Strategy {
            branches,
            main_bits,
            local_bits,
            problem,
        }
    }

    /// Ordered field names of the stable segment
    pub fn main_components(&self) -> Vec<&str> {
        self.main_bits
            .iter()
            .filter_map(|b| match b {
                Bit::Field(name) => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Ordered field names of the local segment
    pub fn local_components(&self) -> Vec<&str> {
        self.local_bits
            .iter()
            .filter_map(|b| match b {
                Bit::Field(name) => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// True iff `branch` may run version bumps under this strategy
    pub fn branch_allowed(&self, branch: &str) -> bool {
        self.branches.iter().any(|b| b == branch)
    }

    /// Render `version` through the full template. `None` when the strategy
    /// is inert due to a parse problem.
    pub fn rendered(&self, version: &Version) -> Option<String> {
        if self.problem.is_some() {
            return None;
        }
        let mut out: String = self.main_bits.iter().map(|b| b.rendered(version)).collect();
        if !self.local_bits.is_empty() {
            out.push('+');
            for bit in &self.local_bits {
                out.push_str(&bit.rendered(version));
            }
        }
        Some(strip_trailing_separators(out))
    }

    /// Next version after bumping `what`: the requested component is
    /// incremented, every lower component zeroed, and only the stable
    /// segment rendered.
    pub fn bumped(&self, what: &str, current: &Version) -> Result<String> {
        if let Some(problem) = &self.problem {
            return Err(PymetaError::usage(format!("versioning is unusable: {}", problem)));
        }
        if !BUMPABLE.contains(&what) {
            return Err(PymetaError::usage(format!(
                "can't bump '{}', expecting one of: major, minor, patch",
                what
            )));
        }
        if !self.main_components().contains(&what) {
            return Err(PymetaError::usage(format!(
                "can't bump '{}', not in version format '{}'",
                what, self
            )));
        }
        let (major, minor, patch) = match what {
            "major" => (current.major + 1, 0, 0),
            "minor" => (current.major, current.minor + 1, 0),
            _ => (current.major, current.minor, current.patch + 1),
        };
        let triplet = format!("{}.{}.{}", major, minor, patch);
        let next = Version::new(Some(&triplet), 0, None, false);
        let out: String = self.main_bits.iter().map(|b| b.rendered(&next)).collect();
        Ok(strip_trailing_separators(out))
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "branch({}):", self.branches.join(","))?;
        for bit in &self.main_bits {
            write!(f, "{}", bit)?;
        }
        if !self.local_bits.is_empty() {
            write!(f, "+")?;
            for bit in &self.local_bits {
                write!(f, "{}", bit)?;
            }
        }
        Ok(())
    }
}

fn default_branches() -> Vec<String> {
    DEFAULT_BRANCHES.iter().map(|s| s.to_string()).collect()
}

/// Split off a leading `branch(a,b):` restriction; absent means master only
fn split_branches(text: &str) -> (Vec<String>, &str) {
    let captures = Regex::new(r"^branch\(([^)]*)\):(.*)$")
        .ok()
        .and_then(|re| re.captures(text));
    if let Some(captures) = captures {
        let branches: Vec<String> = captures
            .get(1)
            .map(|m| m.as_str())
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        let rest = captures.get(2).map(|m| m.as_str()).unwrap_or_default();
        if !branches.is_empty() {
            return (branches, rest);
        }
        return (default_branches(), rest);
    }
    (default_branches(), text)
}

/// Expand a whole-format alias to its canonical template. Unrecognized text
/// is taken as a literal format; empty text means the default strategy.
fn expand_alias(text: &str) -> String {
    match text.trim() {
        "" | "default" | "tag" | "post" => "{major}.{minor}.{patch}{post}+{dirty}".to_string(),
        "distance" | "changes" => "{major}.{minor}.{distance}+{dirty}".to_string(),
        "dev" | "devcommit" => "{major}.{minor}.{patch}{dev}+{devcommit}".to_string(),
        "build-id" => "{major}.{minor}.{distance}+h{$BUILD_ID:local}.{commitid}.{dirty}".to_string(),
        other => other.to_string(),
    }
}

/// Parse one sub-format into bits. The only legal characters immediately
/// after a closing `}` are `.`, `+` and end-of-string. A failure is returned
/// as a problem string, never raised.
fn parse_bits(format: &str) -> (Vec<Bit>, Option<String>) {
    let mut bits = Vec::new();
    let mut rest = format;
    while let Some(open) = rest.find('{') {
        if open > 0 {
            bits.push(Bit::Literal(rest[..open].to_string()));
        }
        rest = &rest[open + 1..];
        let Some(close) = rest.find('}') else {
            return (bits, Some(format!("unclosed '{{' in version format '{}'", format)));
        };
        let inside = &rest[..close];
        rest = &rest[close + 1..];
        if let Some(next) = rest.chars().next() {
            if next != '.' && next != '+' {
                return (
                    bits,
                    Some(format!("invalid separator '{}' after '{{{}}}'", next, inside)),
                );
            }
        }
        if let Some(env_ref) = inside.strip_prefix('$') {
            let (name, default) = env_ref.split_once(':').unwrap_or((env_ref, ""));
            bits.push(Bit::EnvVar {
                name: name.to_string(),
                default: default.to_string(),
            });
        } else if version::is_field(inside) {
            bits.push(Bit::Field(inside.to_string()));
        } else {
            return (bits, Some(format!("unknown field '{{{}}}'", inside)));
        }
    }
    if !rest.is_empty() {
        bits.push(Bit::Literal(rest.to_string()));
    }
    (bits, None)
}

fn strip_trailing_separators(mut text: String) -> String {
    while text.ends_with('.') || text.ends_with('+') {
        text.pop();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn version(main: &str, distance: u32, dirty: bool) -> Version {
        Version::new(Some(main), distance, Some("gabc1234"), dirty)
    }

    #[test]
    fn test_default_alias_on_clean_tag() {
        let strategy = Strategy::from_text("post");
        assert!(strategy.problem.is_none());
        assert_eq!(strategy.branches, ["master"]);
        assert_eq!(strategy.rendered(&version("1.2.3", 0, false)).unwrap(), "1.2.3");
    }

    #[test]
    fn test_default_alias_dirty_and_distance() {
        let strategy = Strategy::from_text("default");
        assert_eq!(
            strategy.rendered(&version("1.2.3", 0, true)).unwrap(),
            "1.2.3+dirty"
        );
        assert_eq!(
            strategy.rendered(&version("1.2.3", 2, false)).unwrap(),
            "1.2.3.post2"
        );
    }

    #[test]
    fn test_distance_alias() {
        let strategy = Strategy::from_text("distance");
        assert_eq!(strategy.rendered(&version("0.0.0", 0, false)).unwrap(), "0.0.0");
        assert_eq!(
            strategy.rendered(&version("0.0.0", 0, true)).unwrap(),
            "0.0.0+dirty"
        );
        assert_eq!(strategy.rendered(&version("0.0.0", 1, false)).unwrap(), "0.0.1");
    }

    #[test]
    fn test_dev_alias() {
        let strategy = Strategy::from_text("dev");
        assert_eq!(
            strategy.rendered(&version("1.2.3", 3, true)).unwrap(),
            "1.2.3.dev3+gabc1234.dirty"
        );
        assert_eq!(strategy.rendered(&version("1.2.3", 0, false)).unwrap(), "1.2.3");
    }

    #[test]
    fn test_bare_field_list_ignores_dirty() {
        let strategy = Strategy::from_text("{major}.{minor}.{patch}.{distance}");
        assert_eq!(
            strategy.rendered(&version("0.1.2", 5, true)).unwrap(),
            "0.1.2.5"
        );
        let strategy = Strategy::from_text("{major}.{minor}.{distance}");
        assert_eq!(strategy.rendered(&version("0.1.2", 5, true)).unwrap(), "0.1.5");
    }

    #[test]
    fn test_branch_restriction_prefix() {
        let strategy = Strategy::from_text("branch(main, develop):post");
        assert_eq!(strategy.branches, ["main", "develop"]);
        assert!(strategy.branch_allowed("develop"));
        assert!(!strategy.branch_allowed("master"));
        assert_eq!(strategy.rendered(&version("1.0.0", 0, false)).unwrap(), "1.0.0");
    }

    #[test]
    fn test_empty_branch_list_falls_back_to_master() {
        let strategy = Strategy::from_text("branch():tag");
        assert_eq!(strategy.branches, ["master"]);
    }

    #[test]
    fn test_unknown_field_is_problem_not_panic() {
        let strategy = Strategy::from_text("{major}.{oops}");
        assert_eq!(strategy.problem.as_deref(), Some("unknown field '{oops}'"));
        assert!(strategy.rendered(&version("1.0.0", 0, false)).is_none());
    }

    #[test]
    fn test_invalid_separator_is_problem() {
        let strategy = Strategy::from_text("{major}x{minor}");
        assert_eq!(
            strategy.problem.as_deref(),
            Some("invalid separator 'x' after '{major}'")
        );
    }

    #[test]
    fn test_unclosed_brace_is_problem() {
        let strategy = Strategy::from_text("{major}.{minor");
        assert!(strategy.problem.as_deref().unwrap().starts_with("unclosed '{'"));
    }

    #[test]
    fn test_bumped_zeroes_lower_components() {
        let strategy = Strategy::from_text("{major}.{minor}.{patch}");
        let current = version("1.2.3", 4, true);
        assert_eq!(strategy.bumped("major", &current).unwrap(), "2.0.0");
        assert_eq!(strategy.bumped("minor", &current).unwrap(), "1.3.0");
        assert_eq!(strategy.bumped("patch", &current).unwrap(), "1.2.4");
    }

    #[test]
    fn test_bumped_renders_main_segment_only() {
        let strategy = Strategy::from_text("post");
        assert_eq!(strategy.bumped("minor", &version("1.2.3", 7, true)).unwrap(), "1.3.0");
    }

    #[test]
    fn test_bumped_out_of_scope_component() {
        let strategy = Strategy::from_text("{major}.{minor}");
        let err = strategy.bumped("patch", &version("1.2.0", 0, false)).unwrap_err();
        assert!(err.to_string().contains("can't bump 'patch'"));
        let err = strategy.bumped("nano", &version("1.2.0", 0, false)).unwrap_err();
        assert!(err.to_string().contains("expecting one of"));
    }

    #[test]
    fn test_bumped_on_problem_strategy_fails() {
        let strategy = Strategy::from_text("{nope}");
        assert!(strategy.bumped("minor", &version("1.0.0", 0, false)).is_err());
    }

    #[test]
    fn test_main_and_local_components() {
        let strategy = Strategy::from_text("dev");
        assert_eq!(strategy.main_components(), ["major", "minor", "patch", "dev"]);
        assert_eq!(strategy.local_components(), ["devcommit"]);
    }

    #[test]
    fn test_from_parts_defaults() {
        let strategy = Strategy::from_parts(None, None, None);
        assert!(strategy.problem.is_none());
        assert_eq!(strategy.branches, ["master"]);
        // unspecified local segment defaults to the dev-commit marker
        assert_eq!(
            strategy.rendered(&version("1.2.3", 2, false)).unwrap(),
            "1.2.3.post2+gabc1234"
        );
        assert_eq!(strategy.rendered(&version("1.2.3", 0, false)).unwrap(), "1.2.3");
    }

    #[test]
    fn test_display_reconstructs_format() {
        let strategy = Strategy::from_text("branch(main):{major}.{minor}+{commitid}");
        assert_eq!(strategy.to_string(), "branch(main):{major}.{minor}+{commitid}");
        let strategy = Strategy::from_text("tag");
        assert_eq!(
            strategy.to_string(),
            "branch(master):{major}.{minor}.{patch}{post}+{dirty}"
        );
    }

    #[test]
    #[serial]
    fn test_env_bit_set_and_unset() {
        let strategy = Strategy::from_text("{major}.{minor}.{distance}+h{$TEST_PYMETA_BUILD:local}.{commitid}");
        let v = version("1.0.0", 2, false);

        std::env::remove_var("TEST_PYMETA_BUILD");
        assert_eq!(strategy.rendered(&v).unwrap(), "1.0.2+hlocal.gabc1234");

        std::env::set_var("TEST_PYMETA_BUILD", "b42");
        assert_eq!(strategy.rendered(&v).unwrap(), "1.0.2+hb42.gabc1234");
        std::env::remove_var("TEST_PYMETA_BUILD");
    }

    #[test]
    #[serial]
    fn test_env_bit_empty_value_uses_default() {
        let strategy = Strategy::from_text("{major}+{$TEST_PYMETA_EMPTY:fallback}");
        let v = version("1.0.0", 0, false);
        std::env::set_var("TEST_PYMETA_EMPTY", "");
        assert_eq!(strategy.rendered(&v).unwrap(), "1+fallback");
        std::env::remove_var("TEST_PYMETA_EMPTY");
    }

    #[test]
    #[serial]
    fn test_env_bit_without_default_renders_empty() {
        let strategy = Strategy::from_text("{major}+{$TEST_PYMETA_MISSING}");
        let v = version("2.0.0", 0, false);
        std::env::remove_var("TEST_PYMETA_MISSING");
        assert_eq!(strategy.rendered(&v).unwrap(), "2");
    }

    #[test]
    fn test_build_id_alias_shape() {
        let strategy = Strategy::from_text("build-id");
        assert_eq!(
            strategy.main_components(),
            ["major", "minor", "distance"]
        );
        assert_eq!(strategy.local_components(), ["commitid", "dirty"]);
    }
}
