//! Parsed version value, as produced by a source-control describe operation.

use std::fmt;

use regex::Regex;

/// Field names a format placeholder may reference, sorted.
pub const FIELDS: [&str; 10] = [
    "additional",
    "commitid",
    "dev",
    "devcommit",
    "dirty",
    "distance",
    "major",
    "minor",
    "patch",
    "post",
];

/// True iff `name` is a renderable field of [Version]
pub fn is_field(name: &str) -> bool {
    FIELDS.contains(&name)
}

/// Immutable snapshot of the checkout's version state.
///
/// `major.minor.patch` come from the most recent version tag, `additional`
/// carries any pre-release tail the tag had ("rc.1" and friends), `distance`
/// counts commits since that tag, `commitid` is the abbreviated head commit,
/// and `dirty` says whether uncommitted changes are present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub additional: String,
    pub distance: u32,
    pub commitid: String,
    pub dirty: bool,
    /// Original descriptor text this was parsed from
    pub text: String,
}

impl Version {
    /// Build a version from its parts. `main` is the dotted stable segment
    /// ("1.2.3", possibly with a pre-release tail); absent parts default to
    /// "0.0.0" and the placeholder commit id.
    pub fn new(main: Option<&str>, distance: u32, commitid: Option<&str>, dirty: bool) -> Self {
        let main = main.map(str::trim).filter(|s| !s.is_empty()).unwrap_or("0.0.0");
        let commitid = commitid
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("g0000000");
        let (major, minor, patch, additional) = split_main(main).unwrap_or((0, 0, 0, String::new()));
        Version {
            major,
            minor,
            patch,
            additional,
            distance,
            commitid: commitid.to_string(),
            dirty,
            text: main.to_string(),
        }
    }

    /// Parse descriptor text of the shape
    /// `vMAJOR.MINOR.PATCH[-PRERELEASE][-DISTANCE][-gCOMMITID][-dirty]`
    /// (leading `v` optional, case-insensitive).
    ///
    /// Malformed text (no leading digits) falls back to "0.0.0" with the
    /// dirty flag set, so resolution can continue; the oddity is logged,
    /// never raised.
    pub fn from_descriptor(text: &str) -> Self {
        let trimmed = text.trim();
        let captures = Regex::new(r"(?i)^v?(.+?)(-\d+)?(-g[0-9a-f]+)?(-dirty)?$")
            .ok()
            .and_then(|re| re.captures(trimmed));
        if let Some(captures) = captures {
            let main = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
            if split_main(main).is_some() {
                let distance = captures
                    .get(2)
                    .and_then(|m| m.as_str().trim_start_matches('-').parse().ok())
                    .unwrap_or(0);
                let commitid = captures.get(3).map(|m| m.as_str().trim_start_matches('-'));
                let dirty = captures.get(4).is_some();
                let mut version = Version::new(Some(main), distance, commitid, dirty);
                version.text = trimmed.to_string();
                return version;
            }
        }
        tracing::warn!("unparseable version descriptor '{}', falling back to 0.0.0", trimmed);
        let mut version = Version::new(None, 0, None, true);
        version.text = trimmed.to_string();
        version
    }

    /// The stable triplet, e.g. "1.2.3"
    pub fn main_text(&self) -> String {
        format!("{}.{}.{}", self.major, self.minor, self.patch)
    }

    /// ".postN" when N commits past the tag, empty when exactly on it
    pub fn post(&self) -> String {
        if self.distance > 0 {
            format!(".post{}", self.distance)
        } else {
            String::new()
        }
    }

    /// ".devN" when past the tag or dirty, empty on a clean tagged checkout
    pub fn dev(&self) -> String {
        if self.distance > 0 || self.dirty {
            format!(".dev{}", self.distance)
        } else {
            String::new()
        }
    }

    /// Commit id, with a ".dirty" suffix when applicable; empty on a clean
    /// tagged checkout
    pub fn devcommit(&self) -> String {
        if self.distance > 0 || self.dirty {
            let suffix = if self.dirty { ".dirty" } else { "" };
            format!("{}{}", self.commitid, suffix)
        } else {
            String::new()
        }
    }

    /// Render one field by name, as used by format placeholders.
    /// `None` for an unknown field name.
    pub fn field(&self, name: &str) -> Option<String> {
        match name {
            "major" => Some(self.major.to_string()),
            "minor" => Some(self.minor.to_string()),
            "patch" => Some(self.patch.to_string()),
            "distance" => Some(self.distance.to_string()),
            "commitid" => Some(self.commitid.clone()),
            "additional" => Some(self.additional.clone()),
            "dirty" => Some(if self.dirty { "dirty".to_string() } else { String::new() }),
            "post" => Some(self.post()),
            "dev" => Some(self.dev()),
            "devcommit" => Some(self.devcommit()),
            _ => None,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

/// Split "MAJOR[.MINOR[.PATCH]][TAIL]" into numeric components plus the
/// pre-release tail. `None` when the text does not start with a digit.
fn split_main(main: &str) -> Option<(u32, u32, u32, String)> {
    let captures = Regex::new(r"^(\d+)(?:\.(\d+))?(?:\.(\d+))?(.*)$")
        .ok()
        .and_then(|re| re.captures(main))?;
    let number = |i: usize| {
        captures
            .get(i)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0)
    };
    let additional = captures
        .get(4)
        .map(|m| m.as_str().trim_start_matches(['-', '.']).to_string())
        .unwrap_or_default();
    Some((number(1), number(2), number(3), additional))
}
