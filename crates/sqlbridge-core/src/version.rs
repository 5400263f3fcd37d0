//! Server version parsing and comparison.
//!
//! Backend version strings carry vendor suffixes ("5.5.5-10.4.12-MariaDB",
//! "8.0.32-debug"). Capability checks only care about the leading numeric
//! part, so everything from the first character that is neither a digit
//! nor a dot is stripped before comparison.

use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::sync::LazyLock;

static VERSION_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^0-9.].*").expect("version suffix regex must compile")
});

/// Strip everything after the leading dotted-numeric part.
pub fn canonical_version(raw: &str) -> String {
    VERSION_SUFFIX.replace(raw, "").into_owned()
}

/// A parsed dotted-numeric version, comparable component-wise.
///
/// Missing components compare as zero, so "5.5" equals "5.5.0".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerVersion(Vec<u64>);

impl ServerVersion {
    /// Parse the leading numeric part of a version string.
    ///
    /// Unparseable components terminate the sequence, so "5.x" parses as
    /// just "5". An input with no leading digits parses as empty and
    /// compares below everything.
    pub fn parse(raw: &str) -> Self {
        let canonical = canonical_version(raw);
        let parts = canonical
            .split('.')
            .map_while(|p| p.parse::<u64>().ok())
            .collect();
        Self(parts)
    }

    /// The parsed components in order.
    pub fn components(&self) -> &[u64] {
        &self.0
    }
}

impl Ord for ServerVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.0.len().max(other.0.len());
        for i in 0..len {
            let a = self.0.get(i).copied().unwrap_or(0);
            let b = other.0.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => {}
                ord => return ord,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for ServerVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{part}")?;
        }
        Ok(())
    }
}

/// True when `version` is at least `min`, comparing numeric parts only.
pub fn version_at_least(version: &str, min: &str) -> bool {
    ServerVersion::parse(version) >= ServerVersion::parse(min)
}
