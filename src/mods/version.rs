//! Three-part mod versions (`major.minor.patch`)
//!
//! Mod versions are plain numeric triples. They are not semver: there are no
//! pre-release or build segments, and leading zeros (`0.17.01`) show up in the
//! wild, so they get their own small type instead of `semver::Version`.

use std::fmt;
use std::str::FromStr;

use crate::mods::error::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse a version, never failing.
    ///
    /// Missing or non-numeric components become zero, so `"1.x"` parses to
    /// `1.0.0` and `"garbage"` to `0.0.0`.
    pub fn parse_lenient(version: &str) -> Self {
        let mut fields = version.splitn(3, '.').map(|f| f.trim().parse::<u64>().unwrap_or(0));

        Self {
            major: fields.next().unwrap_or(0),
            minor: fields.next().unwrap_or(0),
            patch: fields.next().unwrap_or(0),
        }
    }

    /// Parse a version, rejecting anything that is not one to three
    /// dot-separated unsigned integers.
    ///
    /// Partial versions are padded with zeros:
    /// - "1" -> 1.0.0
    /// - "1.1" -> 1.1.0
    pub fn parse_strict(version: &str) -> Result<Self, Error> {
        let invalid = || Error::InvalidVersionSpec {
            input: version.to_string(),
            version: version.to_string(),
        };

        let fields: Vec<&str> = version.trim().split('.').collect();
        if fields.len() > 3 {
            return Err(invalid());
        }

        let mut parts = [0u64; 3];
        for (slot, field) in parts.iter_mut().zip(&fields) {
            if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            *slot = field.parse().map_err(|_| invalid())?;
        }

        Ok(Self::new(parts[0], parts[1], parts[2]))
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_strict(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// File name of a cached or installed mod archive: `<name>_<version>.zip`.
pub fn artifact_file_name(name: &str, version: &Version) -> String {
    format!("{}_{}.zip", name, version)
}

/// Split an archive file name into the mod name and its version.
///
/// The version is everything after the last `_`, parsed leniently, so a
/// malformed version never hides the archive from a listing.
/// Returns `None` for files that are not `*_*.zip`.
pub fn split_artifact_file_name(file_name: &str) -> Option<(&str, Version)> {
    let stem = file_name.strip_suffix(".zip")?;
    let (name, version) = stem.rsplit_once('_')?;
    Some((name, Version::parse_lenient(version)))
}
