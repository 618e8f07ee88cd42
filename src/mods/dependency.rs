//! Dependency declarations from a mod's `info.json`
//!
//! Each declaration is a single line:
//! - `flib` - required
//! - `? flib` - optional
//! - `(?) flib` - optional, hidden from the in-game mod list
//! - `! flib` - conflicts with the declaring mod
//! - `~ flib` - required, but does not affect load order
//!
//! followed by an optional version constraint such as `>= 0.12.0`.
//! Names may contain spaces (`(?) Flow Control >= 3.0.5`).

use std::cmp::Ordering;
use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;

use crate::mods::error::Error;
use crate::mods::version::Version;

/// Set of dependency mode flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DependencyMode(u8);

impl DependencyMode {
    pub const REQUIRED: Self = Self(1);
    pub const OPTIONAL: Self = Self(1 << 1);
    pub const HIDDEN: Self = Self(1 << 2);
    pub const CONFLICT: Self = Self(1 << 3);
    pub const NO_AFFECT_LOAD_ORDER: Self = Self(1 << 4);

    pub const HIDDEN_OPTIONAL: Self = Self::OPTIONAL.union(Self::HIDDEN);

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// The prefix that declares this mode, or `""` for required dependencies.
    pub fn sigil(self) -> &'static str {
        SIGILS
            .iter()
            .find(|(_, mode)| *mode == self)
            .map(|(sigil, _)| *sigil)
            .unwrap_or("")
    }
}

impl Default for DependencyMode {
    fn default() -> Self {
        Self::REQUIRED
    }
}

impl BitOr for DependencyMode {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}

/// Sigils in the order they are tested. `(?)` must come before `?`.
const SIGILS: [(&str, DependencyMode); 4] = [
    ("(?)", DependencyMode::HIDDEN_OPTIONAL),
    ("?", DependencyMode::OPTIONAL),
    ("!", DependencyMode::CONFLICT),
    ("~", DependencyMode::NO_AFFECT_LOAD_ORDER),
];

/// Comparison operator of a version constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
}

impl Op {
    /// Operators in the order they are searched for. Two-character operators
    /// come first so `<=` is never read as `<`.
    const SEARCH_ORDER: [Op; 5] = [Op::Le, Op::Lt, Op::Ge, Op::Gt, Op::Eq];

    pub fn as_str(&self) -> &'static str {
        match self {
            Op::Lt => "<",
            Op::Le => "<=",
            Op::Eq => "=",
            Op::Ge => ">=",
            Op::Gt => ">",
        }
    }

    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Op::Lt => ordering == Ordering::Less,
            Op::Le => ordering != Ordering::Greater,
            Op::Eq => ordering == Ordering::Equal,
            Op::Ge => ordering != Ordering::Less,
            Op::Gt => ordering == Ordering::Greater,
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Version constraint attached to a dependency, e.g. `>= 0.12.0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Constraint {
    pub op: Op,
    pub version: Version,
}

impl Constraint {
    pub fn matches(&self, version: &Version) -> bool {
        self.op.accepts(version.cmp(&self.version))
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.op, self.version)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dependency {
    pub name: String,
    pub mode: DependencyMode,
    pub constraint: Option<Constraint>,
}

impl Dependency {
    pub fn is_optional(&self) -> bool {
        self.mode.contains(DependencyMode::OPTIONAL)
    }

    pub fn is_conflict(&self) -> bool {
        self.mode.contains(DependencyMode::CONFLICT)
    }
}

/// Parse a single dependency line.
///
/// An empty name is accepted; callers decide what to do with it.
/// A malformed version after an operator fails with
/// [`Error::InvalidVersionSpec`].
pub fn parse_dependency(line: &str) -> Result<Dependency, Error> {
    let (mode, rest) = SIGILS
        .iter()
        .find_map(|(sigil, mode)| line.strip_prefix(sigil).map(|rest| (*mode, rest)))
        .unwrap_or((DependencyMode::REQUIRED, line));

    let Some((op, index)) = find_op(rest) else {
        return Ok(Dependency {
            name: rest.trim().to_string(),
            mode,
            constraint: None,
        });
    };

    let version_str = rest[index + op.as_str().len()..].trim();
    let version =
        Version::parse_strict(version_str).map_err(|_| Error::InvalidVersionSpec {
            input: line.to_string(),
            version: version_str.to_string(),
        })?;

    Ok(Dependency {
        name: rest[..index].trim().to_string(),
        mode,
        constraint: Some(Constraint { op, version }),
    })
}

/// Find the first operator, in search order, and its byte offset.
fn find_op(s: &str) -> Option<(Op, usize)> {
    Op::SEARCH_ORDER
        .iter()
        .find_map(|op| s.find(op.as_str()).map(|index| (*op, index)))
}

impl FromStr for Dependency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_dependency(s)
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sigil = self.mode.sigil();
        if !sigil.is_empty() {
            write!(f, "{} ", sigil)?;
        }
        f.write_str(&self.name)?;
        if let Some(constraint) = &self.constraint {
            write!(f, " {}", constraint)?;
        }
        Ok(())
    }
}

/// A mod's declared dependencies, split by how they affect installation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dependencies {
    pub required: Vec<Dependency>,
    pub optional: Vec<Dependency>,
    pub conflicts: Vec<Dependency>,
}

impl Dependencies {
    /// Parse and classify dependency lines.
    ///
    /// Anything with the optional flag (hidden or not) is optional, anything
    /// with the conflict flag is a conflict, and everything else, including
    /// load-order-neutral dependencies, is required.
    pub fn parse<I, S>(lines: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut dependencies = Self::default();
        for line in lines {
            let dependency = parse_dependency(line.as_ref())?;
            if dependency.is_optional() {
                dependencies.optional.push(dependency);
            } else if dependency.is_conflict() {
                dependencies.conflicts.push(dependency);
            } else {
                dependencies.required.push(dependency);
            }
        }
        Ok(dependencies)
    }
}
