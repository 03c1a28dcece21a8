//! Relation kinds between CWE entries.
//!
//! The upstream taxonomy names the relationship between two entries (its
//! "nature"). Only some of those natures describe containment in the
//! child-to-parent direction; those are the ones that shape a tree. Kinds this
//! crate does not know about are preserved as [`RelationKind::Other`] and are
//! never parent-oriented.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A named relationship between two CWE entries.
///
/// Serialises as its upstream name (e.g. `"ChildOf"`). Parsing ignores case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RelationKind {
    ChildOf,
    ParentOf,
    MemberOf,
    HasMember,
    CanFollow,
    CanPrecede,
    Requires,
    RequiredBy,
    StartsWith,
    StartedFrom,
    StoppedBy,
    IsA,
    PeerOf,
    CanAlsoBe,
    /// Any nature not listed above, kept verbatim.
    Other(String),
}

const KNOWN: [(&str, RelationKind); 14] = [
    ("ChildOf", RelationKind::ChildOf),
    ("ParentOf", RelationKind::ParentOf),
    ("MemberOf", RelationKind::MemberOf),
    ("HasMember", RelationKind::HasMember),
    ("CanFollow", RelationKind::CanFollow),
    ("CanPrecede", RelationKind::CanPrecede),
    ("Requires", RelationKind::Requires),
    ("RequiredBy", RelationKind::RequiredBy),
    ("StartsWith", RelationKind::StartsWith),
    ("StartedFrom", RelationKind::StartedFrom),
    ("StoppedBy", RelationKind::StoppedBy),
    ("IsA", RelationKind::IsA),
    ("PeerOf", RelationKind::PeerOf),
    ("CanAlsoBe", RelationKind::CanAlsoBe),
];

impl RelationKind {
    /// Whether this kind points from a child to its parent and therefore
    /// participates in tree construction.
    pub fn is_parent_oriented(&self) -> bool {
        matches!(
            self,
            RelationKind::ChildOf
                | RelationKind::MemberOf
                | RelationKind::CanFollow
                | RelationKind::Requires
                | RelationKind::StartedFrom
                | RelationKind::StoppedBy
                | RelationKind::IsA
        )
    }

    /// The upstream spelling of this kind.
    pub fn as_str(&self) -> &str {
        match self {
            RelationKind::Other(name) => name.as_str(),
            known => KNOWN
                .iter()
                .find(|(_, k)| k == known)
                .map(|(name, _)| *name)
                .unwrap_or_default(),
        }
    }
}

/// Look up whether a relation name is parent-oriented. Unknown names are not.
pub fn is_parent_relation(name: &str) -> bool {
    RelationKind::from(name).is_parent_oriented()
}

impl From<&str> for RelationKind {
    fn from(s: &str) -> Self {
        let s = s.trim();
        KNOWN
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(s))
            .map(|(_, kind)| kind.clone())
            .unwrap_or_else(|| RelationKind::Other(s.to_string()))
    }
}

impl From<String> for RelationKind {
    fn from(s: String) -> Self {
        RelationKind::from(s.as_str())
    }
}

impl From<RelationKind> for String {
    fn from(kind: RelationKind) -> Self {
        kind.to_string()
    }
}

/// Never fails; unrecognised names become [`RelationKind::Other`].
impl FromStr for RelationKind {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(RelationKind::from(s))
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- tests -------------------------------------------------------------------
