//! Terms: key ranges used to filter cursors and counts.
//!
//! The core never evaluates terms itself; they are handed to the engine,
//! which uses [`Term::contains`] (or its own equivalent) to select entries.

use std::fmt;
use std::ops::Bound;

use crate::Key;

/// An exact-match or interval filter over keys.
#[derive(Clone, Debug, PartialEq)]
pub enum Term {
    /// Matches a single key.
    Only(Key),
    /// Matches every key between the two bounds.
    Range { lower: Bound<Key>, upper: Bound<Key> },
}

impl Term {
    pub fn only(key: impl Into<Key>) -> Self {
        Self::Only(key.into())
    }

    /// Keys at or above `key` (strictly above when `open`).
    pub fn lower_bound(key: impl Into<Key>, open: bool) -> Self {
        Self::Range {
            lower: bound(key.into(), open),
            upper: Bound::Unbounded,
        }
    }

    /// Keys at or below `key` (strictly below when `open`).
    pub fn upper_bound(key: impl Into<Key>, open: bool) -> Self {
        Self::Range {
            lower: Bound::Unbounded,
            upper: bound(key.into(), open),
        }
    }

    /// Keys between `lower` and `upper`. An inverted range matches nothing.
    pub fn bound(
        lower: impl Into<Key>,
        upper: impl Into<Key>,
        lower_open: bool,
        upper_open: bool,
    ) -> Self {
        Self::Range {
            lower: bound(lower.into(), lower_open),
            upper: bound(upper.into(), upper_open),
        }
    }

    pub fn contains(&self, key: &Key) -> bool {
        match self {
            Self::Only(only) => only == key,
            Self::Range { lower, upper } => {
                let above = match lower {
                    Bound::Included(l) => key >= l,
                    Bound::Excluded(l) => key > l,
                    Bound::Unbounded => true,
                };
                let below = match upper {
                    Bound::Included(u) => key <= u,
                    Bound::Excluded(u) => key < u,
                    Bound::Unbounded => true,
                };
                above && below
            }
        }
    }
}

fn bound(key: Key, open: bool) -> Bound<Key> {
    if open {
        Bound::Excluded(key)
    } else {
        Bound::Included(key)
    }
}

impl From<Key> for Term {
    fn from(key: Key) -> Self {
        Self::Only(key)
    }
}

impl From<&str> for Term {
    fn from(s: &str) -> Self {
        Self::Only(Key::from(s))
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Only(key) => write!(f, "= {key}"),
            Self::Range { lower, upper } => {
                match lower {
                    Bound::Included(k) => write!(f, "[{k}")?,
                    Bound::Excluded(k) => write!(f, "({k}")?,
                    Bound::Unbounded => write!(f, "(-inf")?,
                }
                write!(f, ", ")?;
                match upper {
                    Bound::Included(k) => write!(f, "{k}]"),
                    Bound::Excluded(k) => write!(f, "{k})"),
                    Bound::Unbounded => write!(f, "+inf)"),
                }
            }
        }
    }
}
