//! Transaction access modes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The access mode a transaction is opened in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    ReadOnly,
    ReadWrite,
}

impl Mode {
    /// Whether a transaction in this mode can serve a request needing `required`.
    ///
    /// A readwrite transaction serves both kinds of request; a readonly one
    /// serves only reads.
    pub fn satisfies(self, required: Mode) -> bool {
        self == required || self == Self::ReadWrite
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadOnly => "readonly",
            Self::ReadWrite => "readwrite",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
