use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

/// How the desired state of an invocation is to be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Create the object, or update the fields that differ.
    #[default]
    Present,
    Absent,
    /// Report the actual object; never mutates.
    Read,
    /// Replace the object entirely: delete, then create.
    Overwrite,
    /// Add to an existing object without removing anything.
    Append,
}

impl Mode {
    pub const ALL: [Mode; 5] = [
        Mode::Present,
        Mode::Absent,
        Mode::Read,
        Mode::Overwrite,
        Mode::Append,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Present => "present",
            Mode::Absent => "absent",
            Mode::Read => "read",
            Mode::Overwrite => "overwrite",
            Mode::Append => "append",
        }
    }
}

impl Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown state {0:?}, expected one of present, absent, read, overwrite, append")]
pub struct UnknownMode(pub String);

impl FromStr for Mode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mode::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| UnknownMode(s.to_string()))
    }
}
