use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// The closed set of models this service can route to.
///
/// Requests name a model by its wire id (`"1"`, `"2"`); every comparison goes
/// through this enum so the raw string is parsed exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// Nous-Hermes 13B, instruction-tuned.
    Nous = 0,
    /// Pygmalion 7B SuperHOT-8K, roleplay-tuned.
    Pygmalion = 1,
}

impl ModelKind {
    pub const ALL: [ModelKind; 2] = [ModelKind::Nous, ModelKind::Pygmalion];

    /// Identifier used on the wire (`model_id` form field).
    pub fn wire_id(self) -> &'static str {
        match self {
            Self::Nous => "1",
            Self::Pygmalion => "2",
        }
    }

    /// Lower-case name used in configuration sections and logs.
    pub fn name(self) -> &'static str {
        match self {
            Self::Nous => "nous",
            Self::Pygmalion => "pygmalion",
        }
    }

    /// Resolve either a wire id or a configuration name.
    ///
    /// Surrounding whitespace is ignored; names are matched case-insensitively.
    pub fn lookup(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        Self::ALL
            .into_iter()
            .find(|k| k.wire_id() == raw || k.name().eq_ignore_ascii_case(raw))
    }
}

impl FromStr for ModelKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::lookup(s).ok_or_else(|| CoreError::UnknownModel(s.to_string()))
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.wire_id())
    }
}
