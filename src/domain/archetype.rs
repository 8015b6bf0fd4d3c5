//! Loop archetypes: the fixed categories a loop's intent is classified into.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CogctlError;

/// Fixed category describing a loop's intent shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Archetype {
    Explore,
    Optimize,
    Refactor,
    Implement,
    ValidateVerify,
    DebugRemediate,
    /// No classifier rule matched
    Unknown,
}

impl Archetype {
    /// Every archetype, including `Unknown`
    pub const ALL: [Archetype; 7] = [
        Archetype::Explore,
        Archetype::Optimize,
        Archetype::Refactor,
        Archetype::Implement,
        Archetype::ValidateVerify,
        Archetype::DebugRemediate,
        Archetype::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Archetype::Explore => "explore",
            Archetype::Optimize => "optimize",
            Archetype::Refactor => "refactor",
            Archetype::Implement => "implement",
            Archetype::ValidateVerify => "validate_verify",
            Archetype::DebugRemediate => "debug_remediate",
            Archetype::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Archetype {
    type Err = CogctlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Archetype::ALL
            .into_iter()
            .find(|a| a.as_str() == normalized)
            .ok_or_else(|| CogctlError::Config(format!("unknown archetype: {}", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archetype_serialization() {
        assert_eq!(
            serde_json::to_string(&Archetype::ValidateVerify).unwrap(),
            "\"validate_verify\""
        );
        assert_eq!(
            serde_json::to_string(&Archetype::DebugRemediate).unwrap(),
            "\"debug_remediate\""
        );
    }

    #[test]
    fn test_archetype_from_str_accepts_dashes() {
        assert_eq!("debug-remediate".parse::<Archetype>().unwrap(), Archetype::DebugRemediate);
        assert_eq!("Implement".parse::<Archetype>().unwrap(), Archetype::Implement);
        assert!("deploy".parse::<Archetype>().is_err());
    }

    #[test]
    fn test_display_matches_serde_tag() {
        for archetype in Archetype::ALL {
            let tag = serde_json::to_string(&archetype).unwrap();
            assert_eq!(tag, format!("\"{}\"", archetype));
        }
    }
}
