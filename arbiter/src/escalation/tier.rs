//! Generation capability tiers.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Ordered generation tiers; escalation moves up one step per retry.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EscalationTier {
    #[default]
    Basic,
    Advanced,
    Expert,
}

impl EscalationTier {
    pub const ALL: [EscalationTier; 3] = [Self::Basic, Self::Advanced, Self::Expert];

    /// The next tier up; `None` at `Expert`.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Basic => Some(Self::Advanced),
            Self::Advanced => Some(Self::Expert),
            Self::Expert => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.next().is_none()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Advanced => "advanced",
            Self::Expert => "expert",
        }
    }
}

impl std::fmt::Display for EscalationTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown tier '{0}' (expected basic, advanced or expert)")]
pub struct UnknownTier(pub String);

impl FromStr for EscalationTier {
    type Err = UnknownTier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownTier(s.to_string()))
    }
}
