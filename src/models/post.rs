use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::InvalidVerdict;

/// Content-derived identifier of a post (the numeric permalink segment).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(String);

impl PostId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PostId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Binary outcome of classifying a post's text. Encoded as `0`/`1` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Verdict {
    NoHighlight,
    Highlight,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::NoHighlight => "NoHighlight",
            Verdict::Highlight => "Highlight",
        }
    }

    pub fn is_highlight(&self) -> bool {
        matches!(self, Verdict::Highlight)
    }
}

impl TryFrom<u8> for Verdict {
    type Error = InvalidVerdict;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Verdict::NoHighlight),
            1 => Ok(Verdict::Highlight),
            other => Err(InvalidVerdict(other)),
        }
    }
}

impl From<Verdict> for u8 {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::NoHighlight => 0,
            Verdict::Highlight => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub verdict: Verdict,
    /// Kept for diagnostics only.
    pub original_text: String,
    pub decided_at: DateTime<Utc>,
}

impl Decision {
    pub fn new(verdict: Verdict, original_text: impl Into<String>) -> Self {
        Self {
            verdict,
            original_text: original_text.into(),
            decided_at: Utc::now(),
        }
    }
}

/// Per-post tracking state. Absence from the store means "unseen".
#[derive(Debug, Clone, PartialEq)]
pub enum TrackedState {
    Pending,
    Decided(Decision),
}

impl TrackedState {
    pub fn is_pending(&self) -> bool {
        matches!(self, TrackedState::Pending)
    }

    pub fn decision(&self) -> Option<&Decision> {
        match self {
            TrackedState::Decided(decision) => Some(decision),
            TrackedState::Pending => None,
        }
    }
}
