//! Core data model.
//!
//! An item is a candidate record awaiting classification. Every item lives in
//! exactly one of three named sets in the queue store: `todo`, `accepted`
//! or `rejected`.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Item
// ---------------------------------------------------------------------------

/// A single record awaiting classification (e.g. a normalized address).
///
/// The engine only needs equality and hashing; the value is opaque.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Item(pub String);

impl Item {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Item {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Item {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Item {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// ---------------------------------------------------------------------------
// Sets
// ---------------------------------------------------------------------------

/// The three named sets an item can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetName {
    /// Not yet processed.
    Todo,
    /// Verification succeeded.
    Accepted,
    /// Verification returned false or failed.
    Rejected,
}

impl SetName {
    pub const ALL: [SetName; 3] = [SetName::Todo, SetName::Accepted, SetName::Rejected];

    /// Key suffix used inside the store namespace.
    pub fn key(self) -> &'static str {
        match self {
            SetName::Todo => "unverified",
            SetName::Accepted => "good",
            SetName::Rejected => "bad",
        }
    }
}

impl std::fmt::Display for SetName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SetName::Todo => "todo",
            SetName::Accepted => "accepted",
            SetName::Rejected => "rejected",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Verdict
// ---------------------------------------------------------------------------

/// Classification of one popped item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Accepted,
    Rejected,
}

impl Verdict {
    /// The destination set for this verdict.
    pub fn destination(self) -> SetName {
        match self {
            Verdict::Accepted => SetName::Accepted,
            Verdict::Rejected => SetName::Rejected,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Accepted => "accepted",
            Verdict::Rejected => "rejected",
        }
    }
}

impl From<bool> for Verdict {
    fn from(success: bool) -> Self {
        if success {
            Verdict::Accepted
        } else {
            Verdict::Rejected
        }
    }
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Cardinalities of the three sets at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub todo: u64,
    pub accepted: u64,
    pub rejected: u64,
}

impl Stats {
    pub fn total(&self) -> u64 {
        self.todo + self.accepted + self.rejected
    }
}
