//! Movement and operation records kept by the ledger.

use super::destination::DestinationKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Physical transfer kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementKind {
    /// The source was relocated.
    Move,
    /// The source was duplicated.
    Copy,
}

impl MovementKind {
    /// Returns the kind as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Move => "move",
            Self::Copy => "copy",
        }
    }
}

impl fmt::Display for MovementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A companion file that travelled with a primary file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanionTransfer {
    /// Where the companion was taken from.
    pub source: PathBuf,
    /// Where the companion ended up.
    pub destination: PathBuf,
}

/// One recorded file transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    /// Move or copy.
    #[serde(rename = "operation")]
    pub kind: MovementKind,
    /// Path the file was read from.
    pub source: PathBuf,
    /// Path the file was written to.
    pub destination: PathBuf,
    /// Terms of the rules that caused the transfer.
    #[serde(default)]
    pub terms: Vec<String>,
    /// Kind of destination the file was routed to.
    pub dest_kind: DestinationKind,
    /// When the transfer happened.
    pub timestamp: DateTime<Utc>,
    /// Companion files transferred with the same kind.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub companions: Vec<CompanionTransfer>,
}

impl Movement {
    /// Creates a movement stamped with the current time.
    #[must_use]
    pub fn new(
        kind: MovementKind,
        source: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
        dest_kind: DestinationKind,
    ) -> Self {
        Self {
            kind,
            source: source.into(),
            destination: destination.into(),
            terms: Vec::new(),
            dest_kind,
            timestamp: Utc::now(),
            companions: Vec::new(),
        }
    }

    /// Sets the owning terms.
    #[must_use]
    pub fn with_terms(mut self, terms: Vec<String>) -> Self {
        self.terms = terms;
        self
    }

    /// Sets the companion transfers.
    #[must_use]
    pub fn with_companions(mut self, companions: Vec<CompanionTransfer>) -> Self {
        self.companions = companions;
        self
    }
}

/// Lifecycle state of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    /// Freshly recorded.
    #[default]
    Recorded,
    /// Reversed by undo.
    Undone,
    /// Replayed by redo.
    Redone,
}

impl OperationStatus {
    /// Returns the status as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Recorded => "recorded",
            Self::Undone => "undone",
            Self::Redone => "redone",
        }
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A named group of movements, the unit of undo and redo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// Unique identifier (UUID v7, time ordered).
    pub id: String,
    /// Human readable name, e.g. `Sort 12 files`.
    pub name: String,
    /// When the operation was recorded.
    pub timestamp: DateTime<Utc>,
    /// Movements in the order they were performed.
    pub movements: Vec<Movement>,
    /// Free-form metadata such as the routing mode.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Current lifecycle state.
    #[serde(default)]
    pub status: OperationStatus,
}

impl Operation {
    /// Creates a recorded operation.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        movements: Vec<Movement>,
        metadata: BTreeMap<String, String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            name: name.into(),
            timestamp: Utc::now(),
            movements,
            metadata,
            status: OperationStatus::Recorded,
        }
    }

    /// Returns the number of movements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.movements.len()
    }

    /// Returns true if the operation has no movements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.movements.is_empty()
    }
}
