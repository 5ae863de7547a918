//! Command annotations.

use super::QubitId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Marks an allocation (or deallocation) as belonging to a dirty qubit.
///
/// A dirty qubit may start in any state and is guaranteed to be returned to
/// that state when it is deallocated. `carriers` lists the qubits the dirty
/// qubit should preferably be remapped into; it is advisory only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirtyQubitTag {
    /// Preferred remap targets.
    #[serde(default)]
    pub carriers: BTreeSet<QubitId>,
}

impl DirtyQubitTag {
    /// Creates a dirty tag without preferred carriers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a dirty tag with the given preferred carriers.
    #[must_use]
    pub fn with_carriers(carriers: impl IntoIterator<Item = QubitId>) -> Self {
        Self {
            carriers: carriers.into_iter().collect(),
        }
    }
}

/// An annotation attached to a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tag {
    /// Dirty-qubit marker with preferred carriers.
    Dirty(DirtyQubitTag),
    /// The command is part of a compute section.
    Compute,
    /// The command is part of an uncompute section.
    Uncompute,
    /// Free-form annotation passed through untouched.
    Custom(String),
}

impl Tag {
    /// Returns the dirty-qubit payload, if this is a dirty tag.
    #[must_use]
    pub fn as_dirty(&self) -> Option<&DirtyQubitTag> {
        match self {
            Tag::Dirty(tag) => Some(tag),
            _ => None,
        }
    }
}
