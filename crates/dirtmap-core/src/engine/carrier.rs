//! Preferred-carrier sections.
//!
//! While a [`CarrierIndicator`] sits in front of the mapper, every dirty
//! allocation passing through it gets the section's carriers added to its
//! dirty tag. Dirty qubits allocated inside the section must be deallocated
//! before the section ends.
//!
//! Sections nest by wrapping: the newest section wraps the older chain, and
//! ending it hands the older chain back.
//!
//! ```ignore
//! let section = CarrierIndicator::new(Box::new(mapper), [carrier]);
//! let mut pipeline: Box<dyn Engine> = Box::new(section);
//! pipeline.receive(commands)?;
//! ```

use super::Engine;
use dirtmap_common::types::{Command, DirtyQubitTag, Gate, QubitId, Tag};
use dirtmap_common::utils::error::{ProtocolError, Result};
use std::collections::BTreeSet;

/// Annotates dirty allocations with preferred remap targets.
pub struct CarrierIndicator {
    next: Box<dyn Engine>,
    carriers: BTreeSet<QubitId>,
    /// Dirty qubits allocated in this section and not yet deallocated.
    open_dirty: BTreeSet<QubitId>,
}

impl CarrierIndicator {
    /// Opens a section forwarding to `next` with the given carriers.
    pub fn new(next: Box<dyn Engine>, carriers: impl IntoIterator<Item = QubitId>) -> Self {
        Self {
            next,
            carriers: carriers.into_iter().collect(),
            open_dirty: BTreeSet::new(),
        }
    }

    /// The carriers this section adds.
    pub fn carriers(&self) -> &BTreeSet<QubitId> {
        &self.carriers
    }

    /// Closes the section and returns the wrapped engine.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnclosedCarrierScope`] if a dirty qubit
    /// allocated in the section is still allocated.
    pub fn end_targeting(self) -> Result<Box<dyn Engine>> {
        if !self.open_dirty.is_empty() {
            return Err(ProtocolError::UnclosedCarrierScope {
                qubits: self.open_dirty.into_iter().collect(),
            }
            .into());
        }
        Ok(self.next)
    }

    fn annotate(&mut self, cmd: &mut Command) {
        if cmd.is_dirty_allocation() {
            if cmd.dirty_tag().is_none() {
                cmd.tags.push(Tag::Dirty(DirtyQubitTag::new()));
            }
            if let Some(tag) = cmd.dirty_tag_mut() {
                tag.carriers.extend(self.carriers.iter().copied());
            }
            self.open_dirty.extend(cmd.all_qubits());
        } else if cmd.gate == Gate::Deallocate {
            for qubit in cmd.all_qubits() {
                self.open_dirty.remove(&qubit);
            }
        }
    }
}

impl Engine for CarrierIndicator {
    fn receive(&mut self, mut commands: Vec<Command>) -> Result<()> {
        for cmd in &mut commands {
            self.annotate(cmd);
        }
        self.next.receive(commands)
    }

    fn name(&self) -> &'static str {
        "CarrierIndicator"
    }
}
