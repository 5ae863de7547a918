//! The command envelope passed between pipeline stages.

use super::{DirtyQubitTag, Gate, QubitId, Tag};
use serde::{Deserialize, Serialize};
use smallvec::{SmallVec, smallvec};
use std::fmt;

/// A group of qubit references sharing one role within a command.
pub type QubitGroup = SmallVec<[QubitId; 2]>;

/// A gate applied to qubits, with annotations.
///
/// Qubits are grouped by role: `controls` first, then the ordered `qubits`
/// groups the gate acts on. Flattening yields every qubit the command
/// touches in a stable, order-significant sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// Gate identity.
    pub gate: Gate,
    /// Control qubits.
    #[serde(default)]
    pub controls: QubitGroup,
    /// Qubit groups the gate acts on.
    #[serde(default)]
    pub qubits: Vec<QubitGroup>,
    /// Annotations.
    #[serde(default)]
    pub tags: Vec<Tag>,
}

impl Command {
    /// Creates a command acting on a single group of qubits.
    #[must_use]
    pub fn new(gate: Gate, qubits: impl IntoIterator<Item = QubitId>) -> Self {
        Self {
            gate,
            controls: SmallVec::new(),
            qubits: vec![qubits.into_iter().collect()],
            tags: Vec::new(),
        }
    }

    /// Creates a clean allocation of `qubit`.
    #[must_use]
    pub fn allocate(qubit: QubitId) -> Self {
        Self::new(Gate::Allocate, [qubit])
    }

    /// Creates a dirty allocation of `qubit` carrying an empty dirty tag.
    #[must_use]
    pub fn allocate_dirty(qubit: QubitId) -> Self {
        Self::allocate(qubit).with_tag(Tag::Dirty(DirtyQubitTag::new()))
    }

    /// Creates a deallocation of `qubit`.
    #[must_use]
    pub fn deallocate(qubit: QubitId) -> Self {
        Self::new(Gate::Deallocate, [qubit])
    }

    /// Creates a barrier command.
    #[must_use]
    pub fn flush() -> Self {
        Self {
            gate: Gate::Flush,
            controls: SmallVec::new(),
            qubits: Vec::new(),
            tags: Vec::new(),
        }
    }

    /// Creates a controlled gate: `gate` on `target`, controlled by `controls`.
    #[must_use]
    pub fn controlled(
        gate: Gate,
        controls: impl IntoIterator<Item = QubitId>,
        target: QubitId,
    ) -> Self {
        Self {
            gate,
            controls: controls.into_iter().collect(),
            qubits: vec![smallvec![target]],
            tags: Vec::new(),
        }
    }

    /// Adds a tag.
    #[must_use]
    pub fn with_tag(mut self, tag: Tag) -> Self {
        self.tags.push(tag);
        self
    }

    /// Iterates over every qubit the command touches, controls first.
    pub fn all_qubits(&self) -> impl Iterator<Item = QubitId> + '_ {
        self.controls
            .iter()
            .copied()
            .chain(self.qubits.iter().flat_map(|g| g.iter().copied()))
    }

    /// Returns the flattened qubit list without duplicates, in first-seen order.
    #[must_use]
    pub fn qubit_ids(&self) -> SmallVec<[QubitId; 4]> {
        let mut ids: SmallVec<[QubitId; 4]> = SmallVec::new();
        for id in self.all_qubits() {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }

    /// Returns true if the command touches `qubit`.
    #[must_use]
    pub fn touches(&self, qubit: QubitId) -> bool {
        self.all_qubits().any(|q| q == qubit)
    }

    /// Returns the dirty tag, if present.
    #[must_use]
    pub fn dirty_tag(&self) -> Option<&DirtyQubitTag> {
        self.tags.iter().find_map(Tag::as_dirty)
    }

    /// Returns the dirty tag mutably, if present.
    pub fn dirty_tag_mut(&mut self) -> Option<&mut DirtyQubitTag> {
        self.tags.iter_mut().find_map(|tag| match tag {
            Tag::Dirty(dirty) => Some(dirty),
            _ => None,
        })
    }

    /// Returns true if this is the allocation of a dirty qubit.
    #[must_use]
    pub fn is_dirty_allocation(&self) -> bool {
        match self.gate {
            Gate::AllocateDirty => true,
            Gate::Allocate => self.dirty_tag().is_some(),
            _ => false,
        }
    }

    /// Rewrites every reference to `from` into `to`, returning the number of
    /// references changed.
    pub fn rewrite_qubit(&mut self, from: QubitId, to: QubitId) -> usize {
        let mut changed = 0;
        let groups = std::iter::once(&mut self.controls).chain(self.qubits.iter_mut());
        for group in groups {
            for qubit in group.iter_mut() {
                if *qubit == from {
                    *qubit = to;
                    changed += 1;
                }
            }
        }
        changed
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.controls.is_empty() {
            write!(f, "C{}", self.controls.len())?;
        }
        write!(f, "{} | (", self.gate)?;
        for (i, qubit) in self.all_qubits().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{qubit}")?;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_qubits_controls_first() {
        let cmd = Command::controlled(Gate::X, [QubitId(3), QubitId(1)], QubitId(0));
        let ids: Vec<_> = cmd.all_qubits().collect();
        assert_eq!(ids, vec![QubitId(3), QubitId(1), QubitId(0)]);
    }

    #[test]
    fn test_dirty_allocation_detection() {
        assert!(Command::allocate_dirty(QubitId(0)).is_dirty_allocation());
        assert!(!Command::allocate(QubitId(0)).is_dirty_allocation());
        assert!(Command::new(Gate::AllocateDirty, [QubitId(0)]).is_dirty_allocation());
        let tagged_dealloc =
            Command::deallocate(QubitId(0)).with_tag(Tag::Dirty(DirtyQubitTag::new()));
        assert!(!tagged_dealloc.is_dirty_allocation());
    }

    #[test]
    fn test_rewrite_qubit() {
        let mut cmd = Command::controlled(Gate::X, [QubitId(2)], QubitId(5));
        assert_eq!(cmd.rewrite_qubit(QubitId(5), QubitId(1)), 1);
        assert!(cmd.touches(QubitId(1)));
        assert!(!cmd.touches(QubitId(5)));
        assert_eq!(cmd.rewrite_qubit(QubitId(9), QubitId(1)), 0);
    }

    #[test]
    fn test_qubit_ids_dedup() {
        let cmd = Command::new(Gate::Custom("Weird".into()), [QubitId(1), QubitId(1)]);
        assert_eq!(cmd.qubit_ids().as_slice(), &[QubitId(1)]);
    }

    #[test]
    fn test_display() {
        let cmd = Command::controlled(Gate::X, [QubitId(0)], QubitId(1));
        assert_eq!(cmd.to_string(), "C1X | (q0, q1)");
        assert_eq!(Command::flush().to_string(), "Flush | ()");
    }

    #[test]
    fn test_dirty_tag_mut_extends_carriers() {
        let mut cmd = Command::allocate_dirty(QubitId(4));
        cmd.dirty_tag_mut().unwrap().carriers.insert(QubitId(1));
        assert!(cmd.dirty_tag().unwrap().carriers.contains(&QubitId(1)));
    }

    #[test]
    fn test_json_defaults() {
        let cmd: Command = serde_json::from_str(r#"{"gate":"H","qubits":[[2]]}"#).unwrap();
        assert_eq!(cmd, Command::new(Gate::H, [QubitId(2)]));
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Rewriting replaces every occurrence and nothing else.
            #[test]
            fn rewrite_replaces_every_reference(
                controls in prop::collection::vec(0u32..6, 0..4),
                targets in prop::collection::vec(0u32..6, 1..4),
                from in 0u32..6,
            ) {
                let mut cmd = Command::controlled(
                    Gate::X,
                    controls.iter().copied().map(QubitId),
                    QubitId(targets[0]),
                );
                cmd.qubits[0].extend(targets[1..].iter().copied().map(QubitId));
                let before: Vec<QubitId> = cmd.all_qubits().collect();
                let expected = before.iter().filter(|&&q| q == QubitId(from)).count();

                prop_assert_eq!(cmd.rewrite_qubit(QubitId(from), QubitId(99)), expected);
                prop_assert!(!cmd.touches(QubitId(from)));
                let after: Vec<QubitId> = cmd.all_qubits().collect();
                prop_assert_eq!(after.len(), before.len());
                for (old, new) in before.iter().zip(&after) {
                    if *old != QubitId(from) {
                        prop_assert_eq!(old, new);
                    }
                }
            }
        }
    }
}
