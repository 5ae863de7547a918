//! Per-qubit dependency records.
//!
//! A [`DependencyRecord`] buffers the not-yet-forwarded commands acting on one
//! qubit, oldest first. Each cached entry remembers every qubit the command
//! touches together with the absolute position of the command in that
//! qubit's full history (forwarded commands included), which is what lets
//! the mapper find the same command in a sibling record without a search.

use super::arena::CommandRef;
use dirtmap_common::types::QubitId;
use dirtmap_common::utils::error::{InvariantError, Result};
use smallvec::SmallVec;
use std::collections::VecDeque;

/// One command cached on a qubit.
#[derive(Debug, Clone)]
pub(crate) struct CachedCommand {
    /// The command in the arena.
    pub(crate) cmd: CommandRef,
    /// Estimated cumulative cost on this qubit right after the command.
    pub(crate) load: u64,
    /// Every qubit the command touches, this one included.
    pub(crate) inv_ids: SmallVec<[QubitId; 4]>,
    /// Absolute position of the command in each involved qubit's history
    /// (parallel to `inv_ids`).
    pub(crate) positions: SmallVec<[usize; 4]>,
}

impl CachedCommand {
    /// Returns the position recorded for `qubit`, if the command touches it.
    pub(crate) fn position_of(&self, qubit: QubitId) -> Option<usize> {
        self.inv_ids
            .iter()
            .position(|&q| q == qubit)
            .map(|i| self.positions[i])
    }

    /// Iterates over `(qubit, position)` pairs for every qubit except `own`.
    pub(crate) fn siblings(&self, own: QubitId) -> impl Iterator<Item = (QubitId, usize)> + '_ {
        self.inv_ids
            .iter()
            .copied()
            .zip(self.positions.iter().copied())
            .filter(move |&(q, _)| q != own)
    }

    /// Replaces `from` by `to` in the involved ids.
    pub(crate) fn rename(&mut self, from: QubitId, to: QubitId) {
        for q in &mut self.inv_ids {
            if *q == from {
                *q = to;
            }
        }
    }

    /// Sets the recorded position for `qubit`.
    pub(crate) fn set_position(&mut self, qubit: QubitId, position: usize) {
        for (q, p) in self.inv_ids.iter().zip(self.positions.iter_mut()) {
            if *q == qubit {
                *p = position;
            }
        }
    }
}

/// Buffer of cached commands for a single qubit.
#[derive(Debug)]
pub struct DependencyRecord {
    qubit: QubitId,
    entries: VecDeque<CachedCommand>,
    /// Commands already forwarded downstream.
    n_sent: usize,
    /// Load accumulated by forwarded commands.
    load_uncached: u64,
}

impl DependencyRecord {
    /// Creates an empty record for a freshly allocated qubit.
    pub(crate) fn new(qubit: QubitId) -> Self {
        Self {
            qubit,
            entries: VecDeque::new(),
            n_sent: 0,
            load_uncached: 0,
        }
    }

    /// The qubit owning this record.
    pub fn qubit(&self) -> QubitId {
        self.qubit
    }

    /// Number of cached commands.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of commands already forwarded.
    pub fn n_sent(&self) -> usize {
        self.n_sent
    }

    /// Load accumulated by forwarded commands.
    pub fn load_uncached(&self) -> u64 {
        self.load_uncached
    }

    /// Current load: the last cached load, or the forwarded baseline.
    pub fn load_now(&self) -> u64 {
        self.entries.back().map_or(self.load_uncached, |e| e.load)
    }

    /// Absolute position the next appended command will occupy.
    pub(crate) fn next_position(&self) -> usize {
        self.n_sent + self.entries.len()
    }

    pub(crate) fn front(&self) -> Option<&CachedCommand> {
        self.entries.front()
    }

    pub(crate) fn back(&self) -> Option<&CachedCommand> {
        self.entries.back()
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = &CachedCommand> + '_ {
        self.entries.iter()
    }

    pub(crate) fn get(&self, index: usize) -> Option<&CachedCommand> {
        self.entries.get(index)
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut CachedCommand> {
        self.entries.get_mut(index)
    }

    /// Appends a freshly cached command.
    pub(crate) fn append(
        &mut self,
        cmd: CommandRef,
        inv_ids: SmallVec<[QubitId; 4]>,
        positions: SmallVec<[usize; 4]>,
        load: u64,
    ) {
        self.entries.push_back(CachedCommand {
            cmd,
            load,
            inv_ids,
            positions,
        });
    }

    /// Removes the oldest cached command after it has been forwarded.
    pub(crate) fn pop_front(&mut self) -> Option<CachedCommand> {
        let entry = self.entries.pop_front()?;
        self.load_uncached = entry.load;
        self.n_sent += 1;
        Some(entry)
    }

    /// Removes the newest cached command without forwarding it.
    pub(crate) fn pop_back(&mut self) -> Option<CachedCommand> {
        self.entries.pop_back()
    }

    /// Removes every cached entry without touching the forwarded counters.
    pub(crate) fn drain(&mut self) -> impl Iterator<Item = CachedCommand> + '_ {
        self.entries.drain(..)
    }

    /// Accounts for a command forwarded without ever being cached.
    pub(crate) fn account_forwarded(&mut self, load: u64) {
        self.n_sent += 1;
        self.load_uncached = self.load_uncached.max(load);
    }

    /// Inserts `entries` at buffer index `at`, shifting later entries back.
    pub(crate) fn splice(&mut self, at: usize, entries: impl IntoIterator<Item = CachedCommand>) {
        let tail: Vec<CachedCommand> = self.entries.drain(at..).collect();
        self.entries.extend(entries);
        self.entries.extend(tail);
    }

    /// Converts an absolute position into a buffer index.
    pub(crate) fn index_of(&self, position: usize) -> Result<usize> {
        let end = self.next_position();
        if position < self.n_sent || position >= end {
            return Err(InvariantError::PositionOutOfRange {
                qubit: self.qubit,
                position,
                start: self.n_sent,
                end,
            }
            .into());
        }
        Ok(position - self.n_sent)
    }

    /// Load right after the command at absolute `position`.
    pub fn load_at(&self, position: usize) -> Result<u64> {
        let index = self.index_of(position)?;
        Ok(self.entries[index].load)
    }

    /// Overwrites the load of the command at absolute `position`.
    pub(crate) fn set_load_at(&mut self, position: usize, load: u64) -> Result<()> {
        let index = self.index_of(position)?;
        self.entries[index].load = load;
        Ok(())
    }

    /// The command at absolute `position`.
    pub(crate) fn op_at(&self, position: usize) -> Result<CommandRef> {
        let index = self.index_of(position)?;
        Ok(self.entries[index].cmd)
    }

    pub(crate) fn entry_at_mut(&mut self, position: usize) -> Result<&mut CachedCommand> {
        let index = self.index_of(position)?;
        Ok(&mut self.entries[index])
    }

    /// Validates field parity and load monotonicity.
    pub fn check_invariants(&self) -> Result<()> {
        let mut previous = self.load_uncached;
        for (index, entry) in self.entries.iter().enumerate() {
            if entry.inv_ids.len() != entry.positions.len() {
                return Err(InvariantError::FieldParity {
                    qubit: self.qubit,
                    index,
                    ids: entry.inv_ids.len(),
                    positions: entry.positions.len(),
                }
                .into());
            }
            if entry.load < previous {
                return Err(InvariantError::LoadDecreased {
                    qubit: self.qubit,
                    index,
                    previous,
                    current: entry.load,
                }
                .into());
            }
            previous = entry.load;
        }
        Ok(())
    }
}
