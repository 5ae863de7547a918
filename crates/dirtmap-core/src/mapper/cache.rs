//! The dependency cache: command arena plus one record per active qubit.

use super::arena::{CommandArena, CommandRef};
use super::cost::CostModel;
use super::record::DependencyRecord;
use dirtmap_common::types::{Command, QubitId};
use dirtmap_common::utils::error::{InvariantError, ProtocolError, Result};
use hashbrown::HashMap;
use smallvec::SmallVec;

/// Cached commands and per-qubit records.
///
/// A qubit is active exactly while it has a record. Records exist from the
/// qubit's allocation until its deallocation is forwarded (or until it is
/// remapped away), even while nothing is cached on them.
#[derive(Debug, Default)]
pub(crate) struct Cache {
    arena: CommandArena,
    records: HashMap<QubitId, DependencyRecord>,
}

impl Cache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn is_active(&self, qubit: QubitId) -> bool {
        self.records.contains_key(&qubit)
    }

    /// Active qubits in ascending id order.
    pub(crate) fn active_qubits(&self) -> Vec<QubitId> {
        let mut ids: Vec<QubitId> = self.records.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub(crate) fn record(&self, qubit: QubitId) -> Result<&DependencyRecord> {
        self.records
            .get(&qubit)
            .ok_or_else(|| InvariantError::MissingRecord { qubit }.into())
    }

    pub(crate) fn record_mut(&mut self, qubit: QubitId) -> Result<&mut DependencyRecord> {
        self.records
            .get_mut(&qubit)
            .ok_or_else(|| InvariantError::MissingRecord { qubit }.into())
    }

    pub(crate) fn try_record(&self, qubit: QubitId) -> Option<&DependencyRecord> {
        self.records.get(&qubit)
    }

    pub(crate) fn command(&self, r: CommandRef) -> Option<&Command> {
        self.arena.get(r)
    }

    pub(crate) fn command_mut(&mut self, r: CommandRef) -> Option<&mut Command> {
        self.arena.get_mut(r)
    }

    pub(crate) fn take_command(&mut self, r: CommandRef) -> Option<Command> {
        self.arena.remove(r)
    }

    /// Number of distinct commands currently cached.
    pub(crate) fn cached_commands(&self) -> usize {
        self.arena.len()
    }

    /// Opens an empty record for a newly allocated qubit.
    pub(crate) fn open(&mut self, qubit: QubitId) -> Result<()> {
        if self.records.contains_key(&qubit) {
            return Err(ProtocolError::AlreadyAllocated { qubit }.into());
        }
        self.records.insert(qubit, DependencyRecord::new(qubit));
        Ok(())
    }

    /// Removes a record whose buffer is empty.
    pub(crate) fn retire(&mut self, qubit: QubitId) -> Result<DependencyRecord> {
        let record = self
            .records
            .remove(&qubit)
            .ok_or(InvariantError::MissingRecord { qubit })?;
        if !record.is_empty() {
            let remaining = record.len();
            self.records.insert(qubit, record);
            return Err(InvariantError::NonEmptyOnRetire { qubit, remaining }.into());
        }
        Ok(record)
    }

    /// Removes a record regardless of its content. Used when a dirty qubit's
    /// buffer has been migrated elsewhere.
    pub(crate) fn detach(&mut self, qubit: QubitId) -> Result<DependencyRecord> {
        self.records
            .remove(&qubit)
            .ok_or_else(|| InvariantError::MissingRecord { qubit }.into())
    }

    /// Returns true if any of `qubits` has cached commands.
    pub(crate) fn any_buffered(&self, qubits: &[QubitId]) -> bool {
        qubits
            .iter()
            .any(|q| self.records.get(q).is_some_and(|r| !r.is_empty()))
    }

    /// Load a new command on `qubits` would reach: the busiest touched qubit
    /// plus the command's own cost.
    fn next_load(&self, qubits: &[QubitId], cost: u64) -> u64 {
        qubits
            .iter()
            .filter_map(|q| self.records.get(q))
            .map(DependencyRecord::load_now)
            .max()
            .unwrap_or(0)
            + cost
    }

    /// Caches `cmd` on every qubit it touches.
    pub(crate) fn push(&mut self, cmd: Command, costs: &CostModel) -> Result<CommandRef> {
        let ids: SmallVec<[QubitId; 4]> = cmd.qubit_ids();
        let load = self.next_load(&ids, costs.cost(&cmd));
        let mut positions: SmallVec<[usize; 4]> = SmallVec::with_capacity(ids.len());
        for &q in &ids {
            positions.push(self.record(q)?.next_position());
        }

        let r = self.arena.insert(cmd);
        for &q in &ids {
            self.record_mut(q)?.append(r, ids.clone(), positions.clone(), load);
        }
        Ok(r)
    }

    /// Accounts for `cmd` being forwarded without being cached.
    pub(crate) fn account_uncached(&mut self, cmd: &Command, costs: &CostModel) -> Result<()> {
        let ids = cmd.qubit_ids();
        let load = self.next_load(&ids, costs.cost(cmd));
        for &q in &ids {
            self.record_mut(q)?.account_forwarded(load);
        }
        Ok(())
    }

    /// Returns true if `qubit`'s buffer starts with its dirty allocation and
    /// ends with its deallocation.
    pub(crate) fn is_full_dirty_lifetime(&self, qubit: QubitId) -> bool {
        let Some(record) = self.records.get(&qubit) else {
            return false;
        };
        if record.len() < 2 {
            return false;
        }
        let first = record.front().and_then(|e| self.arena.get(e.cmd));
        let last = record.back().and_then(|e| self.arena.get(e.cmd));
        match (first, last) {
            (Some(first), Some(last)) => {
                first.is_dirty_allocation() && first.touches(qubit) && last.gate.is_deallocation()
            }
            _ => false,
        }
    }

    /// Returns true if the newest cached command on `qubit` is a deallocation.
    pub(crate) fn ends_in_deallocation(&self, qubit: QubitId) -> bool {
        self.records
            .get(&qubit)
            .and_then(DependencyRecord::back)
            .and_then(|e| self.arena.get(e.cmd))
            .is_some_and(|cmd| cmd.gate.is_deallocation())
    }

    /// Returns true if the newest cached command on `qubit` is fast-forwarding.
    pub(crate) fn ends_in_fast_forward(&self, qubit: QubitId) -> bool {
        self.records
            .get(&qubit)
            .and_then(DependencyRecord::back)
            .and_then(|e| self.arena.get(e.cmd))
            .is_some_and(|cmd| cmd.gate.is_fast_forwarding())
    }

    /// Validates every record and the cross-references between them.
    pub(crate) fn check_invariants(&self) -> Result<()> {
        for &qubit in self.records.keys() {
            self.check_record(qubit)?;
        }
        Ok(())
    }

    /// Validates one record and the sibling entries it points at.
    pub(crate) fn check_record(&self, qubit: QubitId) -> Result<()> {
        let record = self.record(qubit)?;
        record.check_invariants()?;
        for entry in record.entries() {
            for (sibling, position) in entry.siblings(qubit) {
                let other = self.record(sibling)?;
                if other.op_at(position)? != entry.cmd {
                    return Err(InvariantError::OrderMismatch {
                        qubit: sibling,
                        command: self
                            .arena
                            .get(entry.cmd)
                            .map_or_else(String::new, ToString::to_string),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }
}
