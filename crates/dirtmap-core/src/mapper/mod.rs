//! The dirty-qubit mapper.
//!
//! [`DirtyQubitMapper`] is a pipeline stage that buffers commands per qubit
//! and, when a dirty qubit's whole lifetime is buffered, moves its commands
//! onto another active qubit that never interacts with it. The dirty qubit
//! then never reaches downstream, lowering the circuit width by one.
//!
//! ## Submodules
//!
//! - `record` - per-qubit buffers with absolute positions and loads
//! - `cache` - the command arena plus every active qubit's record
//! - [`cost`] - gate costs for load estimation
//! - `involvement` - which qubits may stand in for a dirty qubit
//! - `remap` - rewriting and splicing a dirty qubit's commands
//! - [`config`] - construction settings
//!
//! ## Forwarding rules
//!
//! A command is forwarded as soon as none of its qubits has anything
//! buffered. Otherwise it is buffered and the touched qubits are checked:
//! a buffered full dirty lifetime is remapped, a buffer ending in a
//! measurement is forwarded whole, and a buffer longer than the cache limit
//! forwards its older half. A flush forwards everything.

mod arena;
mod cache;
pub mod config;
pub mod cost;
mod involvement;
mod record;
mod remap;

pub use config::{DEFAULT_CACHE_LIMIT, MapperConfig};
pub use cost::{CostModel, CostParseError, DEFAULT_COST_KEY};
pub use record::DependencyRecord;
pub use remap::RemapOutcome;

use crate::engine::Engine;
use arena::CommandRef;
use cache::Cache;
use dirtmap_common::types::{Command, QubitId};
use dirtmap_common::utils::error::{InvariantError, ProtocolError, Result};
use serde::Serialize;
use smallvec::SmallVec;
use std::collections::BTreeSet;

/// Counters describing what the mapper did so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MapperStats {
    /// Dirty qubits whose commands were moved onto a carrier.
    pub remapped: usize,
    /// Dirty qubits dropped because nothing happened to them.
    pub retired: usize,
    /// Remap attempts that found no legal carrier.
    pub blocked: usize,
    /// Commands handed downstream, flushes included.
    pub forwarded: usize,
}

/// Pipeline stage remapping dirty qubits onto uninvolved carriers.
pub struct DirtyQubitMapper {
    next: Box<dyn Engine>,
    cache_limit: usize,
    costs: CostModel,
    next_target: Option<QubitId>,
    cache: Cache,
    /// Dirty qubits with a buffered full lifetime and no legal carrier yet.
    blocked: BTreeSet<QubitId>,
    /// Dirty qubits allocated upstream and not yet deallocated there.
    dirty: BTreeSet<QubitId>,
    /// Commands forwarded while handling the current batch.
    outbox: Vec<Command>,
    stats: MapperStats,
}

impl DirtyQubitMapper {
    /// Creates a mapper forwarding to `next`.
    pub fn new(config: MapperConfig, next: Box<dyn Engine>) -> Self {
        Self {
            next,
            cache_limit: config.cache_limit,
            costs: config.cost_model,
            next_target: config.next_target,
            cache: Cache::new(),
            blocked: BTreeSet::new(),
            dirty: BTreeSet::new(),
            outbox: Vec::new(),
            stats: MapperStats::default(),
        }
    }

    /// Forces the next dirty deallocation to remap onto `target`.
    ///
    /// Involvement analysis is skipped for that remap. The target expires at
    /// the next dirty deallocation even if nothing gets remapped there.
    pub fn set_next_target(&mut self, target: QubitId) {
        self.next_target = Some(target);
    }

    /// The pending manual target, if any.
    pub fn next_target(&self) -> Option<QubitId> {
        self.next_target
    }

    /// Per-qubit cache limit.
    pub fn cache_limit(&self) -> usize {
        self.cache_limit
    }

    /// Gate costs used for load estimation.
    pub fn cost_model(&self) -> &CostModel {
        &self.costs
    }

    /// The record of an active qubit.
    pub fn record(&self, qubit: QubitId) -> Option<&DependencyRecord> {
        self.cache.try_record(qubit)
    }

    /// Active qubits in ascending order.
    pub fn active_qubits(&self) -> Vec<QubitId> {
        self.cache.active_qubits()
    }

    /// Number of distinct commands currently buffered.
    pub fn cached_commands(&self) -> usize {
        self.cache.cached_commands()
    }

    /// Returns true if `qubit` is a dirty qubit waiting for a legal carrier.
    pub fn is_blocked(&self, qubit: QubitId) -> bool {
        self.blocked.contains(&qubit)
    }

    /// Counters so far.
    pub fn stats(&self) -> MapperStats {
        self.stats
    }

    /// Validates every record and the links between them.
    ///
    /// # Errors
    ///
    /// Returns the first [`InvariantError`] found.
    pub fn check_invariants(&self) -> Result<()> {
        self.cache.check_invariants()
    }

    fn handle(&mut self, cmd: Command) -> Result<()> {
        if cmd.gate.is_flush() {
            self.flush_all()?;
            self.emit(cmd);
            return Ok(());
        }

        let ids = cmd.qubit_ids();
        if cmd.gate.is_allocation() {
            for &qubit in &ids {
                self.release_finished(qubit)?;
                self.cache.open(qubit)?;
            }
            if cmd.is_dirty_allocation() {
                self.dirty.extend(ids.iter().copied());
                tracing::debug!("caching dirty allocation {}", cmd);
                self.cache.push(cmd, &self.costs)?;
            } else {
                self.forward_now(cmd)?;
            }
            return self.retry_blocked();
        }

        if let Some(&qubit) = ids.iter().find(|&&q| !self.cache.is_active(q)) {
            return Err(ProtocolError::UnknownQubit {
                qubit,
                gate: cmd.gate,
            }
            .into());
        }

        let deallocation = cmd.gate.is_deallocation();
        let dirty_release = deallocation && ids.iter().any(|q| self.dirty.contains(q));
        if !self.cache.any_buffered(&ids) {
            self.forward_now(cmd)?;
            if deallocation {
                for &qubit in &ids {
                    self.cache.retire(qubit)?;
                }
            }
        } else {
            tracing::debug!("caching {}", cmd);
            self.cache.push(cmd, &self.costs)?;
            self.check_and_send(&ids)?;
        }

        if dirty_release {
            for qubit in &ids {
                self.dirty.remove(qubit);
            }
            if let Some(target) = self.next_target.take() {
                tracing::debug!("manual target {} expired unused", target);
            }
        }
        Ok(())
    }

    /// Forwards the rest of a lifetime whose deallocation is still cached so
    /// its id can be allocated again.
    fn release_finished(&mut self, qubit: QubitId) -> Result<()> {
        if !self.cache.ends_in_deallocation(qubit) {
            return Ok(());
        }
        let len = self.cache.record(qubit)?.len();
        tracing::debug!("{} reallocated, forwarding {} cached commands", qubit, len);
        self.send_pipeline(qubit, len, 0)
    }

    /// Forwards a command that touches no buffered qubit.
    fn forward_now(&mut self, cmd: Command) -> Result<()> {
        self.cache.account_uncached(&cmd, &self.costs)?;
        tracing::debug!("forwarding {} immediately", cmd);
        self.emit(cmd);
        Ok(())
    }

    fn emit(&mut self, cmd: Command) {
        self.stats.forwarded += 1;
        self.outbox.push(cmd);
    }

    /// Applies remap and forwarding rules to every qubit in `touched`.
    fn check_and_send(&mut self, touched: &[QubitId]) -> Result<()> {
        let mut pending: Vec<QubitId> = touched.to_vec();
        while let Some(qubit) = pending.pop() {
            if !self.cache.is_active(qubit) {
                self.blocked.remove(&qubit);
                continue;
            }

            if self.cache.is_full_dirty_lifetime(qubit) {
                match remap::remap(&mut self.cache, &self.costs, qubit, &mut self.next_target)? {
                    RemapOutcome::Retired => {
                        self.stats.retired += 1;
                        self.blocked.remove(&qubit);
                        continue;
                    }
                    RemapOutcome::Remapped(target) => {
                        self.cache.check_record(target)?;
                        self.stats.remapped += 1;
                        self.blocked.remove(&qubit);
                        pending.push(target);
                        continue;
                    }
                    RemapOutcome::Blocked => {
                        self.stats.blocked += 1;
                        self.blocked.insert(qubit);
                    }
                }
            }

            self.enforce_limits(qubit)?;
        }
        Ok(())
    }

    fn enforce_limits(&mut self, qubit: QubitId) -> Result<()> {
        let len = match self.cache.try_record(qubit) {
            Some(record) => record.len(),
            None => return Ok(()),
        };
        if self.cache.ends_in_fast_forward(qubit) {
            self.send_pipeline(qubit, len, 0)
        } else if len > self.cache_limit {
            tracing::debug!("{} holds {} commands, forwarding {}", qubit, len, len / 2);
            self.send_pipeline(qubit, len / 2, 0)
        } else {
            Ok(())
        }
    }

    /// Retries blocked dirty qubits after a new qubit became available.
    fn retry_blocked(&mut self) -> Result<()> {
        if self.blocked.is_empty() {
            return Ok(());
        }
        let waiting: Vec<QubitId> = std::mem::take(&mut self.blocked).into_iter().collect();
        // A manual target belongs to the next dirty deallocation, not to a retry.
        let manual = self.next_target.take();
        let result = self.check_and_send(&waiting);
        self.next_target = manual;
        result
    }

    /// Forwards the first `n` buffered commands of `qubit`.
    ///
    /// Before a command is forwarded, every other qubit it touches forwards
    /// its own buffer up to that command.
    fn send_pipeline(&mut self, qubit: QubitId, n: usize, depth: usize) -> Result<()> {
        let limit = self.cache.cached_commands() + 1;
        if depth > limit {
            return Err(InvariantError::RecursionLimit { qubit, limit }.into());
        }

        let goal = self.cache.record(qubit)?.n_sent() + n;
        loop {
            let (cmd_ref, ids, siblings) = {
                let Some(record) = self.cache.try_record(qubit) else {
                    break;
                };
                if record.n_sent() >= goal {
                    break;
                }
                let Some(head) = record.front() else {
                    break;
                };
                let siblings: SmallVec<[(QubitId, usize); 4]> = head.siblings(qubit).collect();
                (head.cmd, head.inv_ids.clone(), siblings)
            };

            for (sibling, position) in siblings {
                let ahead = self.cache.record(sibling)?.index_of(position)?;
                if ahead > 0 {
                    self.send_pipeline(sibling, ahead, depth + 1)?;
                }
            }
            self.forward_cached(cmd_ref, &ids)?;
        }
        Ok(())
    }

    /// Pops a command sitting at the head of every record in `ids` and
    /// forwards it.
    fn forward_cached(&mut self, cmd_ref: CommandRef, ids: &[QubitId]) -> Result<()> {
        for &qubit in ids {
            let at_head = self
                .cache
                .record(qubit)?
                .front()
                .is_some_and(|entry| entry.cmd == cmd_ref);
            if !at_head {
                return Err(InvariantError::OrderMismatch {
                    qubit,
                    command: self
                        .cache
                        .command(cmd_ref)
                        .map_or_else(String::new, ToString::to_string),
                }
                .into());
            }
            self.cache.record_mut(qubit)?.pop_front();
        }

        let cmd = match (self.cache.take_command(cmd_ref), ids.first()) {
            (Some(cmd), _) => cmd,
            (None, Some(&qubit)) => {
                return Err(InvariantError::OrderMismatch {
                    qubit,
                    command: String::new(),
                }
                .into());
            }
            (None, None) => return Ok(()),
        };

        if cmd.gate.is_deallocation() {
            for &qubit in ids {
                self.cache.retire(qubit)?;
                self.blocked.remove(&qubit);
            }
        }
        tracing::trace!("forwarding cached {}", cmd);
        self.emit(cmd);
        Ok(())
    }

    /// Forwards every buffered command.
    fn flush_all(&mut self) -> Result<()> {
        for qubit in self.cache.active_qubits() {
            let len = match self.cache.try_record(qubit) {
                Some(record) => record.len(),
                None => continue,
            };
            if len > 0 {
                self.send_pipeline(qubit, len, 0)?;
            }
        }
        self.blocked.clear();
        Ok(())
    }
}

impl Engine for DirtyQubitMapper {
    fn receive(&mut self, commands: Vec<Command>) -> Result<()> {
        for cmd in commands {
            self.handle(cmd)?;
        }
        if cfg!(debug_assertions) {
            self.cache.check_invariants()?;
        }

        let batch = std::mem::take(&mut self.outbox);
        if batch.is_empty() {
            return Ok(());
        }
        self.next.receive(batch)
    }

    fn name(&self) -> &'static str {
        "DirtyQubitMapper"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{CommandRecorder, RecordedCommands};
    use dirtmap_common::types::Gate;

    fn q(id: u32) -> QubitId {
        QubitId(id)
    }

    fn mapper(config: MapperConfig) -> (DirtyQubitMapper, RecordedCommands) {
        let recorder = CommandRecorder::new();
        let handle = recorder.handle();
        (DirtyQubitMapper::new(config, Box::new(recorder)), handle)
    }

    fn rendered(handle: &RecordedCommands) -> Vec<String> {
        handle.snapshot().iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_clean_commands_pass_straight_through() {
        let (mut m, out) = mapper(MapperConfig::new());
        m.receive(vec![
            Command::allocate(q(0)),
            Command::new(Gate::H, [q(0)]),
            Command::deallocate(q(0)),
        ])
        .unwrap();
        assert_eq!(out.len(), 3);
        assert!(m.active_qubits().is_empty());
        assert_eq!(m.cached_commands(), 0);
    }

    #[test]
    fn test_dirty_qubit_moves_onto_carrier() {
        let (mut m, out) = mapper(MapperConfig::new());
        m.receive(vec![
            Command::allocate_dirty(q(0)),
            Command::allocate(q(1)),
            Command::new(Gate::X, [q(0)]),
            Command::new(Gate::X, [q(0)]),
            Command::deallocate(q(0)),
        ])
        .unwrap();
        assert_eq!(rendered(&out), vec!["Allocate | (q1)"]);
        assert_eq!(m.stats().remapped, 1);

        m.receive(vec![Command::flush()]).unwrap();
        assert_eq!(
            rendered(&out),
            vec!["Allocate | (q1)", "X | (q1)", "X | (q1)", "Flush | ()"]
        );
        assert!(m.record(q(1)).unwrap().is_empty());
    }

    #[test]
    fn test_measurement_forwards_dependencies_first() {
        let (mut m, out) = mapper(MapperConfig::new());
        m.receive(vec![
            Command::allocate(q(0)),
            Command::allocate_dirty(q(1)),
            Command::controlled(Gate::X, [q(0)], q(1)),
            Command::new(Gate::H, [q(0)]),
            Command::new(Gate::Measure, [q(0)]),
        ])
        .unwrap();
        assert_eq!(
            rendered(&out),
            vec![
                "Allocate | (q0)",
                "Allocate | (q1)",
                "C1X | (q0, q1)",
                "H | (q0)",
                "Measure | (q0)",
            ]
        );
        assert!(m.record(q(1)).unwrap().is_empty());
        assert!(m.check_invariants().is_ok());
    }

    #[test]
    fn test_unknown_qubit_is_protocol_error() {
        let (mut m, _) = mapper(MapperConfig::new());
        let err = m.receive(vec![Command::deallocate(q(5))]).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::UnknownQubit {
                qubit: q(5),
                gate: Gate::Deallocate,
            }
            .into()
        );

        let err = m
            .receive(vec![Command::new(Gate::H, [q(3)])])
            .unwrap_err();
        assert!(err.is_protocol());
    }

    #[test]
    fn test_double_allocation_is_protocol_error() {
        let (mut m, _) = mapper(MapperConfig::new());
        let err = m
            .receive(vec![Command::allocate(q(0)), Command::allocate_dirty(q(0))])
            .unwrap_err();
        assert!(err.is_protocol());
    }

    #[test]
    fn test_blocked_qubit_retried_on_allocation() {
        let (mut m, out) = mapper(MapperConfig::new());
        m.receive(vec![
            Command::allocate_dirty(q(0)),
            Command::allocate(q(1)),
            Command::controlled(Gate::X, [q(1)], q(0)),
            Command::deallocate(q(0)),
        ])
        .unwrap();
        assert!(m.is_blocked(q(0)));
        assert_eq!(m.stats().blocked, 1);

        m.receive(vec![Command::allocate(q(2)), Command::flush()])
            .unwrap();
        assert!(!m.is_blocked(q(0)));
        assert_eq!(m.stats().remapped, 1);
        assert_eq!(
            rendered(&out),
            vec![
                "Allocate | (q1)",
                "Allocate | (q2)",
                "C1X | (q1, q2)",
                "Flush | ()",
            ]
        );
    }

    #[test]
    fn test_blocked_qubit_forwarded_unmapped_on_flush() {
        let (mut m, out) = mapper(MapperConfig::new());
        m.receive(vec![
            Command::allocate_dirty(q(0)),
            Command::allocate(q(1)),
            Command::controlled(Gate::X, [q(1)], q(0)),
            Command::deallocate(q(0)),
            Command::flush(),
        ])
        .unwrap();
        assert_eq!(
            rendered(&out),
            vec![
                "Allocate | (q1)",
                "Allocate | (q0)",
                "C1X | (q1, q0)",
                "Deallocate | (q0)",
                "Flush | ()",
            ]
        );
        assert!(!m.is_blocked(q(0)));
        assert_eq!(m.active_qubits(), vec![q(1)]);
    }

    #[test]
    fn test_manual_target_set_at_runtime() {
        let (mut m, out) = mapper(MapperConfig::new());
        m.receive(vec![
            Command::allocate(q(1)),
            Command::allocate(q(2)),
            Command::new(Gate::H, [q(2)]),
        ])
        .unwrap();
        m.set_next_target(q(2));
        m.receive(vec![
            Command::allocate_dirty(q(0)),
            Command::new(Gate::Z, [q(0)]),
            Command::deallocate(q(0)),
            Command::flush(),
        ])
        .unwrap();
        assert_eq!(m.next_target(), None);
        assert_eq!(rendered(&out).last().map(String::as_str), Some("Flush | ()"));
        assert!(rendered(&out).contains(&"Z | (q2)".to_string()));
    }

    #[test]
    fn test_blocked_retry_leaves_manual_target_pending() {
        let (mut m, _) = mapper(MapperConfig::new());
        m.receive(vec![
            Command::allocate_dirty(q(0)),
            Command::allocate(q(1)),
            Command::controlled(Gate::X, [q(1)], q(0)),
            Command::deallocate(q(0)),
        ])
        .unwrap();
        m.set_next_target(q(1));

        m.receive(vec![Command::allocate(q(2))]).unwrap();
        assert_eq!(m.stats().remapped, 1);
        assert_eq!(m.next_target(), Some(q(1)));
    }

    #[test]
    fn test_forwarding_depth_is_bounded() {
        let (mut m, out) = mapper(MapperConfig::new());
        m.receive(vec![
            Command::allocate_dirty(q(0)),
            Command::new(Gate::X, [q(0)]),
        ])
        .unwrap();

        let limit = m.cached_commands() + 1;
        let err = m.send_pipeline(q(0), 1, limit + 1).unwrap_err();
        assert_eq!(
            err,
            InvariantError::RecursionLimit {
                qubit: q(0),
                limit
            }
            .into()
        );
        assert_eq!(m.record(q(0)).unwrap().len(), 2);
        assert!(out.is_empty());

        m.send_pipeline(q(0), 1, limit).unwrap();
        assert_eq!(m.record(q(0)).unwrap().len(), 1);
    }

    #[test]
    fn test_name() {
        let (m, _) = mapper(MapperConfig::new());
        assert_eq!(m.name(), "DirtyQubitMapper");
    }
}
