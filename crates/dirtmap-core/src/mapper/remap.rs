//! Remapping a finished dirty qubit onto a carrier.
//!
//! Once a dirty qubit's whole lifetime sits in its record, its allocation and
//! deallocation are dropped and the remaining commands are rewritten onto a
//! carrier qubit and spliced into the carrier's record. Every phase that
//! reads the cache runs before the phase that mutates it.

use super::cache::Cache;
use super::cost::CostModel;
use super::involvement::{legal_targets, pick_target};
use super::record::CachedCommand;
use dirtmap_common::types::QubitId;
use dirtmap_common::utils::error::{InvariantError, ProtocolError, Result};
use std::collections::{BTreeSet, VecDeque};

/// Result of a remap attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemapOutcome {
    /// The dirty qubit had no commands besides allocation and deallocation;
    /// its record was deleted and nothing reaches downstream.
    Retired,
    /// The dirty qubit's commands now live on the given carrier.
    Remapped(QubitId),
    /// No legal carrier exists yet; the record is left untouched.
    Blocked,
}

/// Attempts to remap `dirty`, whose full lifetime must be cached.
///
/// `manual` is consumed by every call, whatever the outcome. When set it
/// replaces the involvement analysis, but it must still be an active qubit
/// that no command of `dirty` touches.
pub(crate) fn remap(
    cache: &mut Cache,
    costs: &CostModel,
    dirty: QubitId,
    manual: &mut Option<QubitId>,
) -> Result<RemapOutcome> {
    if !cache.is_full_dirty_lifetime(dirty) {
        return Err(InvariantError::NotFullLifetime { qubit: dirty }.into());
    }
    let manual = manual.take();

    if cache.record(dirty)?.len() == 2 {
        retire_empty(cache, dirty)?;
        return Ok(RemapOutcome::Retired);
    }

    let target = match manual {
        Some(target) => {
            check_manual_target(cache, dirty, target)?;
            target
        }
        None => {
            let preferred = preferred_carriers(cache, dirty)?;
            let candidates = legal_targets(cache, dirty, &preferred)?;
            match pick_target(cache, &candidates) {
                Some(target) => {
                    tracing::debug!(
                        "remapping {} into {} ({} candidates)",
                        dirty,
                        target,
                        candidates.len()
                    );
                    target
                }
                None => {
                    tracing::debug!("no legal carrier for {}, keeping it cached", dirty);
                    return Ok(RemapOutcome::Blocked);
                }
            }
        }
    };

    migrate(cache, costs, dirty, target)?;
    Ok(RemapOutcome::Remapped(target))
}

fn check_manual_target(cache: &Cache, dirty: QubitId, target: QubitId) -> Result<()> {
    if target == dirty || !cache.is_active(target) {
        return Err(ProtocolError::InactiveTarget { qubit: target }.into());
    }
    let involved = cache
        .record(dirty)?
        .entries()
        .any(|entry| entry.inv_ids.contains(&target));
    if involved {
        return Err(ProtocolError::InvolvedTarget { target, dirty }.into());
    }
    Ok(())
}

/// Carriers requested by the dirty allocation's tag.
fn preferred_carriers(cache: &Cache, dirty: QubitId) -> Result<BTreeSet<QubitId>> {
    let record = cache.record(dirty)?;
    Ok(record
        .front()
        .and_then(|e| cache.command(e.cmd))
        .and_then(|cmd| cmd.dirty_tag())
        .map(|tag| tag.carriers.clone())
        .unwrap_or_default())
}

/// Drops an allocation/deallocation-only dirty qubit.
fn retire_empty(cache: &mut Cache, dirty: QubitId) -> Result<()> {
    let mut record = cache.detach(dirty)?;
    for entry in record.drain() {
        cache.take_command(entry.cmd);
    }
    tracing::debug!("dirty qubit {} retired without commands", dirty);
    Ok(())
}

/// Moves `dirty`'s commands (minus allocation and deallocation) onto `target`.
fn migrate(cache: &mut Cache, costs: &CostModel, dirty: QubitId, target: QubitId) -> Result<()> {
    let mut record = cache.detach(dirty)?;
    if let Some(alloc) = record.pop_front() {
        cache.take_command(alloc.cmd);
    }
    if let Some(dealloc) = record.pop_back() {
        cache.take_command(dealloc.cmd);
    }
    let mut moving: Vec<CachedCommand> = record.drain().collect();

    // Rewrite the canonical commands and every reference in sibling records.
    for entry in &mut moving {
        if let Some(cmd) = cache.command_mut(entry.cmd) {
            cmd.rewrite_qubit(dirty, target);
        }
        entry.rename(dirty, target);
        for (sibling, position) in entry.siblings(target).collect::<Vec<_>>() {
            cache
                .record_mut(sibling)?
                .entry_at_mut(position)?
                .rename(dirty, target);
        }
    }

    // Splice before a trailing deallocation of the target, else at the end.
    let at = {
        let carrier = cache.record(target)?;
        if cache.ends_in_deallocation(target) {
            carrier.len() - 1
        } else {
            carrier.len()
        }
    };
    let spliced = moving.len();
    cache.record_mut(target)?.splice(at, moving);

    repair_positions(cache, target, at)?;
    repair_loads(cache, costs, target, at, at + spliced)?;
    Ok(())
}

/// Re-derives the target's absolute positions from buffer index `from` on and
/// pushes them into the sibling records that point back at those commands.
fn repair_positions(cache: &mut Cache, target: QubitId, from: usize) -> Result<()> {
    // (sibling, position in sibling, new position on target)
    let mut backlinks: Vec<(QubitId, usize, usize)> = Vec::new();
    {
        let record = cache.record_mut(target)?;
        let base = record.n_sent();
        for index in from..record.len() {
            let Some(entry) = record.get_mut(index) else {
                break;
            };
            let position = base + index;
            entry.set_position(target, position);
            backlinks.extend(entry.siblings(target).map(|(q, p)| (q, p, position)));
        }
    }

    for (sibling, at, position) in backlinks {
        cache
            .record_mut(sibling)?
            .entry_at_mut(at)?
            .set_position(target, position);
    }
    Ok(())
}

/// Recomputes loads on `qubit` from buffer index `from` on.
///
/// Entries below `forced_until` are always recomputed; past it, the walk
/// stops at the first entry whose load does not rise. Raised loads are
/// pushed into sibling records and repaired there in turn.
fn repair_loads(
    cache: &mut Cache,
    costs: &CostModel,
    qubit: QubitId,
    from: usize,
    forced_until: usize,
) -> Result<()> {
    let limit = cache.cached_commands().saturating_mul(cache.cached_commands()) + 16;
    repair_loads_within(cache, costs, qubit, from, forced_until, limit)
}

/// [`repair_loads`] giving up after `limit` record walks.
fn repair_loads_within(
    cache: &mut Cache,
    costs: &CostModel,
    qubit: QubitId,
    from: usize,
    forced_until: usize,
    limit: usize,
) -> Result<()> {
    let mut pending: VecDeque<(QubitId, usize, usize)> = VecDeque::new();
    pending.push_back((qubit, from, forced_until));
    let mut steps = 0usize;

    while let Some((qubit, from, forced_until)) = pending.pop_front() {
        steps += 1;
        if steps > limit {
            return Err(InvariantError::RecursionLimit { qubit, limit }.into());
        }

        let len = cache.record(qubit)?.len();
        for index in from..len {
            let (cmd_ref, current, previous, siblings) = {
                let record = cache.record(qubit)?;
                let Some(entry) = record.get(index) else {
                    break;
                };
                let previous = if index == 0 {
                    record.load_uncached()
                } else {
                    record.get(index - 1).map_or(0, |e| e.load)
                };
                let siblings: Vec<(QubitId, usize)> = entry.siblings(qubit).collect();
                (entry.cmd, entry.load, previous, siblings)
            };

            let own = previous + cache.command(cmd_ref).map_or(0, |cmd| costs.cost(cmd));
            let mut load = own;
            for &(sibling, position) in &siblings {
                load = load.max(cache.record(sibling)?.load_at(position)?);
            }

            if index >= forced_until && load <= current {
                break;
            }
            if let Some(entry) = cache.record_mut(qubit)?.get_mut(index) {
                entry.load = load;
            }

            for (sibling, position) in siblings {
                let record = cache.record_mut(sibling)?;
                if record.load_at(position)? < load {
                    record.set_load_at(position, load)?;
                    let next = record.index_of(position)? + 1;
                    pending.push_back((sibling, next, next));
                }
            }
        }
    }
    Ok(())
}
