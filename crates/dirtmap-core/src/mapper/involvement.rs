//! Involvement analysis: which active qubits may stand in for a dirty qubit.
//!
//! A qubit interferes with a dirty qubit if some cached command after the
//! dirty allocation touches both, directly or through a chain of cached
//! commands that starts at one of the dirty qubit's commands. Only qubits
//! that do not interfere are legal remap targets.

use super::cache::Cache;
use dirtmap_common::types::QubitId;
use dirtmap_common::utils::error::Result;
use hashbrown::{HashMap, HashSet};
use std::collections::BTreeSet;

/// Collects every qubit reachable from `dirty`'s cached commands after its
/// allocation.
///
/// Each qubit is walked from the earliest position at which it was reached.
/// When a qubit is reached again at an earlier position, only the not yet
/// walked prefix is visited, so every cached command is inspected at most
/// once per qubit it touches.
pub(crate) fn interfering_qubits(cache: &Cache, dirty: QubitId) -> Result<HashSet<QubitId>> {
    let record = cache.record(dirty)?;
    let mut interfering = HashSet::new();
    // Earliest absolute position each qubit has been walked from.
    let mut walked: HashMap<QubitId, usize> = HashMap::new();
    // (qubit, first absolute position, end position exclusive)
    let mut pending: Vec<(QubitId, usize, Option<usize>)> = Vec::new();

    let start = record.n_sent() + 1;
    walked.insert(dirty, start);
    pending.push((dirty, start, None));

    while let Some((qubit, from, until)) = pending.pop() {
        let record = cache.record(qubit)?;
        let first = from.saturating_sub(record.n_sent());
        let last = until.map_or(record.len(), |end| end - record.n_sent());

        for index in first..last {
            let Some(entry) = record.get(index) else {
                break;
            };
            for (other, position) in entry.siblings(qubit) {
                if other == dirty {
                    continue;
                }
                interfering.insert(other);

                let next = position + 1;
                match walked.get(&other).copied() {
                    None => {
                        walked.insert(other, next);
                        pending.push((other, next, None));
                    }
                    Some(previous) if next < previous => {
                        walked.insert(other, next);
                        pending.push((other, next, Some(previous)));
                    }
                    Some(_) => {}
                }
            }
        }
    }

    Ok(interfering)
}

/// Returns the legal remap targets for `dirty`.
///
/// Candidates are all other active qubits minus the interfering ones. If
/// any of the `preferred` carriers survive, only those are returned.
pub(crate) fn legal_targets(
    cache: &Cache,
    dirty: QubitId,
    preferred: &BTreeSet<QubitId>,
) -> Result<BTreeSet<QubitId>> {
    let interfering = interfering_qubits(cache, dirty)?;
    let legal: BTreeSet<QubitId> = cache
        .active_qubits()
        .into_iter()
        .filter(|&q| q != dirty && !interfering.contains(&q))
        .collect();

    let preferred_legal: BTreeSet<QubitId> = legal.intersection(preferred).copied().collect();
    if preferred_legal.is_empty() {
        Ok(legal)
    } else {
        Ok(preferred_legal)
    }
}

/// Picks the least loaded target, smallest id first on ties.
pub(crate) fn pick_target(cache: &Cache, candidates: &BTreeSet<QubitId>) -> Option<QubitId> {
    candidates
        .iter()
        .copied()
        .filter_map(|q| cache.try_record(q).map(|r| (r.load_now(), q)))
        .min()
        .map(|(_, q)| q)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::cost::CostModel;
    use dirtmap_common::types::{Command, Gate};

    fn q(id: u32) -> QubitId {
        QubitId(id)
    }

    /// Opens `clean` qubits with forwarded allocations and `dirty` with a
    /// cached dirty allocation.
    fn setup(clean: &[u32], dirty: u32) -> (Cache, CostModel) {
        let costs = CostModel::new();
        let mut cache = Cache::new();
        cache.open(q(dirty)).unwrap();
        cache.push(Command::allocate_dirty(q(dirty)), &costs).unwrap();
        for &c in clean {
            cache.open(q(c)).unwrap();
            cache.account_uncached(&Command::allocate(q(c)), &costs).unwrap();
        }
        (cache, costs)
    }

    #[test]
    fn test_no_interaction_all_legal() {
        let (mut cache, costs) = setup(&[1, 2], 0);
        cache.push(Command::new(Gate::X, [q(0)]), &costs).unwrap();
        let legal = legal_targets(&cache, q(0), &BTreeSet::new()).unwrap();
        assert_eq!(legal, BTreeSet::from([q(1), q(2)]));
    }

    #[test]
    fn test_direct_interference() {
        let (mut cache, costs) = setup(&[1, 2], 0);
        cache
            .push(Command::controlled(Gate::X, [q(1)], q(0)), &costs)
            .unwrap();
        let legal = legal_targets(&cache, q(0), &BTreeSet::new()).unwrap();
        assert_eq!(legal, BTreeSet::from([q(2)]));
    }

    #[test]
    fn test_transitive_interference() {
        // 0 talks to 1, and afterwards 1 talks to 2: both are excluded.
        let (mut cache, costs) = setup(&[1, 2, 3], 0);
        cache
            .push(Command::controlled(Gate::X, [q(1)], q(0)), &costs)
            .unwrap();
        cache
            .push(Command::controlled(Gate::Z, [q(1)], q(2)), &costs)
            .unwrap();
        let legal = legal_targets(&cache, q(0), &BTreeSet::new()).unwrap();
        assert_eq!(legal, BTreeSet::from([q(3)]));
    }

    #[test]
    fn test_interaction_before_divergence_is_ignored() {
        // 1 talks to 2 before it touches the dirty qubit: 2 stays legal.
        let (mut cache, costs) = setup(&[1, 2], 0);
        cache
            .push(Command::controlled(Gate::Z, [q(1)], q(2)), &costs)
            .unwrap();
        cache
            .push(Command::controlled(Gate::X, [q(1)], q(0)), &costs)
            .unwrap();
        let legal = legal_targets(&cache, q(0), &BTreeSet::new()).unwrap();
        assert_eq!(legal, BTreeSet::from([q(2)]));
    }

    #[test]
    fn test_rewalk_from_earlier_position() {
        // Qubit 1 is first reached late (through 4) and then early (through
        // 2); the link 1-5 between the two positions must still be found.
        let (mut cache, costs) = setup(&[1, 2, 3, 4, 5, 6], 0);
        for cmd in [
            Command::controlled(Gate::X, [q(2)], q(0)),
            Command::controlled(Gate::X, [q(4)], q(0)),
            Command::controlled(Gate::Z, [q(2)], q(1)),
            Command::controlled(Gate::Z, [q(1)], q(5)),
            Command::controlled(Gate::Z, [q(4)], q(1)),
        ] {
            cache.push(cmd, &costs).unwrap();
        }
        let interfering = interfering_qubits(&cache, q(0)).unwrap();
        assert!(interfering.contains(&q(5)));
        let legal = legal_targets(&cache, q(0), &BTreeSet::new()).unwrap();
        assert_eq!(legal, BTreeSet::from([q(3), q(6)]));
    }

    #[test]
    fn test_preferred_restricts_choice() {
        let (cache, _) = setup(&[1, 2, 3], 0);
        let legal = legal_targets(&cache, q(0), &BTreeSet::from([q(2)])).unwrap();
        assert_eq!(legal, BTreeSet::from([q(2)]));
    }

    #[test]
    fn test_preferred_falls_back_when_illegal() {
        let (mut cache, costs) = setup(&[1, 2], 0);
        cache
            .push(Command::controlled(Gate::X, [q(2)], q(0)), &costs)
            .unwrap();
        let legal = legal_targets(&cache, q(0), &BTreeSet::from([q(2), q(9)])).unwrap();
        assert_eq!(legal, BTreeSet::from([q(1)]));
    }

    #[test]
    fn test_pick_target_lowest_load_then_id() {
        let (mut cache, costs) = setup(&[1, 2, 3], 0);
        cache.push(Command::new(Gate::H, [q(1)]), &costs).unwrap();
        let all = BTreeSet::from([q(1), q(2), q(3)]);
        assert_eq!(pick_target(&cache, &all), Some(q(2)));
        assert_eq!(pick_target(&cache, &BTreeSet::from([q(1)])), Some(q(1)));
        assert_eq!(pick_target(&cache, &BTreeSet::new()), None);
    }
}
