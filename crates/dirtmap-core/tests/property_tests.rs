//! Property-based tests for the dirty-qubit mapper.
//!
//! Key invariants:
//! - Circuits without dirty qubits pass through unchanged
//! - No gate is lost or duplicated
//! - Downstream only ever touches allocated qubits
//! - Each qubit lifetime's gates keep their arrival order
//! - A final flush leaves nothing cached

use dirtmap_common::types::{Command, Gate, QubitId};
use dirtmap_core::engine::{CommandRecorder, Engine};
use dirtmap_core::mapper::{DirtyQubitMapper, MapperConfig};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

const POOL: u32 = 10;

/// One generated step; invalid steps for the current state are skipped.
#[derive(Debug, Clone, Copy)]
enum Step {
    Allocate(u32),
    AllocateDirty(u32),
    Single(u8, u32),
    Controlled(u32, u32),
    Measure(u32),
    Deallocate(u32),
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        3 => (0..POOL).prop_map(Step::Allocate),
        2 => (0..POOL).prop_map(Step::AllocateDirty),
        4 => (0u8..4, 0..POOL).prop_map(|(g, t)| Step::Single(g, t)),
        4 => (0..POOL, 0..POOL).prop_map(|(c, t)| Step::Controlled(c, t)),
        1 => (0..POOL).prop_map(Step::Measure),
        2 => (0..POOL).prop_map(Step::Deallocate),
    ]
}

fn clean_step() -> impl Strategy<Value = Step> {
    step().prop_map(|s| match s {
        Step::AllocateDirty(id) => Step::Allocate(id),
        other => other,
    })
}

/// A generated circuit plus, for every qubit lifetime, the labels of the
/// gates it saw in arrival order.
struct Circuit {
    commands: Vec<Command>,
    lifetimes: Vec<Vec<String>>,
}

/// Turns steps into a valid circuit ending with every qubit deallocated and
/// a flush. Ids are reused after deallocation, and every single-qubit and
/// controlled gate carries a unique label.
fn build(steps: &[Step]) -> Circuit {
    let mut alive: BTreeMap<u32, usize> = BTreeMap::new();
    let mut lifetimes: Vec<Vec<String>> = Vec::new();
    let mut commands = Vec::new();
    let mut next_label = 0usize;
    let mut label = |lifetimes: &mut Vec<Vec<String>>, prefix: &str, owners: &[usize]| {
        let name = format!("{prefix}{next_label}");
        next_label += 1;
        for &owner in owners {
            lifetimes[owner].push(name.clone());
        }
        name
    };

    for s in steps {
        match *s {
            Step::Allocate(id) | Step::AllocateDirty(id) if !alive.contains_key(&id) => {
                alive.insert(id, lifetimes.len());
                lifetimes.push(Vec::new());
                commands.push(if matches!(s, Step::AllocateDirty(_)) {
                    Command::allocate_dirty(QubitId(id))
                } else {
                    Command::allocate(QubitId(id))
                });
            }
            Step::Single(g, id) if alive.contains_key(&id) => {
                let prefix = ["X", "H", "T", "S"][usize::from(g)];
                let name = label(&mut lifetimes, prefix, &[alive[&id]]);
                commands.push(Command::new(Gate::Custom(name), [QubitId(id)]));
            }
            Step::Controlled(c, t) if c != t && alive.contains_key(&c) && alive.contains_key(&t) => {
                let name = label(&mut lifetimes, "X", &[alive[&c], alive[&t]]);
                commands.push(Command::controlled(
                    Gate::Custom(name),
                    [QubitId(c)],
                    QubitId(t),
                ));
            }
            Step::Measure(id) if alive.contains_key(&id) => {
                commands.push(Command::new(Gate::Measure, [QubitId(id)]));
            }
            Step::Deallocate(id) if alive.contains_key(&id) => {
                alive.remove(&id);
                commands.push(Command::deallocate(QubitId(id)));
            }
            _ => {}
        }
    }
    for &id in alive.keys() {
        commands.push(Command::deallocate(QubitId(id)));
    }
    commands.push(Command::flush());
    Circuit {
        commands,
        lifetimes,
    }
}

fn run(circuit: &[Command], cache_limit: usize) -> (Vec<Command>, DirtyQubitMapper) {
    let recorder = CommandRecorder::new();
    let handle = recorder.handle();
    let mut mapper = DirtyQubitMapper::new(
        MapperConfig::new().with_cache_limit(cache_limit),
        Box::new(recorder),
    );
    // Split into a few batches to exercise batch boundaries.
    for chunk in circuit.chunks(5) {
        mapper.receive(chunk.to_vec()).unwrap();
    }
    (handle.snapshot(), mapper)
}

fn gate_multiset(commands: &[Command]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for cmd in commands {
        if cmd.gate.is_allocation() || cmd.gate.is_deallocation() || cmd.gate.is_flush() {
            continue;
        }
        *counts.entry(format!("{}/{}", cmd.gate, cmd.controls.len())).or_insert(0) += 1;
    }
    counts
}

proptest! {
    /// Without dirty qubits nothing is ever held back.
    #[test]
    fn clean_circuits_pass_through(
        steps in prop::collection::vec(clean_step(), 0..60),
        limit in 1usize..8,
    ) {
        let circuit = build(&steps);
        let (out, _) = run(&circuit.commands, limit);
        prop_assert_eq!(out, circuit.commands);
    }

    /// Every gate arrives downstream exactly once.
    #[test]
    fn gates_are_conserved(
        steps in prop::collection::vec(step(), 0..80),
        limit in 1usize..8,
    ) {
        let circuit = build(&steps);
        let (out, mapper) = run(&circuit.commands, limit);
        prop_assert_eq!(gate_multiset(&out), gate_multiset(&circuit.commands));
        prop_assert_eq!(mapper.cached_commands(), 0);
        prop_assert!(mapper.active_qubits().is_empty());
        prop_assert!(mapper.check_invariants().is_ok());
    }

    /// Downstream never uses a qubit outside its lifetime.
    #[test]
    fn output_is_well_formed(
        steps in prop::collection::vec(step(), 0..80),
        limit in 1usize..8,
    ) {
        let circuit = build(&steps);
        let (out, _) = run(&circuit.commands, limit);
        let mut alive: BTreeSet<QubitId> = BTreeSet::new();
        for cmd in &out {
            let ids = cmd.qubit_ids();
            if cmd.gate.is_allocation() {
                for q in ids {
                    prop_assert!(alive.insert(q), "{} allocated twice", q);
                }
            } else {
                for &q in &ids {
                    prop_assert!(alive.contains(&q), "{} used while not allocated", q);
                }
                if cmd.gate.is_deallocation() {
                    for q in ids {
                        alive.remove(&q);
                    }
                }
            }
        }
        prop_assert!(alive.is_empty());
        prop_assert_eq!(out.last().map(|c| c.gate.clone()), Some(Gate::Flush));
    }

    /// The gates of every qubit lifetime reach downstream in arrival order,
    /// whichever qubit they end up on.
    #[test]
    fn per_lifetime_order_is_preserved(
        steps in prop::collection::vec(step(), 0..80),
        limit in 1usize..8,
    ) {
        let circuit = build(&steps);
        let (out, _) = run(&circuit.commands, limit);
        let emitted: BTreeMap<String, usize> = out
            .iter()
            .enumerate()
            .filter_map(|(at, cmd)| match &cmd.gate {
                Gate::Custom(name) => Some((name.clone(), at)),
                _ => None,
            })
            .collect();

        for labels in &circuit.lifetimes {
            let mut last = None;
            for name in labels {
                let at = emitted.get(name).copied();
                prop_assert!(at.is_some(), "{} never forwarded", name);
                prop_assert!(at > last, "{} forwarded out of order", name);
                last = at;
            }
        }
    }
}
