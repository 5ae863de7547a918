//! Arena storage for cached commands.
//!
//! A command touching several qubits is cached in every one of their
//! records. The records only hold a [`CommandRef`]; the arena owns the single
//! canonical [`Command`], so rewriting qubit ids during a remap is applied
//! once and seen by every record.

use dirtmap_common::types::Command;

/// Handle to a command stored in a [`CommandArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct CommandRef(u32);

/// Slot arena with free-list reuse.
#[derive(Debug, Default)]
pub(crate) struct CommandArena {
    slots: Vec<Option<Command>>,
    free: Vec<u32>,
}

impl CommandArena {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, cmd: Command) -> CommandRef {
        if let Some(slot) = self.free.pop() {
            self.slots[slot as usize] = Some(cmd);
            return CommandRef(slot);
        }
        let slot = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
        self.slots.push(Some(cmd));
        CommandRef(slot)
    }

    pub(crate) fn get(&self, r: CommandRef) -> Option<&Command> {
        self.slots.get(r.0 as usize).and_then(Option::as_ref)
    }

    pub(crate) fn get_mut(&mut self, r: CommandRef) -> Option<&mut Command> {
        self.slots.get_mut(r.0 as usize).and_then(Option::as_mut)
    }

    pub(crate) fn remove(&mut self, r: CommandRef) -> Option<Command> {
        let cmd = self.slots.get_mut(r.0 as usize)?.take()?;
        self.free.push(r.0);
        Some(cmd)
    }

    /// Number of live commands.
    pub(crate) fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }
}
