//! Circuit width tracking.

use super::Engine;
use dirtmap_common::types::Command;
use dirtmap_common::utils::error::Result;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

/// Qubit usage observed by a [`WidthCounter`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WidthStats {
    /// Qubits allocated right now.
    pub current: usize,
    /// Most qubits alive at once.
    pub peak: usize,
    /// Allocations seen.
    pub allocations: usize,
    /// Deallocations seen.
    pub deallocations: usize,
    /// Commands seen that are neither allocations, deallocations nor flushes.
    pub gates: usize,
}

impl WidthStats {
    fn observe(&mut self, cmd: &Command) {
        if cmd.gate.is_allocation() {
            let n = cmd.qubit_ids().len();
            self.allocations += n;
            self.current += n;
            self.peak = self.peak.max(self.current);
        } else if cmd.gate.is_deallocation() {
            let n = cmd.qubit_ids().len();
            self.deallocations += n;
            self.current = self.current.saturating_sub(n);
        } else if !cmd.gate.is_flush() {
            self.gates += 1;
        }
    }
}

/// Pass-through stage that counts live qubits.
///
/// Without a successor it acts as a sink.
pub struct WidthCounter {
    next: Option<Box<dyn Engine>>,
    stats: Arc<Mutex<WidthStats>>,
}

impl WidthCounter {
    /// Creates a counter forwarding to `next`.
    pub fn new(next: Box<dyn Engine>) -> Self {
        Self {
            next: Some(next),
            stats: Arc::default(),
        }
    }

    /// Creates a terminal counter.
    #[must_use]
    pub fn sink() -> Self {
        Self {
            next: None,
            stats: Arc::default(),
        }
    }

    /// Returns a shared handle to the running statistics.
    #[must_use]
    pub fn stats_handle(&self) -> Arc<Mutex<WidthStats>> {
        Arc::clone(&self.stats)
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> WidthStats {
        *self.stats.lock()
    }
}

impl Engine for WidthCounter {
    fn receive(&mut self, commands: Vec<Command>) -> Result<()> {
        {
            let mut stats = self.stats.lock();
            for cmd in &commands {
                stats.observe(cmd);
            }
        }
        match self.next.as_mut() {
            Some(next) => next.receive(commands),
            None => Ok(()),
        }
    }

    fn name(&self) -> &'static str {
        "WidthCounter"
    }
}
