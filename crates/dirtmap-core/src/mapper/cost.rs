//! Cost model for load estimation.
//!
//! Maps a gate to an integer cost. Loads built from these costs only steer
//! the choice between legal remap targets; they never affect correctness.

use dirtmap_common::types::{Command, Gate, ParseGateError};
use hashbrown::HashMap;
use std::str::FromStr;

/// Key under which a parsed cost table stores its fallback cost.
pub const DEFAULT_COST_KEY: &str = "default";

/// Gate cost table with inverse lookup and a default.
#[derive(Debug, Clone)]
pub struct CostModel {
    /// Explicit per-gate costs.
    costs: HashMap<Gate, u64>,
    /// Cost for gates absent from the table.
    default_cost: u64,
}

impl CostModel {
    /// Creates an empty cost model where every gate costs 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            costs: HashMap::new(),
            default_cost: 1,
        }
    }

    /// Sets the cost of a gate.
    #[must_use]
    pub fn with_cost(mut self, gate: Gate, cost: u64) -> Self {
        self.costs.insert(gate, cost);
        self
    }

    /// Sets the fallback cost.
    #[must_use]
    pub fn with_default_cost(mut self, cost: u64) -> Self {
        self.default_cost = cost;
        self
    }

    /// Returns the fallback cost.
    pub fn default_cost(&self) -> u64 {
        self.default_cost
    }

    /// Returns the cost of a gate.
    ///
    /// Looks up the gate itself, then its inverse, then falls back to the
    /// default cost.
    pub fn gate_cost(&self, gate: &Gate) -> u64 {
        if let Some(&cost) = self.costs.get(gate) {
            return cost;
        }
        gate.inverse()
            .and_then(|inv| self.costs.get(&inv).copied())
            .unwrap_or(self.default_cost)
    }

    /// Returns the cost of a command.
    pub fn cost(&self, cmd: &Command) -> u64 {
        self.gate_cost(&cmd.gate)
    }

    /// Parses a `GATE=COST` entry and adds it to the model.
    ///
    /// The key [`DEFAULT_COST_KEY`] sets the fallback cost.
    pub fn parse_entry(&mut self, entry: &str) -> Result<(), CostParseError> {
        let (name, value) = entry
            .split_once('=')
            .ok_or_else(|| CostParseError::MissingSeparator(entry.to_string()))?;
        let cost: u64 = value
            .trim()
            .parse()
            .map_err(|_| CostParseError::InvalidCost(entry.to_string()))?;
        if name.trim() == DEFAULT_COST_KEY {
            self.default_cost = cost;
        } else {
            let gate = Gate::from_str(name)?;
            self.costs.insert(gate, cost);
        }
        Ok(())
    }
}

impl Default for CostModel {
    fn default() -> Self {
        Self::new()
    }
}

/// Error parsing a cost table entry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CostParseError {
    /// The entry has no `=`.
    #[error("expected GATE=COST, got '{0}'")]
    MissingSeparator(String),
    /// The cost is not a non-negative integer.
    #[error("invalid cost in '{0}'")]
    InvalidCost(String),
    /// The gate name is invalid.
    #[error(transparent)]
    Gate(#[from] ParseGateError),
}
