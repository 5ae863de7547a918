//! Gate catalogue.
//!
//! A [`Gate`] is the identity of an operation. The mapper never interprets a
//! gate's action; it only needs to tell the lifetime gates (allocation,
//! deallocation), the barrier, and fast-forwarding gates apart from ordinary
//! ones, and to find a gate's inverse for cost lookups.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use thiserror::Error;

/// A rotation angle in radians.
///
/// Compared and hashed by bit pattern so gates can key cost tables. Negative
/// zero is folded into positive zero.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Angle(f64);

impl Angle {
    /// Creates an angle from radians.
    #[must_use]
    pub fn new(radians: f64) -> Self {
        if radians == 0.0 {
            Self(0.0)
        } else {
            Self(radians)
        }
    }

    /// Returns the angle in radians.
    #[must_use]
    pub fn radians(self) -> f64 {
        self.0
    }

    /// Returns the negated angle.
    #[must_use]
    pub fn negated(self) -> Self {
        Self::new(-self.0)
    }
}

impl PartialEq for Angle {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for Angle {}

impl Hash for Angle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

/// The identity of an operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gate {
    /// Qubit allocation. Dirty when the command carries a dirty tag.
    Allocate,
    /// Allocation of a dirty qubit, independent of tags.
    AllocateDirty,
    /// Qubit deallocation.
    Deallocate,
    /// Barrier: forces every buffered command downstream.
    Flush,
    /// Measurement in the computational basis.
    Measure,
    /// Pauli X.
    X,
    /// Pauli Y.
    Y,
    /// Pauli Z.
    Z,
    /// Hadamard.
    H,
    /// Phase gate.
    S,
    /// Inverse phase gate.
    Sdag,
    /// T gate.
    T,
    /// Inverse T gate.
    Tdag,
    /// Swap of two qubits.
    Swap,
    /// Rotation around X.
    Rx(Angle),
    /// Rotation around Y.
    Ry(Angle),
    /// Rotation around Z.
    Rz(Angle),
    /// Global phase shift.
    Ph(Angle),
    /// Any other named gate. Has no known inverse.
    Custom(String),
}

impl Gate {
    /// Returns true for either allocation gate.
    #[must_use]
    pub fn is_allocation(&self) -> bool {
        matches!(self, Gate::Allocate | Gate::AllocateDirty)
    }

    /// Returns true for the deallocation gate.
    #[must_use]
    pub fn is_deallocation(&self) -> bool {
        matches!(self, Gate::Deallocate)
    }

    /// Returns true for the barrier gate.
    #[must_use]
    pub fn is_flush(&self) -> bool {
        matches!(self, Gate::Flush)
    }

    /// Returns true if the gate's result must become observable promptly.
    ///
    /// Allocation and deallocation are not reported here: their caching is
    /// governed by the qubit lifetime rules instead.
    #[must_use]
    pub fn is_fast_forwarding(&self) -> bool {
        matches!(self, Gate::Measure)
    }

    /// Returns the inverse gate, if the gate is invertible.
    #[must_use]
    pub fn inverse(&self) -> Option<Gate> {
        match self {
            Gate::X | Gate::Y | Gate::Z | Gate::H | Gate::Swap => Some(self.clone()),
            Gate::S => Some(Gate::Sdag),
            Gate::Sdag => Some(Gate::S),
            Gate::T => Some(Gate::Tdag),
            Gate::Tdag => Some(Gate::T),
            Gate::Rx(a) => Some(Gate::Rx(a.negated())),
            Gate::Ry(a) => Some(Gate::Ry(a.negated())),
            Gate::Rz(a) => Some(Gate::Rz(a.negated())),
            Gate::Ph(a) => Some(Gate::Ph(a.negated())),
            Gate::Allocate
            | Gate::AllocateDirty
            | Gate::Deallocate
            | Gate::Flush
            | Gate::Measure
            | Gate::Custom(_) => None,
        }
    }
}

impl fmt::Display for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gate::Allocate => f.write_str("Allocate"),
            Gate::AllocateDirty => f.write_str("AllocateDirty"),
            Gate::Deallocate => f.write_str("Deallocate"),
            Gate::Flush => f.write_str("Flush"),
            Gate::Measure => f.write_str("Measure"),
            Gate::X => f.write_str("X"),
            Gate::Y => f.write_str("Y"),
            Gate::Z => f.write_str("Z"),
            Gate::H => f.write_str("H"),
            Gate::S => f.write_str("S"),
            Gate::Sdag => f.write_str("Sdag"),
            Gate::T => f.write_str("T"),
            Gate::Tdag => f.write_str("Tdag"),
            Gate::Swap => f.write_str("Swap"),
            Gate::Rx(a) => write!(f, "Rx({})", a.radians()),
            Gate::Ry(a) => write!(f, "Ry({})", a.radians()),
            Gate::Rz(a) => write!(f, "Rz({})", a.radians()),
            Gate::Ph(a) => write!(f, "Ph({})", a.radians()),
            Gate::Custom(name) => f.write_str(name),
        }
    }
}

/// Error returned when a gate name cannot be parsed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseGateError {
    /// The input was empty.
    #[error("empty gate name")]
    Empty,
    /// A rotation parameter could not be parsed as a number.
    #[error("invalid angle in gate '{0}'")]
    InvalidAngle(String),
    /// The name is malformed.
    #[error("malformed gate name '{0}'")]
    Malformed(String),
}

impl FromStr for Gate {
    type Err = ParseGateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ParseGateError::Empty);
        }

        if let Some(open) = s.find('(') {
            let Some(inner) = s[open + 1..].strip_suffix(')') else {
                return Err(ParseGateError::Malformed(s.to_string()));
            };
            let radians: f64 = inner
                .trim()
                .parse()
                .map_err(|_| ParseGateError::InvalidAngle(s.to_string()))?;
            let angle = Angle::new(radians);
            return match &s[..open] {
                "Rx" => Ok(Gate::Rx(angle)),
                "Ry" => Ok(Gate::Ry(angle)),
                "Rz" => Ok(Gate::Rz(angle)),
                "Ph" => Ok(Gate::Ph(angle)),
                _ => Err(ParseGateError::Malformed(s.to_string())),
            };
        }

        let gate = match s {
            "Allocate" => Gate::Allocate,
            "AllocateDirty" => Gate::AllocateDirty,
            "Deallocate" => Gate::Deallocate,
            "Flush" => Gate::Flush,
            "Measure" => Gate::Measure,
            "X" => Gate::X,
            "Y" => Gate::Y,
            "Z" => Gate::Z,
            "H" => Gate::H,
            "S" => Gate::S,
            "Sdag" => Gate::Sdag,
            "T" => Gate::T,
            "Tdag" => Gate::Tdag,
            "Swap" => Gate::Swap,
            other => {
                if other.chars().all(|c| c.is_alphanumeric() || c == '_') {
                    Gate::Custom(other.to_string())
                } else {
                    return Err(ParseGateError::Malformed(other.to_string()));
                }
            }
        };
        Ok(gate)
    }
}
