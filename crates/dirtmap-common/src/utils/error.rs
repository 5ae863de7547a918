//! Error types for Dirtmap.
//!
//! Two kinds are kept apart so callers can match on them:
//! [`ProtocolError`] reports caller misuse and is safe to catch, while
//! [`InvariantError`] reports corrupted mapper bookkeeping and must not be
//! absorbed.

use crate::types::{Gate, QubitId};
use thiserror::Error;

/// Result type alias for Dirtmap operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The caller violated the command protocol.
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolError),
    /// Internal bookkeeping is inconsistent.
    #[error("internal invariant violated: {0}")]
    Invariant(#[from] InvariantError),
}

impl Error {
    /// Returns true for caller-side protocol violations.
    #[must_use]
    pub fn is_protocol(&self) -> bool {
        matches!(self, Error::Protocol(_))
    }

    /// Returns true for internal invariant failures.
    #[must_use]
    pub fn is_invariant(&self) -> bool {
        matches!(self, Error::Invariant(_))
    }
}

/// Caller misuse of the command protocol.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A command referenced a qubit that is not allocated.
    #[error("{gate} on qubit {qubit}, which is not allocated")]
    UnknownQubit {
        /// The offending qubit.
        qubit: QubitId,
        /// The gate of the offending command.
        gate: Gate,
    },
    /// An allocation reused an id that is still active.
    #[error("qubit {qubit} allocated twice")]
    AlreadyAllocated {
        /// The offending qubit.
        qubit: QubitId,
    },
    /// The manual remap target is not an active qubit.
    #[error("manual remap target {qubit} is not active")]
    InactiveTarget {
        /// The requested target.
        qubit: QubitId,
    },
    /// The manual remap target interacts with the dirty qubit it should carry.
    #[error("manual remap target {target} interacts with dirty qubit {dirty}")]
    InvolvedTarget {
        /// The requested target.
        target: QubitId,
        /// The dirty qubit being remapped.
        dirty: QubitId,
    },
    /// A carrier section ended while dirty qubits it opened were still allocated.
    #[error("carrier section closed with dirty qubits still allocated: {qubits:?}")]
    UnclosedCarrierScope {
        /// Dirty qubits still allocated.
        qubits: Vec<QubitId>,
    },
}

/// Internal bookkeeping failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvariantError {
    /// The parallel fields of a cached entry disagree in length.
    #[error("record {qubit}: entry {index} has {ids} involved ids but {positions} positions")]
    FieldParity {
        /// Record owner.
        qubit: QubitId,
        /// Buffer index of the entry.
        index: usize,
        /// Number of involved ids.
        ids: usize,
        /// Number of positions.
        positions: usize,
    },
    /// A load value decreased along a record.
    #[error("record {qubit}: load decreased at entry {index} ({previous} -> {current})")]
    LoadDecreased {
        /// Record owner.
        qubit: QubitId,
        /// Buffer index of the entry.
        index: usize,
        /// Load before the entry.
        previous: u64,
        /// Load at the entry.
        current: u64,
    },
    /// A record was retired while commands were still cached on it.
    #[error("record {qubit} retired with {remaining} cached commands")]
    NonEmptyOnRetire {
        /// Record owner.
        qubit: QubitId,
        /// Number of commands still cached.
        remaining: usize,
    },
    /// An absolute position lies outside the cached window of a record.
    #[error("record {qubit}: position {position} outside cached range {start}..{end}")]
    PositionOutOfRange {
        /// Record owner.
        qubit: QubitId,
        /// Requested absolute position.
        position: usize,
        /// First cached absolute position.
        start: usize,
        /// One past the last cached absolute position.
        end: usize,
    },
    /// The head of a record is not the command being forwarded.
    #[error("record {qubit}: head does not match forwarded command {command}")]
    OrderMismatch {
        /// Record owner.
        qubit: QubitId,
        /// Display form of the forwarded command.
        command: String,
    },
    /// A remap was attempted on a record that does not span a full lifetime.
    #[error("record {qubit} does not span a full dirty lifetime")]
    NotFullLifetime {
        /// Record owner.
        qubit: QubitId,
    },
    /// A record expected to exist is missing.
    #[error("no record for qubit {qubit}")]
    MissingRecord {
        /// The missing qubit.
        qubit: QubitId,
    },
    /// Recursive forwarding exceeded its depth ceiling.
    #[error("forwarding recursion exceeded depth {limit} at qubit {qubit}")]
    RecursionLimit {
        /// Qubit being forwarded when the ceiling was hit.
        qubit: QubitId,
        /// The ceiling.
        limit: usize,
    },
}
