//! # dirtmap-common
//!
//! Foundation layer for Dirtmap: identifiers, the command model, and errors.
//!
//! This crate provides the vocabulary shared by the mapper and every stage
//! around it. It has no internal dependencies and should be kept minimal.
//!
//! ## Modules
//!
//! - [`types`] - Core type definitions (QubitId, Gate, Command, Tag)
//! - [`utils`] - Utility functions and helpers (errors)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod types;
pub mod utils;

// Re-export commonly used types at crate root
pub use types::{Angle, Command, DirtyQubitTag, Gate, QubitId, Tag};
pub use utils::error::{Error, InvariantError, ProtocolError, Result};
