//! Core type definitions for Dirtmap.
//!
//! This module contains the fundamental types flowing through a pipeline:
//! - Identifier types ([`QubitId`])
//! - Operation types ([`Gate`], [`Angle`])
//! - The command envelope ([`Command`]) and its annotations ([`Tag`], [`DirtyQubitTag`])

mod command;
mod gate;
mod id;
mod tag;

pub use command::{Command, QubitGroup};
pub use gate::{Angle, Gate, ParseGateError};
pub use id::QubitId;
pub use tag::{DirtyQubitTag, Tag};
