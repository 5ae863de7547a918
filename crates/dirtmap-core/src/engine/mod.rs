//! Pipeline stages.
//!
//! A pipeline is a chain of [`Engine`]s. Each stage receives ordered batches
//! of commands, does its work, and hands the result to the next stage it
//! owns. Stages compose by wrapping a boxed successor:
//!
//! - [`CommandRecorder`] - terminal sink that keeps everything it receives
//! - [`WidthCounter`] - pass-through that tracks how many qubits are alive
//! - [`CarrierIndicator`] - section-scoped preferred-carrier annotation
//!
//! The dirty-qubit mapper itself lives in [`crate::mapper`].

mod carrier;
mod width;

pub use carrier::CarrierIndicator;
pub use width::{WidthCounter, WidthStats};

use dirtmap_common::types::Command;
use dirtmap_common::utils::error::Result;
use parking_lot::Mutex;
use std::sync::Arc;

/// A stage in a command pipeline.
pub trait Engine {
    /// Processes a batch of commands, in order.
    ///
    /// # Errors
    ///
    /// Returns an error if a command violates the protocol or the stage's
    /// internal state is inconsistent. The batch is abandoned at that point.
    fn receive(&mut self, commands: Vec<Command>) -> Result<()>;

    /// Returns the name of this stage for debugging.
    fn name(&self) -> &'static str;
}

impl<E: Engine + ?Sized> Engine for Box<E> {
    fn receive(&mut self, commands: Vec<Command>) -> Result<()> {
        (**self).receive(commands)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// Shared view of the commands a [`CommandRecorder`] has received.
#[derive(Debug, Clone, Default)]
pub struct RecordedCommands {
    inner: Arc<Mutex<Vec<Command>>>,
}

impl RecordedCommands {
    /// Returns a copy of everything received so far.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Command> {
        self.inner.lock().clone()
    }

    /// Number of commands received so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Returns true if nothing was received.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Drops everything received so far.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}

/// Terminal stage that records every command it receives.
#[derive(Debug, Default)]
pub struct CommandRecorder {
    received: RecordedCommands,
}

impl CommandRecorder {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a handle that stays valid after the recorder is moved into a
    /// pipeline.
    #[must_use]
    pub fn handle(&self) -> RecordedCommands {
        self.received.clone()
    }
}

impl Engine for CommandRecorder {
    fn receive(&mut self, commands: Vec<Command>) -> Result<()> {
        self.received.inner.lock().extend(commands);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "CommandRecorder"
    }
}
