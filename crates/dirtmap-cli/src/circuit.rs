//! Circuit files.
//!
//! A circuit is a JSON array of commands, for example:
//!
//! ```json
//! [
//!   {"gate": "Allocate", "qubits": [[0]]},
//!   {"gate": "AllocateDirty", "qubits": [[1]]},
//!   {"gate": "X", "controls": [0], "qubits": [[1]]},
//!   {"gate": "Deallocate", "qubits": [[1]]}
//! ]
//! ```

use dirtmap_common::types::Command;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failure to read a circuit file.
#[derive(Error, Debug)]
pub enum CircuitError {
    /// The file could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The file is not a valid command list.
    #[error("invalid circuit in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Loads the commands stored at `path`.
pub fn load(path: &Path) -> Result<Vec<Command>, CircuitError> {
    let text = std::fs::read_to_string(path).map_err(|source| CircuitError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| CircuitError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
