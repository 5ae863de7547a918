//! Circuit width command.

use std::path::Path;

use anyhow::Result;
use dirtmap_core::engine::{Engine, WidthCounter, WidthStats};

use crate::OutputFormat;
use crate::circuit;
use crate::output::{self, Format};

/// Counts qubit usage in `circuit` without mapping it.
pub fn measure(circuit: Vec<dirtmap_common::Command>) -> Result<WidthStats> {
    let mut counter = WidthCounter::sink();
    counter.receive(circuit)?;
    Ok(counter.stats())
}

/// Run the width command.
pub fn run(path: &Path, format: OutputFormat, quiet: bool) -> Result<()> {
    let stats = measure(circuit::load(path)?)?;

    let fmt: Format = format.into();
    if quiet {
        return Ok(());
    }
    match fmt {
        Format::Json => {
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Format::Table => {
            let items = vec![
                ("Peak width", stats.peak.to_string()),
                ("Still allocated", stats.current.to_string()),
                ("Allocations", stats.allocations.to_string()),
                ("Deallocations", stats.deallocations.to_string()),
                ("Gates", stats.gates.to_string()),
            ];
            println!("{}", output::key_value_table(&items));
        }
    }
    Ok(())
}
