//! Circuit mapping command.

use std::path::Path;

use anyhow::Result;
use comfy_table::Cell;
use dirtmap_common::types::{Command, QubitId};
use dirtmap_core::engine::{CommandRecorder, Engine, WidthCounter};
use dirtmap_core::mapper::{CostModel, DirtyQubitMapper, MapperConfig};
use serde::Serialize;

use crate::OutputFormat;
use crate::circuit;
use crate::commands::width;
use crate::output::{self, Format};

/// Mapper settings taken from the command line.
#[derive(Debug, Default)]
pub struct MapOptions {
    pub cache_limit: Option<usize>,
    pub costs: Vec<String>,
    pub target: Option<u32>,
}

impl MapOptions {
    fn config(&self) -> Result<MapperConfig> {
        let mut costs = CostModel::new();
        for entry in &self.costs {
            costs.parse_entry(entry)?;
        }
        let mut config = MapperConfig::new().with_cost_model(costs);
        if let Some(limit) = self.cache_limit {
            config = config.with_cache_limit(limit);
        }
        if let Some(target) = self.target {
            config = config.with_next_target(QubitId(target));
        }
        Ok(config)
    }
}

/// Result of mapping a circuit.
#[derive(Debug, Serialize)]
pub struct MapReport {
    input_commands: usize,
    forwarded_commands: usize,
    width_before: usize,
    width_after: usize,
    remapped: usize,
    retired: usize,
    blocked: usize,
    commands: Vec<String>,
}

/// Maps `circuit`, flushing at the end.
pub fn execute(mut circuit: Vec<Command>, options: &MapOptions) -> Result<MapReport> {
    if !circuit.last().is_some_and(|cmd| cmd.gate.is_flush()) {
        circuit.push(Command::flush());
    }
    let input_commands = circuit.len();
    let before = width::measure(circuit.clone())?;

    let recorder = CommandRecorder::new();
    let forwarded = recorder.handle();
    let downstream = WidthCounter::new(Box::new(recorder));
    let after = downstream.stats_handle();
    let mut mapper = DirtyQubitMapper::new(options.config()?, Box::new(downstream));

    tracing::info!("mapping {} commands", input_commands);
    mapper.receive(circuit)?;
    let stats = mapper.stats();

    let commands: Vec<String> = forwarded.snapshot().iter().map(ToString::to_string).collect();
    let width_after = after.lock().peak;
    Ok(MapReport {
        input_commands,
        forwarded_commands: commands.len(),
        width_before: before.peak,
        width_after,
        remapped: stats.remapped,
        retired: stats.retired,
        blocked: stats.blocked,
        commands,
    })
}

/// Run the map command.
pub fn run(path: &Path, options: &MapOptions, format: OutputFormat, quiet: bool) -> Result<()> {
    let report = execute(circuit::load(path)?, options)?;

    let fmt: Format = format.into();
    match fmt {
        Format::Json => {
            if !quiet {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
        }
        Format::Table => {
            if !quiet {
                let items = vec![
                    ("Input commands", report.input_commands.to_string()),
                    ("Forwarded commands", report.forwarded_commands.to_string()),
                    ("Width before", report.width_before.to_string()),
                    ("Width after", report.width_after.to_string()),
                    ("Remapped", report.remapped.to_string()),
                    ("Retired", report.retired.to_string()),
                    ("Blocked attempts", report.blocked.to_string()),
                ];
                println!("{}", output::key_value_table(&items));

                let mut table = output::create_table();
                output::add_header(&mut table, &["#", "Command"]);
                for (i, cmd) in report.commands.iter().enumerate() {
                    table.add_row(vec![Cell::new(i), Cell::new(cmd)]);
                }
                println!("{table}");
            }
            if report.width_after < report.width_before {
                output::status(
                    &format!(
                        "Saved {} qubit(s)",
                        report.width_before - report.width_after
                    ),
                    quiet,
                );
            }
        }
    }

    Ok(())
}
