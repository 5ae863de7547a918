//! # dirtmap-core
//!
//! Core layer for Dirtmap: the dirty-qubit mapper and the pipeline stages
//! around it.
//!
//! This crate depends only on `dirtmap-common`.
//!
//! ## Modules
//!
//! - [`engine`] - The `Engine` stage trait, recorder, width counter and carrier sections
//! - [`mapper`] - Dependency cache, involvement analysis, remapping and forwarding

pub mod engine;
pub mod mapper;

// Re-export commonly used types
pub use engine::{CarrierIndicator, CommandRecorder, Engine, RecordedCommands, WidthCounter, WidthStats};
pub use mapper::{CostModel, DependencyRecord, DirtyQubitMapper, MapperConfig, MapperStats, RemapOutcome};
