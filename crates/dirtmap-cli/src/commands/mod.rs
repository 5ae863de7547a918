//! CLI command implementations.

pub mod map;
pub mod width;
