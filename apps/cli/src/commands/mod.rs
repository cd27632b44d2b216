//! Command implementations for the frcnn CLI.

pub mod bootstrap;
pub mod local;
pub mod status;
pub mod train;
pub mod types;
