//! Siphon CLI - Command-line interface for the Siphon harvester
//!
//! This crate ties the HTTP clients and the file sink together into the
//! `siphon` commands.

pub mod commands;
pub mod config;
pub mod records;
pub mod shutdown;

pub use commands::{run, HarvestContext};
pub use config::{Command, Config, ResearchCredentials};
