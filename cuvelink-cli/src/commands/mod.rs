//! Command implementations.
//!
//! Each subcommand is implemented in its own module for clean separation.

pub(crate) mod actuate;
pub(crate) mod calibrate;
pub(crate) mod completions;
pub(crate) mod config;
pub(crate) mod flash;
pub(crate) mod monitor;
pub(crate) mod ports;
pub(crate) mod status;
