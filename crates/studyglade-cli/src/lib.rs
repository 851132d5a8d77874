//! StudyGlade command-line dashboards
//!
//! Library half of the `studyglade` binary: configuration loading, logging
//! setup and the subcommand implementations.

pub mod cli;
pub mod config;
pub mod logging;

pub use cli::{App, Cli, Command};
pub use config::{ConfigOverrides, StudyGladeConfig};
