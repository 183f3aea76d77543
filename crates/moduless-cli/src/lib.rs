//! Moduless CLI Library
//!
//! Command-line host for Moduless: lists the covers of a workspace, prints
//! instrumented bundles, runs covers in a driven browser and serves projects
//! while their output is rebuilt.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::format_push_string)] // String building is clear and correct
#![allow(clippy::missing_errors_doc)] // Error types are self-documenting

mod commands;
mod config;
mod error;
pub mod handlers;

pub use commands::{
    Cli, ColorArg, Commands, FlagKey, InstrumentArgs, ListArgs, PrefsAction, PrefsArgs, RunArgs,
    ServeArgs, TunnelArgs,
};
pub use config::{CliConfig, ColorChoice, Verbosity};
pub use error::{CliError, CliResult};
