//! Moduless CLI: run cover functions from the command line
//!
//! ## Usage
//!
//! ```bash
//! moduless list                      # Covers of every project in .
//! moduless run build/out.js coverA   # Run one cover
//! moduless run . --all               # Run every cover of the project
//! moduless serve --show              # Serve, watch and keep a browser open
//! moduless instrument build/out.js   # Print the served bundle
//! ```

use std::process::ExitCode;

use clap::Parser;
use moduless_cli::{handlers, Cli, CliConfig, CliResult, ColorChoice, Commands, Verbosity};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();

    // Build configuration from CLI args
    let config = build_config(&cli);
    config.apply_color();
    init_tracing(&config);

    match cli.command {
        Commands::List(args) => handlers::execute_list(&config, &args),
        Commands::Run(args) => handlers::execute_run(&config, &args),
        Commands::Serve(args) => handlers::execute_serve(&config, &args),
        Commands::Instrument(args) => handlers::execute_instrument(&config, &args),
        Commands::Prefs(args) => handlers::execute_prefs(&config, &args),
    }
}

fn build_config(cli: &Cli) -> CliConfig {
    let verbosity = if cli.quiet {
        Verbosity::Quiet
    } else {
        match cli.verbose {
            0 => Verbosity::Normal,
            1 => Verbosity::Verbose,
            _ => Verbosity::Debug,
        }
    };

    let color: ColorChoice = cli.color.clone().into();

    CliConfig::new()
        .with_verbosity(verbosity)
        .with_color(color)
        .with_storage_dir(cli.storage_dir.clone())
}

/// `RUST_LOG` wins; otherwise the filter follows -v / -q
fn init_tracing(config: &CliConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.verbosity.filter_directive()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(config.verbosity.is_debug())
        .with_ansi(config.color.should_color())
        .try_init();
}
