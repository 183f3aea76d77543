//! Instrument command handler

use std::path::Path;

use moduless::instrument::source_map;
use moduless::Instrumented;

use crate::commands::InstrumentArgs;
use crate::config::CliConfig;
use crate::error::{CliError, CliResult};

/// Print a bundle the way the asset server would serve it
pub fn execute_instrument(config: &CliConfig, args: &InstrumentArgs) -> CliResult<()> {
    let instrumented = instrument_file(&args.file)?;
    if config.verbosity.is_verbose() {
        eprintln!(
            "{} cover(s) in {}",
            instrumented.covers.len(),
            args.file.display()
        );
    }
    print!("{}", render_output(&instrumented, args.map)?);
    Ok(())
}

/// Read and instrument one bundle
pub fn instrument_file(path: &Path) -> CliResult<Instrumented> {
    let code = std::fs::read_to_string(path)?;
    let out_file = moduless::config::absolute(path);
    Ok(moduless::instrument(&code, &out_file)?)
}

/// The rewritten code, or its source map as JSON
pub fn render_output(instrumented: &Instrumented, map: bool) -> CliResult<String> {
    if !map {
        return Ok(instrumented.code.clone());
    }
    let Some(map) = &instrumented.source_map else {
        return Err(CliError::invalid_argument(
            "bundle declares no covers, so it is served unchanged and has no map",
        ));
    };
    let mut json = source_map::to_json(map)?;
    json.push('\n');
    Ok(json)
}
