//! CLI command definitions

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Moduless: run cover functions of compiled script bundles in a driven browser
#[derive(Parser, Debug)]
#[command(name = "moduless")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only print errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Preference storage directory (defaults to the platform data directory)
    #[arg(long, global = true, env = "MODULESS_STORAGE_DIR")]
    pub storage_dir: Option<PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List projects and their cover functions
    List(ListArgs),

    /// Run covers in a driven browser and report the results
    Run(RunArgs),

    /// Serve projects, watch their output and keep a browser attached
    Serve(ServeArgs),

    /// Print the instrumented form of a bundle
    Instrument(InstrumentArgs),

    /// Show or change stored preferences
    Prefs(PrefsArgs),
}

/// Arguments for the list command
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Workspace directory or config file
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Show where each cover is declared
    #[arg(short, long)]
    pub positions: bool,
}

/// Browser and port options shared by `run` and `serve`
#[derive(Args, Debug, Clone)]
pub struct TunnelArgs {
    /// Asset server port (0 picks a free port)
    #[arg(long, default_value = "0")]
    pub http_port: u16,

    /// Channel server port (0 picks a free port)
    #[arg(long, default_value = "0")]
    pub ws_port: u16,

    /// Show the browser window (overrides the stored preference)
    #[arg(long)]
    pub show: bool,

    /// Open the inspector panel (overrides the stored preference)
    #[arg(long)]
    pub devtools: bool,

    /// Browser executable
    #[arg(long)]
    pub browser: Option<PathBuf>,

    /// Disable the browser sandbox (needed in some containers)
    #[arg(long)]
    pub no_sandbox: bool,

    /// Seconds to wait for the page to connect
    #[arg(long, default_value = "10")]
    pub connect_timeout: u64,

    /// Directory for baseline and actual snapshots
    #[arg(long)]
    pub captures: Option<PathBuf>,
}

/// Arguments for the run command
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Output file, config file or directory of the project
    pub path: PathBuf,

    /// Cover function to run
    #[arg(required_unless_present = "all", conflicts_with = "all")]
    pub cover: Option<String>,

    /// Run every cover of the project and its references
    #[arg(short, long)]
    pub all: bool,

    /// Seconds to wait for all reports
    #[arg(long, default_value = "60")]
    pub timeout: u64,

    /// Tunnel options
    #[command(flatten)]
    pub tunnel: TunnelArgs,
}

/// Arguments for the serve command
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Workspace directory or config file
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Start the last selected cover once serving
    #[arg(long)]
    pub resume: bool,

    /// Rebuild debounce in milliseconds
    #[arg(long, default_value = "100")]
    pub debounce: u64,

    /// Tunnel options
    #[command(flatten)]
    pub tunnel: TunnelArgs,
}

/// Arguments for the instrument command
#[derive(Args, Debug)]
pub struct InstrumentArgs {
    /// Bundle to instrument
    pub file: PathBuf,

    /// Print the source map instead of the code
    #[arg(long)]
    pub map: bool,
}

/// Arguments for the prefs command
#[derive(Args, Debug)]
pub struct PrefsArgs {
    /// Action to take
    #[command(subcommand)]
    pub action: Option<PrefsAction>,
}

/// Preference actions
#[derive(Subcommand, Debug)]
pub enum PrefsAction {
    /// Print every stored preference (default)
    Show,

    /// Set a flag preference
    Set {
        /// Flag to set
        key: FlagKey,
        /// New value
        #[arg(action = clap::ArgAction::Set)]
        value: bool,
    },

    /// Delete every stored preference
    Clear,
}

/// Settable flag preferences
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlagKey {
    /// Launch the browser windowed
    BrowserShown,
    /// Open the inspector panel on launch
    DevtoolsShown,
}

/// Color argument for CLI
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum ColorArg {
    /// Automatic color detection
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for crate::config::ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}
