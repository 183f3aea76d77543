//! Moduless: cover functions for compiled script bundles
//!
//! A cover function is a top-level `function coverSomething()` in a project's
//! compiled output. Moduless finds them, instruments the bundle so each one
//! registers itself with the page-side runner, serves the bundle to a driven
//! browser and relays the verdicts back to the host.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         Host process                             │
//! │  ┌────────────┐   ┌──────────────┐   ┌────────────────────────┐  │
//! │  │ tsconfig   │──►│ ProjectGraph │──►│ instrument + reconcile │  │
//! │  │ files      │   │ + watcher    │   │ (Add/RemoveCover)      │  │
//! │  └────────────┘   └──────┬───────┘   └───────────┬────────────┘  │
//! │                          │      MessageBus       │               │
//! │                   ┌──────▼───────────────────────▼──────┐        │
//! │                   │ Tunnel: asset server · channel ·    │        │
//! │                   │ driven browser                      │        │
//! │                   └──────────────────┬──────────────────┘        │
//! └──────────────────────────────────────┼───────────────────────────┘
//!                                        │ http + ws
//!                           ┌────────────▼────────────┐
//!                           │ Page: runner + bundles  │
//!                           └─────────────────────────┘
//! ```

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]

pub mod browser;
pub mod bus;
pub mod config;
pub mod graph;
pub mod instrument;
pub mod migration;
pub mod preferences;
pub mod project;
pub mod protocol;
pub mod report;
pub mod result;
pub mod tunnel;
pub mod watch;

pub use browser::{default_launcher, BrowserLauncher, DrivenBrowser, KeyChord, LaunchOptions};
#[cfg(feature = "browser")]
pub use browser::ChromiumLauncher;
pub use bus::MessageBus;
pub use config::{ProjectConfig, ScriptKind, ScriptReference};
pub use graph::ProjectGraph;
pub use instrument::{instrument, CoverFunctionRecord, Instrumented, SourcePosition};
pub use migration::{reconcile, Insertion, MigrationSteps};
pub use preferences::{PreferenceKey, Preferences};
pub use project::{Project, ProjectId, ProjectPhase};
pub use protocol::{
    AddCoverMessage, EndCoverMessage, ExecuteVoidMessage, Message, MessageKind, MessageType,
    ReloadMessage, RemoveCoverMessage, SelectCoverMessage, StartCompleteCoverageMessage,
    StartCoverMessage, Value, VerificationResult, VoidResultMessage, WindowMetricsMessage,
};
pub use report::{format_end_cover, Outcome, Summary};
pub use result::{ModulessError, ModulessResult};
pub use tunnel::{SharedPreferences, Tunnel, TunnelConfig, TunnelHandle};
pub use watch::{ProjectWatcher, WatchConfig};
