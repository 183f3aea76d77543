//! Serve command handler

use std::sync::Arc;

use console::style;
use moduless::{
    AddCoverMessage, EndCoverMessage, MessageBus, Preferences, ProjectGraph, ProjectWatcher,
    RemoveCoverMessage, SelectCoverMessage, StartCoverMessage, Tunnel, TunnelHandle, WatchConfig,
};

use super::{load_graph, owner_of, render_end_cover, runtime, shared_preferences, tunnel_config};
use crate::commands::ServeArgs;
use crate::config::CliConfig;
use crate::error::{CliError, CliResult};

/// Serve every project, keep their covers current and print reports until
/// interrupted
pub fn execute_serve(config: &CliConfig, args: &ServeArgs) -> CliResult<()> {
    let graph = Arc::new(load_graph(&args.path)?);
    let preferences = shared_preferences(config.storage_dir())?;
    let resume = args
        .resume
        .then(|| last_selection(&preferences.lock().unwrap_or_else(std::sync::PoisonError::into_inner)))
        .flatten();
    let launcher = moduless::default_launcher();
    if launcher.is_none() && !config.verbosity.is_quiet() {
        eprintln!("Browser support is disabled; open the document URLs below by hand.");
    }

    let rt = runtime()?;
    rt.block_on(async {
        let bus = MessageBus::new();
        report_events(&bus, &graph, config);

        let mut handle = Tunnel::start(
            graph.clone(),
            bus.clone(),
            preferences,
            launcher,
            tunnel_config(&args.tunnel),
        )
        .await?;
        let mut watcher = ProjectWatcher::start(&graph, &bus, WatchConfig::new().with_debounce(args.debounce))?;

        if !config.verbosity.is_quiet() {
            print!("{}", render_banner(&graph, &handle));
        }
        if let Some(selection) = resume {
            bus.emit(StartCoverMessage::new(
                selection.containing_file,
                selection.cover_function_name,
            ));
        }

        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutting down");
        watcher.stop();
        handle.stop().await;
        Ok::<_, CliError>(())
    })
}

/// Stored selection to restart with
#[must_use]
pub fn last_selection(preferences: &Preferences) -> Option<SelectCoverMessage> {
    preferences.selected_cover.clone()
}

fn report_events(bus: &MessageBus, graph: &Arc<ProjectGraph>, config: &CliConfig) {
    let verbosity = config.verbosity;
    if verbosity.is_verbose() {
        bus.listen::<AddCoverMessage, _>(|m| {
            println!("{} {} ({})", style("+").green(), m.cover_function_name, m.project);
        });
        bus.listen::<RemoveCoverMessage, _>(|m| {
            println!("{} {} ({})", style("-").red(), m.cover_function_name, m.project);
        });
    }
    let graph = graph.clone();
    bus.listen::<EndCoverMessage, _>(move |m| {
        if verbosity.is_quiet() && m.passed() {
            return;
        }
        let projects: Vec<_> = graph.iter().cloned().collect();
        print!("{}", render_end_cover(m, owner_of(&projects, &m.cover_name)));
    });
}

/// Server addresses and one document URL per project with an output file
#[must_use]
pub fn render_banner(graph: &ProjectGraph, handle: &TunnelHandle) -> String {
    let mut out = format!(
        "Serving on {} (channel on port {})\n",
        style(handle.base_url()).cyan(),
        handle.ws_port()
    );
    for project in graph.iter().filter(|p| p.out_file().is_some()) {
        out.push_str(&format!(
            "  {}: {}\n",
            project.name(),
            handle.document_url(project)
        ));
    }
    out.push_str("Press Ctrl+C to stop\n");
    out
}
