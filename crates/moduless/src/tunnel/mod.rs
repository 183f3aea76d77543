//! Remote execution tunnel.
//!
//! ```text
//!  bus ──StartCover──▶ listeners ──▶ command task ──▶ driven browser
//!   ▲                                    │
//!   │                                    ▼
//!   └──EndCover◀── channel (ws) ◀──▶ page ◀── asset server (http)
//! ```
//!
//! Bus listeners only forward into the command task, which owns the driven
//! browser and handles one request at a time.

pub mod assets;
pub mod channel;
pub mod server;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

pub use channel::Channel;
pub use server::AssetState;

use crate::browser::{BrowserLauncher, DrivenBrowser, KeyChord, LaunchOptions};
use crate::bus::MessageBus;
use crate::config::{normalize_path, to_url_path};
use crate::graph::ProjectGraph;
use crate::preferences::Preferences;
use crate::project::{Project, ProjectId};
use crate::protocol::{
    ExecuteVoidMessage, Message, ReloadMessage, SelectCoverMessage, StartCompleteCoverageMessage,
    StartCoverMessage, Value, VoidResultMessage, WindowMetricsMessage,
};
use crate::result::{ModulessError, ModulessResult};

/// Tunnel configuration
#[derive(Debug, Clone)]
pub struct TunnelConfig {
    /// Address both servers bind
    pub bind: IpAddr,
    /// Asset server port; 0 picks a free one
    pub http_port: u16,
    /// Channel port; 0 picks a free one
    pub ws_port: u16,
    /// How long to wait for a freshly launched page to connect
    pub connect_timeout: Duration,
    /// Overrides the stored "browser shown" preference
    pub show_browser: Option<bool>,
    /// Overrides the stored "devtools shown" preference
    pub show_devtools: Option<bool>,
    /// Browser executable
    pub browser_executable: Option<PathBuf>,
    /// Run the browser sandboxed
    pub sandbox: bool,
    /// Snapshot directory; defaults to `captures` beside the project directory
    pub captures_dir: Option<PathBuf>,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::LOCALHOST),
            http_port: 0,
            ws_port: 0,
            connect_timeout: Duration::from_secs(10),
            show_browser: None,
            show_devtools: None,
            browser_executable: None,
            sandbox: true,
            captures_dir: None,
        }
    }
}

impl TunnelConfig {
    /// Create a builder
    #[must_use]
    pub fn builder() -> TunnelConfigBuilder {
        TunnelConfigBuilder::default()
    }
}

/// Builder for [`TunnelConfig`]
#[derive(Debug, Clone, Default)]
pub struct TunnelConfigBuilder {
    config: TunnelConfig,
}

impl TunnelConfigBuilder {
    /// Set the bind address
    #[must_use]
    pub fn bind(mut self, bind: IpAddr) -> Self {
        self.config.bind = bind;
        self
    }

    /// Set the asset server port
    #[must_use]
    pub fn http_port(mut self, port: u16) -> Self {
        self.config.http_port = port;
        self
    }

    /// Set the channel port
    #[must_use]
    pub fn ws_port(mut self, port: u16) -> Self {
        self.config.ws_port = port;
        self
    }

    /// Set the page connection timeout
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Force the browser window shown or hidden
    #[must_use]
    pub fn show_browser(mut self, show: bool) -> Self {
        self.config.show_browser = Some(show);
        self
    }

    /// Force the inspector panel shown or hidden
    #[must_use]
    pub fn show_devtools(mut self, show: bool) -> Self {
        self.config.show_devtools = Some(show);
        self
    }

    /// Use a specific browser executable
    #[must_use]
    pub fn browser_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.browser_executable = Some(path.into());
        self
    }

    /// Enable or disable the browser sandbox
    #[must_use]
    pub fn sandbox(mut self, enabled: bool) -> Self {
        self.config.sandbox = enabled;
        self
    }

    /// Write snapshots here
    #[must_use]
    pub fn captures_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.captures_dir = Some(dir.into());
        self
    }

    /// Build the configuration
    #[must_use]
    pub fn build(self) -> TunnelConfig {
        self.config
    }
}

/// Shared, explicitly flushed preference store
pub type SharedPreferences = Arc<Mutex<Preferences>>;

#[derive(Debug)]
enum Command {
    Start(StartCoverMessage),
    StartAll(StartCompleteCoverageMessage),
    Execute(ExecuteVoidMessage),
    Stop(oneshot::Sender<()>),
}

/// Starts tunnels
#[derive(Debug)]
pub struct Tunnel;

impl Tunnel {
    /// Bind both servers, subscribe to the bus and start the command task.
    /// `launcher` may be `None`, in which case pages must be opened by hand.
    pub async fn start(
        graph: Arc<ProjectGraph>,
        bus: MessageBus,
        preferences: SharedPreferences,
        launcher: Option<Arc<dyn BrowserLauncher>>,
        config: TunnelConfig,
    ) -> ModulessResult<TunnelHandle> {
        let http_listener = TcpListener::bind(SocketAddr::new(config.bind, config.http_port)).await?;
        let ws_listener = TcpListener::bind(SocketAddr::new(config.bind, config.ws_port)).await?;
        let http_port = http_listener.local_addr()?.port();
        let ws_port = ws_listener.local_addr()?.port();

        let channel = Channel::new(bus.clone());
        let http_app = server::router(AssetState::new(graph.clone(), ws_port));
        let ws_app = channel.router();

        let mut servers = Vec::new();
        servers.push(tokio::spawn(async move {
            if let Err(err) = axum::serve(http_listener, http_app).await {
                tracing::error!("Asset server stopped: {err}");
            }
        }));
        servers.push(tokio::spawn(async move {
            if let Err(err) = axum::serve(ws_listener, ws_app).await {
                tracing::error!("Channel server stopped: {err}");
            }
        }));

        let (commands, inbox) = mpsc::unbounded_channel();
        subscribe(&bus, &commands, &channel, &preferences);

        let base_url = format!("http://localhost:{http_port}");
        let worker = CommandTask {
            graph,
            channel: channel.clone(),
            preferences,
            launcher,
            config,
            base_url: base_url.clone(),
            browser: None,
            attached: None,
        };
        let task = tokio::spawn(worker.run(inbox));

        tracing::info!(http_port, ws_port, "Tunnel listening");
        Ok(TunnelHandle {
            http_port,
            ws_port,
            base_url,
            channel,
            commands,
            servers,
            task: Some(task),
        })
    }
}

fn subscribe(
    bus: &MessageBus,
    commands: &mpsc::UnboundedSender<Command>,
    channel: &Channel,
    preferences: &SharedPreferences,
) {
    let tx = commands.clone();
    bus.listen::<StartCoverMessage, _>(move |m| {
        let _ = tx.send(Command::Start(m.clone()));
    });
    let tx = commands.clone();
    bus.listen::<StartCompleteCoverageMessage, _>(move |m| {
        let _ = tx.send(Command::StartAll(m.clone()));
    });
    let tx = commands.clone();
    bus.listen::<ExecuteVoidMessage, _>(move |m| {
        let _ = tx.send(Command::Execute(m.clone()));
    });

    let reload = channel.clone();
    bus.listen::<ReloadMessage, _>(move |m| {
        reload.broadcast(&m.clone().into());
    });

    let prefs = preferences.clone();
    bus.listen::<WindowMetricsMessage, _>(move |m| {
        let mut prefs = prefs.lock().unwrap_or_else(PoisonError::into_inner);
        prefs.window_metrics = Some(*m);
        if let Err(err) = prefs.flush() {
            tracing::warn!("Cannot store window metrics: {err}");
        }
    });
    let prefs = preferences.clone();
    bus.listen::<SelectCoverMessage, _>(move |m| {
        let mut prefs = prefs.lock().unwrap_or_else(PoisonError::into_inner);
        prefs.selected_cover = Some(m.clone());
        if let Err(err) = prefs.flush() {
            tracing::warn!("Cannot store selected cover: {err}");
        }
    });
}

/// A running tunnel
#[derive(Debug)]
pub struct TunnelHandle {
    http_port: u16,
    ws_port: u16,
    base_url: String,
    channel: Channel,
    commands: mpsc::UnboundedSender<Command>,
    servers: Vec<JoinHandle<()>>,
    task: Option<JoinHandle<()>>,
}

impl TunnelHandle {
    /// Bound asset server port
    #[must_use]
    pub const fn http_port(&self) -> u16 {
        self.http_port
    }

    /// Bound channel port
    #[must_use]
    pub const fn ws_port(&self) -> u16 {
        self.ws_port
    }

    /// Base URL of the asset server
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Test document URL of a project
    #[must_use]
    pub fn document_url(&self, project: &Project) -> String {
        document_url(&self.base_url, project)
    }

    /// The page channel
    #[must_use]
    pub const fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Number of connected pages
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.channel.connection_count()
    }

    /// Close the driven browser and stop serving. Safe to call repeatedly.
    pub async fn stop(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        let (ack, done) = oneshot::channel();
        if self.commands.send(Command::Stop(ack)).is_ok() {
            let _ = done.await;
        }
        task.abort();
        for server in self.servers.drain(..) {
            server.abort();
        }
        tracing::info!("Tunnel stopped");
    }
}

impl Drop for TunnelHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        for server in self.servers.drain(..) {
            server.abort();
        }
    }
}

fn document_url(base_url: &str, project: &Project) -> String {
    format!("{base_url}/??{}", to_url_path(project.config_path()))
}

/// Owns the driven browser
struct CommandTask {
    graph: Arc<ProjectGraph>,
    channel: Channel,
    preferences: SharedPreferences,
    launcher: Option<Arc<dyn BrowserLauncher>>,
    config: TunnelConfig,
    base_url: String,
    browser: Option<Box<dyn DrivenBrowser>>,
    attached: Option<ProjectId>,
}

impl CommandTask {
    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = inbox.recv().await {
            match command {
                Command::Start(message) => {
                    let path = message.containing_file_path.clone();
                    self.start(&path, message.into()).await;
                }
                Command::StartAll(message) => {
                    let path = message.containing_file_path.clone();
                    self.start(&path, message.into()).await;
                }
                Command::Execute(message) => self.execute(message).await,
                Command::Stop(ack) => {
                    self.close_browser().await;
                    let _ = ack.send(());
                }
            }
        }
        self.close_browser().await;
    }

    async fn start(&mut self, containing_file: &str, message: Message) {
        let Some(project) = self.graph.find(std::path::Path::new(containing_file)).cloned() else {
            tracing::error!("No project contains the file: {containing_file}");
            return;
        };

        self.ensure_browser(&project).await;

        if self.channel.broadcast(&message) == 0 {
            tracing::warn!(
                "No connected clients. Open {} to run covers.",
                document_url(&self.base_url, &project)
            );
        }
    }

    async fn ensure_browser(&mut self, project: &Project) {
        if self.browser.as_ref().is_some_and(|b| !b.is_alive()) {
            tracing::info!("Browser session ended");
            self.browser = None;
            self.attached = None;
        }
        if self.browser.is_some() && self.attached != Some(project.id()) {
            tracing::info!(project = project.name(), "Restarting browser for another project");
            self.close_browser().await;
        }
        if self.browser.is_some() {
            return;
        }
        let Some(launcher) = self.launcher.clone() else {
            return;
        };

        let url = document_url(&self.base_url, project);
        let options = self.launch_options(url);
        match launcher.launch(options).await {
            Ok(browser) => {
                self.browser = Some(browser);
                self.attached = Some(project.id());
                if !self.channel.wait_for_connection(self.config.connect_timeout).await {
                    tracing::warn!(
                        "{}",
                        ModulessError::Timeout {
                            ms: self.config.connect_timeout.as_millis() as u64
                        }
                    );
                }
            }
            Err(err) => {
                tracing::error!("{err}");
                self.browser = None;
                self.attached = None;
            }
        }
    }

    fn launch_options(&self, url: String) -> LaunchOptions {
        let prefs = self
            .preferences
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut options = LaunchOptions::new(url)
            .with_visible(self.config.show_browser.unwrap_or(prefs.browser_shown))
            .with_devtools(self.config.show_devtools.unwrap_or(prefs.devtools_shown))
            .with_window(prefs.window_metrics)
            .with_user_data_dir(prefs.dir().join("userData"));
        if let Some(ref path) = self.config.browser_executable {
            options = options.with_executable(path);
        }
        if !self.config.sandbox {
            options = options.with_no_sandbox();
        }
        options
    }

    async fn close_browser(&mut self) {
        self.attached = None;
        if let Some(browser) = self.browser.take() {
            if let Err(err) = browser.close().await {
                tracing::warn!("Closing browser: {err}");
            }
        }
    }

    async fn execute(&mut self, message: ExecuteVoidMessage) {
        let Some(call_id) = message.call_id() else {
            tracing::warn!(command = %message.void_name, "Remote command without callId ignored");
            return;
        };
        let reply = match self.run_void(&message).await {
            Ok(value) => VoidResultMessage::ok(call_id, value),
            Err(err) => {
                tracing::warn!(command = %message.void_name, "{err}");
                VoidResultMessage::err(call_id, err.to_string())
            }
        };
        self.channel.broadcast(&reply.into());
    }

    async fn run_void(&mut self, message: &ExecuteVoidMessage) -> ModulessResult<Value> {
        let captures = self.captures_dir();
        let cover = message.cover_name().unwrap_or("cover").to_string();
        let browser = self
            .browser
            .as_mut()
            .ok_or_else(|| ModulessError::browser("No driven browser is attached"))?;
        let args = &message.parameters;

        match message.void_name.as_str() {
            "click" => {
                browser.click(number(args, 0)?, number(args, 1)?).await?;
                Ok(Value::Undefined)
            }
            "keyboard" | "type" => {
                browser.type_text(text(args, 0)?).await?;
                Ok(Value::Undefined)
            }
            "hotkey" => {
                browser.press_keys(&KeyChord::parse(text(args, 0)?)?).await?;
                Ok(Value::Undefined)
            }
            "goto" => {
                browser.goto(text(args, 0)?).await?;
                Ok(Value::Undefined)
            }
            "baselineSnapshot" => {
                let png = browser.screenshot().await?;
                let captures = captures?;
                tokio::fs::create_dir_all(&captures).await?;
                tokio::fs::write(captures.join(format!("{cover}.png")), png).await?;
                Ok(Value::Undefined)
            }
            "snapshot" => {
                let png = browser.screenshot().await?;
                let captures = captures?;
                tokio::fs::create_dir_all(&captures).await?;
                tokio::fs::write(captures.join(format!("{cover}-actual.png")), &png).await?;
                let baseline = tokio::fs::read(captures.join(format!("{cover}.png"))).await?;
                Ok(Value::Bool(baseline == png))
            }
            other => Err(ModulessError::UnknownCommand {
                name: other.to_string(),
            }),
        }
    }

    fn captures_dir(&self) -> ModulessResult<PathBuf> {
        if let Some(ref dir) = self.config.captures_dir {
            return Ok(dir.clone());
        }
        let project = self
            .attached
            .map(|id| self.graph.get(id))
            .ok_or_else(|| ModulessError::browser("No project is attached"))?;
        Ok(normalize_path(&project.dir().join("../captures")))
    }
}

impl std::fmt::Debug for CommandTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandTask")
            .field("base_url", &self.base_url)
            .field("attached", &self.attached)
            .field("has_browser", &self.browser.is_some())
            .finish_non_exhaustive()
    }
}

fn number(args: &[Value], index: usize) -> ModulessResult<f64> {
    args.get(index)
        .and_then(Value::as_f64)
        .ok_or_else(|| ModulessError::browser(format!("Argument {index} must be a number")))
}

fn text(args: &[Value], index: usize) -> ModulessResult<&str> {
    args.get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| ModulessError::browser(format!("Argument {index} must be a string")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = TunnelConfig::builder()
            .http_port(10001)
            .ws_port(10002)
            .connect_timeout(Duration::from_millis(500))
            .show_browser(true)
            .sandbox(false)
            .build();
        assert_eq!(config.http_port, 10001);
        assert_eq!(config.ws_port, 10002);
        assert_eq!(config.connect_timeout, Duration::from_millis(500));
        assert_eq!(config.show_browser, Some(true));
        assert_eq!(config.show_devtools, None);
        assert!(!config.sandbox);
    }

    #[test]
    fn test_config_defaults_pick_free_ports() {
        let config = TunnelConfig::default();
        assert_eq!(config.http_port, 0);
        assert_eq!(config.ws_port, 0);
        assert!(config.bind.is_loopback());
    }

    #[test]
    fn test_argument_helpers() {
        let args = vec![Value::Number(3.0), Value::from("x")];
        assert_eq!(number(&args, 0).unwrap(), 3.0);
        assert_eq!(text(&args, 1).unwrap(), "x");
        assert!(number(&args, 1).is_err());
        assert!(text(&args, 5).is_err());
    }
}
