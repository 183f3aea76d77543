//! Driven browser adapter.
//!
//! The tunnel controls the browser only through [`BrowserLauncher`] and
//! [`DrivenBrowser`]. With the `browser` feature, [`ChromiumLauncher`] drives
//! Chromium over the DevTools protocol; without it callers bring their own
//! launcher.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::protocol::WindowMetricsMessage;
use crate::result::{ModulessError, ModulessResult};

/// How to start a browser
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchOptions {
    /// Document to open
    pub url: String,
    /// Windowed instead of headless
    pub visible: bool,
    /// Open the inspector panel
    pub devtools: bool,
    /// Window geometry to restore
    pub window: Option<WindowMetricsMessage>,
    /// Browser profile directory
    pub user_data_dir: Option<PathBuf>,
    /// Browser executable, found on PATH when absent
    pub executable: Option<PathBuf>,
    /// Run with the browser sandbox (disable inside containers)
    pub sandbox: bool,
}

impl LaunchOptions {
    /// Headless launch of `url`
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            visible: false,
            devtools: false,
            window: None,
            user_data_dir: None,
            executable: None,
            sandbox: true,
        }
    }

    /// Show the window
    #[must_use]
    pub const fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    /// Open the inspector panel
    #[must_use]
    pub const fn with_devtools(mut self, devtools: bool) -> Self {
        self.devtools = devtools;
        self
    }

    /// Restore window geometry
    #[must_use]
    pub const fn with_window(mut self, window: Option<WindowMetricsMessage>) -> Self {
        self.window = window;
        self
    }

    /// Use a specific profile directory
    #[must_use]
    pub fn with_user_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.user_data_dir = Some(dir.into());
        self
    }

    /// Use a specific browser executable
    #[must_use]
    pub fn with_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = Some(path.into());
        self
    }

    /// Disable the browser sandbox
    #[must_use]
    pub const fn with_no_sandbox(mut self) -> Self {
        self.sandbox = false;
        self
    }

    /// Window size to request, from the stored geometry
    #[must_use]
    pub fn window_size(&self) -> Option<(u32, u32)> {
        let window = self.window?;
        (window.width >= 1.0 && window.height >= 1.0).then(|| (window.width as u32, window.height as u32))
    }

    /// Window position to request, from the stored geometry
    #[must_use]
    pub fn window_position(&self) -> Option<(i32, i32)> {
        let window = self.window?;
        (window.screen_x.is_finite() && window.screen_y.is_finite())
            .then(|| (window.screen_x as i32, window.screen_y as i32))
    }
}

/// A key combination such as `Ctrl+Shift+A`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyChord {
    /// Modifier bit set: Alt 1, Ctrl 2, Meta 4, Shift 8
    pub modifiers: u8,
    /// The non-modifier key, as a DOM key value
    pub key: String,
}

impl KeyChord {
    /// Alt modifier bit
    pub const ALT: u8 = 1;
    /// Control modifier bit
    pub const CTRL: u8 = 2;
    /// Meta (command) modifier bit
    pub const META: u8 = 4;
    /// Shift modifier bit
    pub const SHIFT: u8 = 8;

    /// Parse `+`-separated key names. Modifier names are case-insensitive;
    /// the last non-modifier name is the key.
    pub fn parse(text: &str) -> ModulessResult<Self> {
        let mut modifiers = 0;
        let mut key = None;
        for part in text.split('+').map(str::trim).filter(|p| !p.is_empty()) {
            match part.to_ascii_lowercase().as_str() {
                "alt" | "option" => modifiers |= Self::ALT,
                "ctrl" | "control" => modifiers |= Self::CTRL,
                "meta" | "cmd" | "command" | "super" => modifiers |= Self::META,
                "shift" => modifiers |= Self::SHIFT,
                "enter" | "return" => key = Some("Enter".to_string()),
                "esc" | "escape" => key = Some("Escape".to_string()),
                "tab" => key = Some("Tab".to_string()),
                "space" => key = Some(" ".to_string()),
                "backspace" => key = Some("Backspace".to_string()),
                "delete" | "del" => key = Some("Delete".to_string()),
                "up" => key = Some("ArrowUp".to_string()),
                "down" => key = Some("ArrowDown".to_string()),
                "left" => key = Some("ArrowLeft".to_string()),
                "right" => key = Some("ArrowRight".to_string()),
                _ => key = Some(part.to_string()),
            }
        }
        let key = key.ok_or_else(|| ModulessError::browser(format!("No key in hotkey \"{text}\"")))?;
        Ok(Self { modifiers, key })
    }

    /// DOM `code` value for the key, when it has an obvious one
    #[must_use]
    pub fn code(&self) -> Option<String> {
        let mut chars = self.key.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_ascii_alphabetic() => Some(format!("Key{}", c.to_ascii_uppercase())),
            (Some(c), None) if c.is_ascii_digit() => Some(format!("Digit{c}")),
            (Some(' '), None) => Some("Space".to_string()),
            (Some(_), None) => None,
            _ => Some(self.key.clone()),
        }
    }
}

impl fmt::Display for KeyChord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (bit, name) in [
            (Self::CTRL, "Ctrl"),
            (Self::ALT, "Alt"),
            (Self::SHIFT, "Shift"),
            (Self::META, "Meta"),
        ] {
            if self.modifiers & bit != 0 {
                write!(f, "{name}+")?;
            }
        }
        f.write_str(&self.key)
    }
}

/// Starts browsers
#[async_trait]
pub trait BrowserLauncher: Send + Sync + fmt::Debug {
    /// Start a browser showing `options.url`
    async fn launch(&self, options: LaunchOptions) -> ModulessResult<Box<dyn DrivenBrowser>>;
}

/// A running browser with one page
#[async_trait]
pub trait DrivenBrowser: Send + fmt::Debug {
    /// Whether the browser process is still connected
    fn is_alive(&self) -> bool;

    /// Mouse click at page coordinates
    async fn click(&mut self, x: f64, y: f64) -> ModulessResult<()>;

    /// Insert text at the focused element
    async fn type_text(&mut self, text: &str) -> ModulessResult<()>;

    /// Press and release a key combination
    async fn press_keys(&mut self, chord: &KeyChord) -> ModulessResult<()>;

    /// Navigate the page
    async fn goto(&mut self, url: &str) -> ModulessResult<()>;

    /// PNG capture of the page
    async fn screenshot(&mut self) -> ModulessResult<Vec<u8>>;

    /// Close the browser
    async fn close(self: Box<Self>) -> ModulessResult<()>;
}

/// The launcher compiled into this build, if any
#[must_use]
pub fn default_launcher() -> Option<Arc<dyn BrowserLauncher>> {
    #[cfg(feature = "browser")]
    {
        Some(Arc::new(ChromiumLauncher))
    }
    #[cfg(not(feature = "browser"))]
    {
        None
    }
}

// ============================================================================
// Chromium over CDP (when `browser` feature is enabled)
// ============================================================================

#[cfg(feature = "browser")]
pub use cdp::ChromiumLauncher;

#[cfg(feature = "browser")]
mod cdp {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use base64::Engine;
    use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig as CdpConfig};
    use chromiumoxide::cdp::browser_protocol::input::{
        DispatchKeyEventParams, DispatchKeyEventType, DispatchMouseEventParams,
        DispatchMouseEventType, InsertTextParams, MouseButton,
    };
    use chromiumoxide::cdp::browser_protocol::page::{
        CaptureScreenshotFormat, CaptureScreenshotParams,
    };
    use chromiumoxide::page::Page as CdpPage;
    use futures::StreamExt;

    /// Launches Chromium
    #[derive(Debug, Clone, Copy, Default)]
    pub struct ChromiumLauncher;

    #[async_trait]
    impl BrowserLauncher for ChromiumLauncher {
        async fn launch(&self, options: LaunchOptions) -> ModulessResult<Box<dyn DrivenBrowser>> {
            let mut builder = CdpConfig::builder();
            if options.visible {
                builder = builder.with_head();
            }
            if !options.sandbox {
                builder = builder.no_sandbox();
            }
            if let Some(ref path) = options.executable {
                builder = builder.chrome_executable(path);
            }
            if let Some(ref dir) = options.user_data_dir {
                builder = builder.user_data_dir(dir);
            }
            if let Some((width, height)) = options.window_size() {
                builder = builder.window_size(width, height);
            }
            if let Some((x, y)) = options.window_position() {
                builder = builder.arg(format!("--window-position={x},{y}"));
            }
            if options.devtools {
                builder = builder.arg("--auto-open-devtools-for-tabs");
            }

            let config = builder
                .build()
                .map_err(|message| ModulessError::BrowserLaunch { message })?;

            let (browser, mut handler) =
                CdpBrowser::launch(config)
                    .await
                    .map_err(|e| ModulessError::BrowserLaunch {
                        message: e.to_string(),
                    })?;

            let alive = Arc::new(AtomicBool::new(true));
            let flag = alive.clone();
            let handle = tokio::spawn(async move {
                while let Some(event) = handler.next().await {
                    if event.is_err() {
                        break;
                    }
                }
                flag.store(false, Ordering::SeqCst);
            });

            let page = browser
                .new_page(options.url.as_str())
                .await
                .map_err(|e| ModulessError::BrowserLaunch {
                    message: e.to_string(),
                })?;

            tracing::info!(url = %options.url, visible = options.visible, "Browser launched");
            Ok(Box::new(ChromiumBrowser {
                browser,
                page,
                alive,
                handle,
            }))
        }
    }

    #[derive(Debug)]
    struct ChromiumBrowser {
        browser: CdpBrowser,
        page: CdpPage,
        alive: Arc<AtomicBool>,
        handle: tokio::task::JoinHandle<()>,
    }

    fn cdp_error(e: impl ToString) -> ModulessError {
        ModulessError::browser(e.to_string())
    }

    impl ChromiumBrowser {
        async fn key_event(&self, kind: DispatchKeyEventType, chord: &KeyChord) -> ModulessResult<()> {
            let mut params = DispatchKeyEventParams::builder()
                .r#type(kind)
                .key(chord.key.clone())
                .modifiers(i64::from(chord.modifiers));
            if let Some(code) = chord.code() {
                params = params.code(code);
            }
            let params = params.build().map_err(cdp_error)?;
            self.page.execute(params).await.map_err(cdp_error)?;
            Ok(())
        }

        async fn mouse_event(&self, kind: DispatchMouseEventType, x: f64, y: f64) -> ModulessResult<()> {
            let params = DispatchMouseEventParams::builder()
                .r#type(kind)
                .x(x)
                .y(y)
                .button(MouseButton::Left)
                .click_count(1)
                .build()
                .map_err(cdp_error)?;
            self.page.execute(params).await.map_err(cdp_error)?;
            Ok(())
        }
    }

    #[async_trait]
    impl DrivenBrowser for ChromiumBrowser {
        fn is_alive(&self) -> bool {
            self.alive.load(Ordering::SeqCst)
        }

        async fn click(&mut self, x: f64, y: f64) -> ModulessResult<()> {
            self.mouse_event(DispatchMouseEventType::MousePressed, x, y).await?;
            self.mouse_event(DispatchMouseEventType::MouseReleased, x, y).await
        }

        async fn type_text(&mut self, text: &str) -> ModulessResult<()> {
            self.page
                .execute(InsertTextParams::new(text))
                .await
                .map_err(cdp_error)?;
            Ok(())
        }

        async fn press_keys(&mut self, chord: &KeyChord) -> ModulessResult<()> {
            self.key_event(DispatchKeyEventType::KeyDown, chord).await?;
            self.key_event(DispatchKeyEventType::KeyUp, chord).await
        }

        async fn goto(&mut self, url: &str) -> ModulessResult<()> {
            self.page.goto(url).await.map_err(cdp_error)?;
            Ok(())
        }

        async fn screenshot(&mut self) -> ModulessResult<Vec<u8>> {
            let params = CaptureScreenshotParams::builder()
                .format(CaptureScreenshotFormat::Png)
                .build();
            let shot = self.page.execute(params).await.map_err(cdp_error)?;
            base64::engine::general_purpose::STANDARD
                .decode(&shot.data)
                .map_err(cdp_error)
        }

        async fn close(mut self: Box<Self>) -> ModulessResult<()> {
            let result = self.browser.close().await;
            self.handle.abort();
            self.alive.store(false, Ordering::SeqCst);
            result.map(|_| ()).map_err(cdp_error)
        }
    }
}
