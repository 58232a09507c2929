//! Procedure orchestration: sequences perception and action steps into the
//! user-facing account-maintenance procedures.
//!
//! The orchestrator owns the single-run guard and the cancellation token;
//! every procedure executes as one strictly sequential chain of steps, so
//! input primitives are never dispatched concurrently.

mod account;
mod mail;
mod signin;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::assets::AssetCatalog;
use crate::capture::{ScreenSource, XcapScreen};
use crate::config::ConfigStore;
use crate::errors::AutomationError;
use crate::geometry::Region;
use crate::input::{ActionPrimitives, InputBackend, Key, SettlePolicy, SystemInput};
use crate::process;
use crate::reset::{self, IdentityReset};
use crate::step::{CancellationToken, StepExecutor, StepSpec};
use crate::template::{Match, TemplateMatcher, TemplateRef};
use crate::window::{WindowHandle, WindowLocator};

/// The procedures a user can launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Procedure {
    /// Sign the target application into a fresh account, driving the
    /// browser-side email verification.
    SignIn,
    /// Delete the currently signed-in account through the browser settings
    /// page.
    DeleteAccount,
    /// Regenerate the application's stored device identity.
    ResetIdentity,
    /// Delete, reset, then sign in again with the next account identity.
    FullCycle,
}

/// Terminal result of one procedure run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowOutcome {
    Completed,
    /// A step exhausted its attempt budget; `step` names it.
    TimedOut { step: String },
    /// The user cancelled; observed at a step checkpoint, never mid-action.
    Cancelled,
    /// An unretryable defect (missing asset, dead display, bad config).
    Fatal { reason: String },
    /// Another procedure was already running; nothing was started.
    Busy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// Observer for user-facing progress messages, alongside `tracing`.
pub type LogSink = Arc<dyn Fn(LogLevel, &str) + Send + Sync>;

/// Everything the procedures need to know about the applications they
/// drive. Defaults match the stock target installation.
#[derive(Debug, Clone)]
pub struct Targets {
    /// Process name of the target application.
    pub app_process: String,
    /// Process name of the browser the auth pages open in.
    pub browser_process: String,
    /// Lowercase substring expected in the browser window title.
    pub browser_title: String,
    pub auth_url: String,
    pub settings_url: String,
    pub mail_url: String,
}

impl Default for Targets {
    fn default() -> Self {
        Self {
            app_process: "Cursor.exe".to_string(),
            browser_process: "chrome.exe".to_string(),
            browser_title: "google chrome".to_string(),
            auth_url: "https://authenticator.cursor.sh".to_string(),
            settings_url: "https://www.cursor.com/settings".to_string(),
            mail_url: "https://mail.126.com".to_string(),
        }
    }
}

/// Construction-time wiring for [`Orchestrator`].
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Root of the template asset tree.
    pub asset_root: PathBuf,
    /// Settings JSON document.
    pub config_path: PathBuf,
    /// The target application's JSON state store holding identity keys.
    pub storage_path: PathBuf,
    /// Where identity-reset backups are written.
    pub backup_dir: PathBuf,
    /// Updater directory to neutralize when auto-update is disabled.
    pub updater_path: Option<PathBuf>,
    pub settle: SettlePolicy,
    pub targets: Targets,
}

/// Shared context threaded through every procedure.
pub(crate) struct Session {
    pub(crate) matcher: TemplateMatcher,
    pub(crate) windows: WindowLocator,
    pub(crate) actions: ActionPrimitives,
    pub(crate) steps: StepExecutor,
    pub(crate) config: ConfigStore,
    pub(crate) assets: AssetCatalog,
    pub(crate) targets: Targets,
    pub(crate) reset: IdentityReset,
    pub(crate) updater_path: Option<PathBuf>,
    log: Option<LogSink>,
}

impl Session {
    pub(crate) fn emit(&self, level: LogLevel, message: impl AsRef<str>) {
        let message = message.as_ref();
        match level {
            LogLevel::Info => info!("{message}"),
            LogLevel::Warn => warn!("{message}"),
            LogLevel::Error => error!("{message}"),
        }
        if let Some(sink) = &self.log {
            sink(level, message);
        }
    }

    /// Fixed pacing for page loads and process starts, where no completion
    /// signal exists to wait on.
    pub(crate) async fn pace(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    /// One visibility check over a template list, logging which variant won
    /// (or which were tried and missed).
    pub(crate) fn find_any(
        &self,
        templates: &[TemplateRef],
        region: &Region,
    ) -> Result<Option<Match>, AutomationError> {
        match self.matcher.locate_any(templates, region)? {
            Some((index, hit)) => {
                debug!(template = %templates[index].label(), score = hit.score, "matched");
                Ok(Some(hit))
            }
            None => {
                let tried: Vec<_> = templates.iter().map(TemplateRef::label).collect();
                debug!(?tried, "no template variant matched");
                Ok(None)
            }
        }
    }

    pub(crate) async fn click_match(&self, hit: &Match) -> Result<(), AutomationError> {
        let (x, y) = hit.center();
        self.actions.click(x, y).await
    }

    /// Retry locating any of `templates` inside a freshly computed region
    /// and click the first hit. The region closure re-runs per attempt so a
    /// moving window is re-tracked.
    pub(crate) async fn click_any_step(
        &self,
        spec: &StepSpec,
        templates: &[TemplateRef],
        region: impl Fn() -> Result<Region, AutomationError>,
    ) -> Result<Match, AutomationError> {
        self.steps
            .run(spec, |_| {
                let region = region();
                async move {
                    let region = region?;
                    match self.find_any(templates, &region)? {
                        Some(hit) => {
                            self.click_match(&hit).await?;
                            Ok(Some(hit))
                        }
                        None => Ok(None),
                    }
                }
            })
            .await
    }

    /// Raise the target application's window, retrying while the window
    /// manager refuses the foreground switch.
    pub(crate) async fn focus_app(&self) -> Result<WindowHandle, AutomationError> {
        let spec = StepSpec::new("focus-app-window", 5, Duration::from_secs(1));
        self.steps
            .run(&spec, |_| async move {
                let handle = self.windows.resolve_by_process_name(&self.targets.app_process)?;
                Ok(self.windows.focus(&handle).then_some(handle))
            })
            .await
    }

    /// Wait until a browser window holds input focus, raising one if it is
    /// open but buried.
    pub(crate) async fn wait_for_browser(&self) -> Result<WindowHandle, AutomationError> {
        let spec = StepSpec::new("wait-for-browser", 15, Duration::from_secs(1));
        self.steps
            .run(&spec, |_| async move {
                match self.windows.active_window() {
                    Ok(handle)
                        if handle.title.to_lowercase().contains(&self.targets.browser_title) =>
                    {
                        return Ok(Some(handle));
                    }
                    Ok(_) | Err(AutomationError::WindowNotFound(_)) => {}
                    Err(e) => return Err(e),
                }
                if let Ok(handle) = self
                    .windows
                    .resolve_by_process_name(&self.targets.browser_process)
                {
                    self.windows.focus(&handle);
                }
                Ok(None)
            })
            .await
    }

    /// Maximize the browser and reset its zoom so template assets match at
    /// their authored scale.
    pub(crate) async fn prepare_browser(
        &self,
        handle: &WindowHandle,
    ) -> Result<(), AutomationError> {
        if !self.windows.ensure_maximized(handle) {
            self.emit(LogLevel::Warn, "could not maximize browser window");
        }
        self.actions
            .press_hotkey(&[Key::ControlLeft, Key::Num0])
            .await
    }

    /// Load a URL in the focused browser window via the address bar.
    pub(crate) async fn navigate(&self, url: &str) -> Result<(), AutomationError> {
        self.actions
            .press_hotkey(&[Key::ControlLeft, Key::KeyL])
            .await?;
        self.actions.paste_text(url).await?;
        self.actions.press_key(Key::Return).await
    }

    /// Read the focused browser window's current URL off the address bar.
    pub(crate) async fn current_url(&self) -> Result<String, AutomationError> {
        self.actions
            .press_hotkey(&[Key::ControlLeft, Key::KeyL])
            .await?;
        let url = self.actions.copy_selection().await?;
        self.actions.press_key(Key::Escape).await?;
        Ok(url.trim().to_string())
    }

    /// Run the browser's find-in-page over `text` so the hit renders in the
    /// highlight style the marker templates were authored against.
    pub(crate) async fn highlight_text(&self, text: &str) -> Result<(), AutomationError> {
        self.actions
            .press_hotkey(&[Key::ControlLeft, Key::KeyF])
            .await?;
        self.actions.paste_text(text).await?;
        self.actions.press_key(Key::Return).await
    }
}

/// Entry point: runs procedures one at a time against the desktop.
pub struct Orchestrator {
    session: Session,
    running: AtomicBool,
    token: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        screen: Arc<dyn ScreenSource>,
        input: Arc<dyn InputBackend>,
        options: EngineOptions,
    ) -> Self {
        let token = CancellationToken::new();
        let session = Session {
            matcher: TemplateMatcher::new(screen),
            windows: WindowLocator::new(),
            actions: ActionPrimitives::new(input, options.settle),
            steps: StepExecutor::new(token.clone()),
            config: ConfigStore::new(options.config_path),
            assets: AssetCatalog::new(options.asset_root),
            targets: options.targets,
            reset: IdentityReset::new(options.storage_path, options.backup_dir),
            updater_path: options.updater_path,
            log: None,
        };
        Self {
            session,
            running: AtomicBool::new(false),
            token,
        }
    }

    /// Wire up the physical screen, input queue and clipboard.
    pub fn with_system_backends(options: EngineOptions) -> Result<Self, AutomationError> {
        let input = SystemInput::new()?;
        Ok(Self::new(Arc::new(XcapScreen::new()), Arc::new(input), options))
    }

    /// Register an observer for progress messages. Call before the first
    /// run.
    pub fn set_log_sink(&mut self, sink: LogSink) {
        self.session.log = Some(sink);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Request cancellation of the in-flight procedure. Takes effect at the
    /// next step checkpoint.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Run `procedure` to a terminal outcome. At most one procedure runs at
    /// a time; overlapping calls return [`WorkflowOutcome::Busy`] without
    /// touching the desktop.
    pub async fn run(&self, procedure: Procedure) -> WorkflowOutcome {
        if self.running.swap(true, Ordering::SeqCst) {
            self.session
                .emit(LogLevel::Warn, "a procedure is already running");
            return WorkflowOutcome::Busy;
        }
        self.token.reset();
        self.session
            .emit(LogLevel::Info, format!("starting {procedure:?}"));

        let result = self.dispatch(procedure).await;
        self.running.store(false, Ordering::SeqCst);

        let outcome = match result {
            Ok(()) => WorkflowOutcome::Completed,
            Err(AutomationError::Interrupted) => WorkflowOutcome::Cancelled,
            Err(AutomationError::StepTimeout { step, .. }) => WorkflowOutcome::TimedOut { step },
            Err(e) => WorkflowOutcome::Fatal {
                reason: e.to_string(),
            },
        };
        let level = match outcome {
            WorkflowOutcome::Completed => LogLevel::Info,
            _ => LogLevel::Error,
        };
        self.session
            .emit(level, format!("{procedure:?} finished: {outcome:?}"));
        outcome
    }

    async fn dispatch(&self, procedure: Procedure) -> Result<(), AutomationError> {
        let s = &self.session;
        match procedure {
            Procedure::SignIn => signin::run(s).await,
            Procedure::DeleteAccount => account::run(s).await,
            Procedure::ResetIdentity => reset_identity(s).await,
            Procedure::FullCycle => {
                account::run(s).await?;
                reset_identity(s).await?;
                signin::run(s).await?;
                // The consumed identity is gone; roll forward for the next
                // cycle.
                let next = s.config.increment_identity_index()?;
                s.emit(LogLevel::Info, format!("identity index advanced to {next}"));
                Ok(())
            }
        }
    }
}

/// Make sure the target application is running, launching it when a path is
/// configured and waiting for the process to appear.
pub(crate) async fn ensure_app_running(s: &Session) -> Result<(), AutomationError> {
    if process::is_running(&s.targets.app_process) {
        return Ok(());
    }
    let exe = s.config.load()?.app_exe_path;
    // A misconfigured path would never produce the process; surface it now
    // instead of burning the whole wait budget.
    if let Some(path) = &exe {
        if !path.exists() {
            return Err(AutomationError::ConfigError(format!(
                "executable not found: {}",
                path.display()
            )));
        }
    }
    let spec = StepSpec::new("wait-for-app", 15, Duration::from_secs(1));
    s.steps
        .run(&spec, |attempt| {
            let exe = exe.clone();
            async move {
                if process::is_running(&s.targets.app_process) {
                    return Ok(Some(()));
                }
                if attempt == 1 {
                    match &exe {
                        Some(path) => process::launch(path)?,
                        None => s.emit(
                            LogLevel::Warn,
                            "application is not running and no executable path is configured",
                        ),
                    }
                }
                Ok(None)
            }
        })
        .await?;
    // Give the freshly started process time to paint its window.
    s.pace(Duration::from_secs(2)).await;
    Ok(())
}

/// Click the target application's logout control if a session is signed in.
/// Best effort: logging out keeps the server-side session table clean, but a
/// hidden or absent control must not block the reset itself.
async fn sign_out(s: &Session) -> Result<(), AutomationError> {
    let app = s.focus_app().await?;
    let region = app.search_region()?;
    if let Some(hit) = s.find_any(&s.assets.logout_button(), &region)? {
        s.click_match(&hit).await?;
        s.pace(Duration::from_secs(1)).await;
        s.emit(LogLevel::Info, "signed out of the current account");
    }
    Ok(())
}

/// Sign out and stop the target application, rewrite its stored identity,
/// and optionally neutralize its self-updater.
async fn reset_identity(s: &Session) -> Result<(), AutomationError> {
    if process::is_running(&s.targets.app_process) {
        match sign_out(s).await {
            Ok(()) => {}
            Err(e @ AutomationError::Interrupted) => return Err(e),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => s.emit(LogLevel::Warn, format!("could not sign out: {e}")),
        }
    }
    let killed = process::kill_all(&s.targets.app_process);
    if killed > 0 {
        // Let the application flush and release its state file.
        s.pace(Duration::from_secs(2)).await;
    }
    let ids = s.reset.reset()?;
    s.emit(
        LogLevel::Info,
        format!("device identity regenerated ({})", ids.dev_device_id),
    );

    if s.config.load()?.disable_auto_update {
        if let Some(path) = &s.updater_path {
            reset::block_auto_update(path)?;
            s.emit(LogLevel::Info, "auto-update blocked");
        }
    }
    Ok(())
}
