//! Application orchestrator.
//!
//! Start-up is strictly sequential:
//! 1. initialise every renderer;
//! 2. start event delivery against the fan-out renderer;
//! 3. bind the fan-out renderer to IPC and start dispatch;
//! 4. build the [`Runtime`];
//! 5. start bindings (initial broadcast);
//! 6. run secondaries on their own threads and the primary on the caller.

use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::{debug, error, info, warn};
use ui_renderer::{
    AppConfig, BindingManager, CancelToken, EventManager, IpcManager, Renderer,
};

use crate::binding::{Bindable, BindingRegistry};
use crate::config::{self, BuildMode, EnvConfig};
use crate::error::AppError;
use crate::event::EventHub;
use crate::ipc::IpcDispatcher;
use crate::logging;
use crate::platform;
use crate::renderer::{Bridge, BridgeClient, HeadlessWindow, MultiRenderer, RendererSet, RunFailure};
use crate::runtime::Runtime;
use crate::sync::lock_unpoisoned;

/// Lifecycle position. Moves forward only; there is no restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Created,
    Initializing,
    Running,
    Stopped,
}

impl fmt::Display for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Created => "created",
            Self::Initializing => "initializing",
            Self::Running => "running",
            Self::Stopped => "stopped",
        };
        f.write_str(label)
    }
}

pub struct AppBuilder {
    config: Option<AppConfig>,
    build_mode: BuildMode,
    environment: Option<EnvConfig>,
    secondaries: Vec<Arc<dyn Renderer>>,
    primary: Option<Arc<dyn Renderer>>,
    bridge: bool,
    signals: bool,
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self {
            config: None,
            build_mode: BuildMode::current(),
            environment: None,
            secondaries: Vec::new(),
            primary: None,
            bridge: true,
            signals: true,
        }
    }
}

impl AppBuilder {
    #[must_use]
    pub fn config(mut self, config: AppConfig) -> Self {
        self.config = Some(config);
        self
    }

    #[must_use]
    pub fn build_mode(mut self, mode: BuildMode) -> Self {
        self.build_mode = mode;
        self
    }

    /// Uses `environment` instead of reading the process environment.
    #[must_use]
    pub fn environment(mut self, environment: EnvConfig) -> Self {
        self.environment = Some(environment);
        self
    }

    /// Adds a secondary renderer after the built-in bridge.
    #[must_use]
    pub fn secondary(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.secondaries.push(renderer);
        self
    }

    /// Replaces the default [`HeadlessWindow`] primary.
    #[must_use]
    pub fn primary(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.primary = Some(renderer);
        self
    }

    #[must_use]
    pub fn without_bridge(mut self) -> Self {
        self.bridge = false;
        self
    }

    #[must_use]
    pub fn install_signal_handlers(mut self, enabled: bool) -> Self {
        self.signals = enabled;
        self
    }

    pub fn build(self) -> Result<App, AppError> {
        let environment = self.environment.unwrap_or_else(EnvConfig::from_env);
        let config = config::resolve(self.config, self.build_mode, &environment)?;
        if !logging::init(config.log_level) {
            debug!("global subscriber already installed");
        }

        let primary: Arc<dyn Renderer> = match self.primary {
            Some(primary) => primary,
            None => Arc::new(HeadlessWindow::new()),
        };
        let mut set = RendererSet::new(primary);
        let mut bridge_client = None;
        if self.bridge {
            let (bridge, client) = Bridge::new();
            set.push_secondary(Arc::new(bridge));
            bridge_client = Some(client);
        }
        for renderer in self.secondaries {
            set.push_secondary(renderer);
        }
        debug!(renderers = ?set.names(), "renderer set assembled");

        let cancel = CancelToken::new();
        let shared = Arc::new(Shared {
            renderer: Arc::new(MultiRenderer::new(set)),
            bindings: Arc::new(BindingRegistry::new()),
            cancel,
            state: Mutex::new(AppState::Created),
        });

        Ok(App {
            config,
            shared,
            ipc: Arc::new(IpcDispatcher::new()),
            events: Arc::new(EventHub::new()),
            bridge_client: Mutex::new(bridge_client),
            signals: self.signals,
        })
    }
}

/// State reachable from both the [`App`] and its [`AppHandle`]s.
struct Shared {
    renderer: Arc<MultiRenderer>,
    bindings: Arc<BindingRegistry>,
    cancel: CancelToken,
    state: Mutex<AppState>,
}

impl Shared {
    fn state(&self) -> AppState {
        *lock_unpoisoned(&self.state)
    }

    fn set_state(&self, next: AppState) {
        let mut state = lock_unpoisoned(&self.state);
        let previous = *state;
        debug!(from = %previous, to = %next, "application state");
        *state = next;
    }
}

/// Cloneable control surface for other threads.
#[derive(Clone)]
pub struct AppHandle {
    shared: Arc<Shared>,
}

impl AppHandle {
    pub fn bind(&self, object: Arc<dyn Bindable>) -> Result<(), AppError> {
        self.shared.bindings.bind(object)?;
        Ok(())
    }

    /// Asks every renderer to stop; [`App::run`] returns once they have.
    pub fn shutdown(&self) {
        info!("shutdown requested");
        self.shared.cancel.cancel();
    }

    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    #[must_use]
    pub fn state(&self) -> AppState {
        self.shared.state()
    }
}

pub struct App {
    config: AppConfig,
    shared: Arc<Shared>,
    ipc: Arc<IpcDispatcher>,
    events: Arc<EventHub>,
    bridge_client: Mutex<Option<BridgeClient>>,
    signals: bool,
}

impl App {
    /// Resolves `config` and builds the default renderer set: the bridge
    /// followed by a [`HeadlessWindow`] primary.
    pub fn new(config: Option<AppConfig>) -> Result<Self, AppError> {
        let builder = Self::builder();
        match config {
            Some(config) => builder.config(config).build(),
            None => builder.build(),
        }
    }

    #[must_use]
    pub fn builder() -> AppBuilder {
        AppBuilder::default()
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    #[must_use]
    pub fn state(&self) -> AppState {
        self.shared.state()
    }

    #[must_use]
    pub fn handle(&self) -> AppHandle {
        AppHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    #[must_use]
    pub fn renderer_names(&self) -> Vec<String> {
        self.shared.renderer.set().names()
    }

    /// External end of the built-in bridge. `None` once taken or when the
    /// bridge was disabled.
    pub fn take_bridge_client(&self) -> Option<BridgeClient> {
        lock_unpoisoned(&self.bridge_client).take()
    }

    /// Registers `object`. Before `run` it is queued; while running it is
    /// started and broadcast immediately.
    pub fn bind(&self, object: Arc<dyn Bindable>) -> Result<(), AppError> {
        self.shared.bindings.bind(object)?;
        Ok(())
    }

    /// Registers an IPC handler for `key`.
    pub fn dispatch(
        &self,
        key: &str,
        handler: impl Fn(&str) -> Result<(), String> + Send + Sync + 'static,
    ) {
        self.ipc.dispatch(key, Arc::new(handler));
    }

    /// Starts every component and blocks until the primary renderer exits and
    /// every background renderer has finished.
    pub fn run(&self) -> Result<(), AppError> {
        {
            let mut state = lock_unpoisoned(&self.shared.state);
            if *state != AppState::Created {
                return Err(AppError::AlreadyRun);
            }
            *state = AppState::Initializing;
        }

        let _signals = self.install_signals();
        let result = self.start_and_run();

        self.shared.cancel.cancel();
        self.ipc.shutdown();
        self.events.shutdown();
        self.shared.set_state(AppState::Stopped);

        match &result {
            Ok(()) => info!("application stopped"),
            Err(error) => error!(%error, "application stopped with error"),
        }
        result
    }

    fn install_signals(&self) -> Option<platform::SignalHookGuard> {
        if !self.signals {
            return None;
        }
        match platform::install_signal_handlers(self.shared.cancel.clone()) {
            Ok(guard) => Some(guard),
            Err(error) => {
                warn!(%error, "signal handlers unavailable");
                None
            }
        }
    }

    fn start_and_run(&self) -> Result<(), AppError> {
        let renderer: Arc<dyn Renderer> = self.shared.renderer.clone();
        let ipc: Arc<dyn IpcManager> = self.ipc.clone();
        let events: Arc<dyn EventManager> = self.events.clone();
        let bindings: Arc<dyn BindingManager> = self.shared.bindings.clone();
        info!(
            title = %self.config.title,
            renderers = ?self.renderer_names(),
            "starting application"
        );

        renderer
            .initialise(&self.config, Arc::clone(&ipc), Arc::clone(&events))
            .map_err(AppError::Initialise)?;

        events.start(Arc::clone(&renderer))?;

        ipc.bind_renderer(Arc::clone(&renderer));
        ipc.start(Arc::clone(&events), bindings)?;

        let runtime = Runtime::new(events, Arc::clone(&renderer), self.shared.cancel.clone());

        self.shared.bindings.start(renderer, runtime)?;

        self.shared.set_state(AppState::Running);
        self.shared
            .renderer
            .run_supervised(&self.shared.cancel)
            .map_err(|failure| match failure {
                RunFailure::Primary(error) => AppError::PrimaryRenderer(error),
                RunFailure::Background(error) => AppError::BackgroundRenderer(error),
            })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use ui_renderer::{AppConfig, LogLevel, Renderer, RendererError};
    use ui_renderer_mock::{CallLog, MockRenderer, RunScript};

    use super::{App, AppState};
    use crate::config::{BuildMode, EnvConfig};
    use crate::error::AppError;

    fn builder() -> super::AppBuilder {
        App::builder()
            .build_mode(BuildMode::Debug)
            .environment(EnvConfig::default())
            .install_signal_handlers(false)
    }

    #[test]
    fn default_set_is_bridge_then_headless_primary() {
        let app = builder().build().expect("app builds");
        assert_eq!(app.renderer_names(), vec!["bridge", "headless"]);
        assert_eq!(app.state(), AppState::Created);
        assert!(app.take_bridge_client().is_some());
        assert!(app.take_bridge_client().is_none());
    }

    #[test]
    fn release_builds_disable_the_inspector() {
        let app = builder()
            .build_mode(BuildMode::Release)
            .config(AppConfig::default())
            .build()
            .expect("app builds");
        assert!(app.config().disable_inspector);
        assert_eq!(app.config().log_level, LogLevel::Error);
    }

    #[test]
    fn invalid_config_is_rejected_at_build() {
        let error = builder()
            .config(AppConfig {
                width: 0,
                ..AppConfig::default()
            })
            .build()
            .err()
            .expect("zero width");
        assert!(matches!(error, AppError::Config(_)));
    }

    #[test]
    fn run_twice_is_rejected() {
        let app = builder()
            .without_bridge()
            .primary(Arc::new(MockRenderer::new("window", CallLog::new())))
            .build()
            .expect("app builds");

        app.run().expect("first run");
        assert_eq!(app.state(), AppState::Stopped);
        assert!(matches!(app.run(), Err(AppError::AlreadyRun)));
    }

    #[test]
    fn handle_shutdown_stops_a_blocking_primary() {
        let window = Arc::new(
            MockRenderer::new("window", CallLog::new()).with_run(RunScript::UntilStopped),
        );
        let app = builder()
            .primary(window.clone() as Arc<dyn Renderer>)
            .build()
            .expect("app builds");
        let handle = app.handle();

        let stopper = thread::spawn(move || {
            while handle.state() != AppState::Running {
                thread::sleep(Duration::from_millis(2));
            }
            handle.shutdown();
            handle
        });

        assert!(app.run().is_ok());
        let handle = stopper.join().expect("stopper panicked");
        assert!(handle.is_shutdown());
        assert_eq!(handle.state(), AppState::Stopped);
    }

    #[test]
    fn primary_failure_is_reported_as_such() {
        let failure = RendererError::run("window", "display lost");
        let app = builder()
            .primary(Arc::new(
                MockRenderer::new("window", CallLog::new())
                    .with_run(RunScript::Return(Err(failure.clone()))),
            ))
            .build()
            .expect("app builds");

        let error = app.run().expect_err("primary fails");
        assert!(matches!(error, AppError::PrimaryRenderer(_)));
        assert_eq!(error.renderer_error(), Some(&failure));
    }
}
