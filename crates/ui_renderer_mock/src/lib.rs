//! Deterministic, call-recording implementation of the `ui_renderer`
//! contract.
//!
//! This crate contains no windowing or transport logic and is intended for
//! local development and contract-level integration testing. Several mocks can
//! share one [`CallLog`] so tests can assert cross-renderer ordering.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use ui_renderer::{
    AppConfig, CancelToken, EventData, EventManager, IpcManager, IpcMessage, Renderer,
    RendererError,
};

const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// One recorded renderer invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub renderer: String,
    pub operation: &'static str,
    pub argument: Option<String>,
}

/// Ordered, shareable record of calls across any number of mocks.
#[derive(Debug, Default)]
pub struct CallLog {
    calls: Mutex<Vec<Call>>,
}

impl CallLog {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn record(&self, renderer: &str, operation: &'static str, argument: Option<String>) {
        lock_unpoisoned(&self.calls).push(Call {
            renderer: renderer.to_string(),
            operation,
            argument,
        });
    }

    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        lock_unpoisoned(&self.calls).clone()
    }

    /// Names of the renderers that received `operation`, in call order.
    #[must_use]
    pub fn renderers_for(&self, operation: &str) -> Vec<String> {
        lock_unpoisoned(&self.calls)
            .iter()
            .filter(|call| call.operation == operation)
            .map(|call| call.renderer.clone())
            .collect()
    }

    /// `renderer.operation` labels in call order.
    #[must_use]
    pub fn labels(&self) -> Vec<String> {
        lock_unpoisoned(&self.calls)
            .iter()
            .map(|call| format!("{}.{}", call.renderer, call.operation))
            .collect()
    }
}

/// Scripted behavior of [`Renderer::run`].
#[derive(Debug, Clone)]
pub enum RunScript {
    /// Return `result` immediately.
    Return(Result<(), RendererError>),
    /// Sleep for the duration (or until cancelled), then return `result`.
    Sleep(Duration, Result<(), RendererError>),
    /// Block until the cancellation token fires or `close` is called.
    UntilStopped,
}

/// Timing and thread observations of one `run` call.
#[derive(Debug, Clone, Copy)]
pub struct RunObservation {
    pub thread: ThreadId,
    pub started: Instant,
    pub finished: Option<Instant>,
}

#[derive(Default)]
struct MockState {
    initialised: bool,
    ipc: Option<Arc<dyn IpcManager>>,
    events: Option<Arc<dyn EventManager>>,
    config: Option<AppConfig>,
    run: Option<RunObservation>,
    bindings: Vec<String>,
    callbacks: Vec<String>,
    notified: Vec<EventData>,
    title: Option<String>,
    colour: Option<String>,
    fullscreen: bool,
    console_enabled: bool,
}

/// Scripted renderer that records every call it receives.
pub struct MockRenderer {
    name: String,
    log: Arc<CallLog>,
    run_script: RunScript,
    initialise_error: Option<RendererError>,
    operation_errors: HashMap<&'static str, RendererError>,
    selections: HashMap<&'static str, String>,
    closed: CancelToken,
    state: Mutex<MockState>,
}

impl MockRenderer {
    /// Creates a mock that succeeds everywhere and whose `run` returns at once.
    #[must_use]
    pub fn new(name: impl Into<String>, log: Arc<CallLog>) -> Self {
        Self {
            name: name.into(),
            log,
            run_script: RunScript::Return(Ok(())),
            initialise_error: None,
            operation_errors: HashMap::new(),
            selections: HashMap::new(),
            closed: CancelToken::new(),
            state: Mutex::new(MockState::default()),
        }
    }

    #[must_use]
    pub fn with_run(mut self, script: RunScript) -> Self {
        self.run_script = script;
        self
    }

    #[must_use]
    pub fn failing_initialise(mut self, message: &str) -> Self {
        self.initialise_error = Some(RendererError::initialise(&self.name, message));
        self
    }

    /// Makes `operation` (`new_binding`, `callback`, `notify_event` or
    /// `set_colour`) fail with `message`.
    #[must_use]
    pub fn failing(mut self, operation: &'static str, message: &str) -> Self {
        let error = RendererError::operation(&self.name, operation, message);
        self.operation_errors.insert(operation, error);
        self
    }

    /// Scripts the result of `select_file`, `select_directory` or
    /// `select_save_file`. An empty string behaves as no selection.
    #[must_use]
    pub fn selecting(mut self, operation: &'static str, value: &str) -> Self {
        self.selections.insert(operation, value.to_string());
        self
    }

    #[must_use]
    pub fn initialise_error(&self) -> Option<RendererError> {
        self.initialise_error.clone()
    }

    #[must_use]
    pub fn operation_error(&self, operation: &str) -> Option<RendererError> {
        self.operation_errors.get(operation).cloned()
    }

    #[must_use]
    pub fn is_initialised(&self) -> bool {
        self.lock_state().initialised
    }

    #[must_use]
    pub fn config(&self) -> Option<AppConfig> {
        self.lock_state().config.clone()
    }

    #[must_use]
    pub fn run_observation(&self) -> Option<RunObservation> {
        self.lock_state().run
    }

    #[must_use]
    pub fn bindings(&self) -> Vec<String> {
        self.lock_state().bindings.clone()
    }

    #[must_use]
    pub fn callbacks(&self) -> Vec<String> {
        self.lock_state().callbacks.clone()
    }

    #[must_use]
    pub fn notified(&self) -> Vec<EventData> {
        self.lock_state().notified.clone()
    }

    #[must_use]
    pub fn title(&self) -> Option<String> {
        self.lock_state().title.clone()
    }

    #[must_use]
    pub fn colour(&self) -> Option<String> {
        self.lock_state().colour.clone()
    }

    #[must_use]
    pub fn is_fullscreen(&self) -> bool {
        self.lock_state().fullscreen
    }

    #[must_use]
    pub fn console_enabled(&self) -> bool {
        self.lock_state().console_enabled
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Simulates the UI layer sending `message` through the IPC manager
    /// received during `initialise`.
    pub fn send_ipc(&self, message: IpcMessage) -> Result<(), RendererError> {
        let ipc = self.lock_state().ipc.clone();
        match ipc {
            Some(ipc) => {
                ipc.send(message);
                Ok(())
            }
            None => Err(RendererError::Uninitialised {
                renderer: self.name.clone(),
                operation: "send_ipc",
            }),
        }
    }

    /// Simulates the UI layer emitting an event through the event manager
    /// received during `initialise`.
    pub fn emit_event(&self, event: EventData) -> Result<(), RendererError> {
        let events = self.lock_state().events.clone();
        match events {
            Some(events) => {
                events.push(event);
                Ok(())
            }
            None => Err(RendererError::Uninitialised {
                renderer: self.name.clone(),
                operation: "emit_event",
            }),
        }
    }

    fn scripted(&self, operation: &'static str) -> Result<(), RendererError> {
        match self.operation_errors.get(operation) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn selection(&self, operation: &'static str) -> Option<String> {
        self.log.record(&self.name, operation, None);
        self.selections
            .get(operation)
            .filter(|value| !value.is_empty())
            .cloned()
    }

    fn wait_stopped(&self, cancel: &CancelToken, limit: Option<Duration>) {
        let started = Instant::now();
        while !cancel.is_cancelled() && !self.closed.is_cancelled() {
            if let Some(limit) = limit {
                if started.elapsed() >= limit {
                    return;
                }
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, MockState> {
        lock_unpoisoned(&self.state)
    }
}

impl Renderer for MockRenderer {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialise(
        &self,
        config: &AppConfig,
        ipc: Arc<dyn IpcManager>,
        events: Arc<dyn EventManager>,
    ) -> Result<(), RendererError> {
        self.log.record(&self.name, "initialise", None);
        if let Some(error) = &self.initialise_error {
            return Err(error.clone());
        }

        let mut state = self.lock_state();
        state.initialised = true;
        state.config = Some(config.clone());
        state.ipc = Some(ipc);
        state.events = Some(events);
        Ok(())
    }

    fn run(&self, cancel: &CancelToken) -> Result<(), RendererError> {
        self.log.record(&self.name, "run", None);
        self.lock_state().run = Some(RunObservation {
            thread: thread::current().id(),
            started: Instant::now(),
            finished: None,
        });

        let result = match &self.run_script {
            RunScript::Return(result) => result.clone(),
            RunScript::Sleep(duration, result) => {
                self.wait_stopped(cancel, Some(*duration));
                result.clone()
            }
            RunScript::UntilStopped => {
                self.wait_stopped(cancel, None);
                Ok(())
            }
        };

        if let Some(run) = self.lock_state().run.as_mut() {
            run.finished = Some(Instant::now());
        }
        result
    }

    fn new_binding(&self, name: &str) -> Result<(), RendererError> {
        self.log
            .record(&self.name, "new_binding", Some(name.to_string()));
        self.scripted("new_binding")?;
        self.lock_state().bindings.push(name.to_string());
        Ok(())
    }

    fn callback(&self, data: &str) -> Result<(), RendererError> {
        self.log.record(&self.name, "callback", Some(data.to_string()));
        self.scripted("callback")?;
        self.lock_state().callbacks.push(data.to_string());
        Ok(())
    }

    fn notify_event(&self, event: &EventData) -> Result<(), RendererError> {
        self.log
            .record(&self.name, "notify_event", Some(event.name.clone()));
        self.scripted("notify_event")?;
        self.lock_state().notified.push(event.clone());
        Ok(())
    }

    fn select_file(&self) -> Option<String> {
        self.selection("select_file")
    }

    fn select_directory(&self) -> Option<String> {
        self.selection("select_directory")
    }

    fn select_save_file(&self) -> Option<String> {
        self.selection("select_save_file")
    }

    fn set_colour(&self, colour: &str) -> Result<(), RendererError> {
        self.log
            .record(&self.name, "set_colour", Some(colour.to_string()));
        self.scripted("set_colour")?;
        self.lock_state().colour = Some(colour.to_string());
        Ok(())
    }

    fn enable_console(&self) {
        self.log.record(&self.name, "enable_console", None);
        self.lock_state().console_enabled = true;
    }

    fn fullscreen(&self) {
        self.log.record(&self.name, "fullscreen", None);
        self.lock_state().fullscreen = true;
    }

    fn unfullscreen(&self) {
        self.log.record(&self.name, "unfullscreen", None);
        self.lock_state().fullscreen = false;
    }

    fn set_title(&self, title: &str) {
        self.log
            .record(&self.name, "set_title", Some(title.to_string()));
        self.lock_state().title = Some(title.to_string());
    }

    fn close(&self) {
        self.log.record(&self.name, "close", None);
        self.closed.cancel();
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
