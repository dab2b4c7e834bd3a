//! Primary renderer used when no native webview is linked.
//!
//! Holds the window state a native surface would own and blocks the calling
//! thread in `run` exactly like a native main loop: until the window is closed
//! or the application is cancelled.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{debug, info, warn};
use ui_renderer::{
    AppConfig, CancelToken, EventData, EventManager, IpcManager, Renderer, RendererError,
};

use crate::config::is_valid_colour;
use crate::sync::lock_unpoisoned;

const NAME: &str = "headless";
const POLL_INTERVAL: Duration = Duration::from_millis(10);
const HISTORY_LIMIT: usize = 256;

/// Point-in-time copy of the window state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowSnapshot {
    pub initialised: bool,
    pub title: String,
    pub colour: String,
    pub fullscreen: bool,
    pub console_enabled: bool,
    pub inspector_disabled: bool,
    pub bindings: Vec<String>,
    pub callbacks: Vec<String>,
    pub events: Vec<EventData>,
}

#[derive(Default)]
struct WindowState {
    initialised: bool,
    title: String,
    colour: String,
    fullscreen: bool,
    console_enabled: bool,
    inspector_disabled: bool,
    bindings: Vec<String>,
    callbacks: VecDeque<String>,
    events: VecDeque<EventData>,
    ipc: Option<Arc<dyn IpcManager>>,
}

#[derive(Default)]
pub struct HeadlessWindow {
    state: Mutex<WindowState>,
    closed: CancelToken,
}

impl HeadlessWindow {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn snapshot(&self) -> WindowSnapshot {
        let state = self.lock_state();
        WindowSnapshot {
            initialised: state.initialised,
            title: state.title.clone(),
            colour: state.colour.clone(),
            fullscreen: state.fullscreen,
            console_enabled: state.console_enabled,
            inspector_disabled: state.inspector_disabled,
            bindings: state.bindings.clone(),
            callbacks: state.callbacks.iter().cloned().collect(),
            events: state.events.iter().cloned().collect(),
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// IPC manager received during `initialise`, for embedders that feed UI
    /// messages in from elsewhere.
    #[must_use]
    pub fn ipc(&self) -> Option<Arc<dyn IpcManager>> {
        self.lock_state().ipc.clone()
    }

    fn lock_state(&self) -> MutexGuard<'_, WindowState> {
        lock_unpoisoned(&self.state)
    }
}

fn push_bounded<T>(history: &mut VecDeque<T>, item: T) {
    if history.len() == HISTORY_LIMIT {
        history.pop_front();
    }
    history.push_back(item);
}

impl Renderer for HeadlessWindow {
    fn name(&self) -> &str {
        NAME
    }

    fn initialise(
        &self,
        config: &AppConfig,
        ipc: Arc<dyn IpcManager>,
        _events: Arc<dyn EventManager>,
    ) -> Result<(), RendererError> {
        if !is_valid_colour(&config.colour) {
            return Err(RendererError::initialise(
                NAME,
                format!("unsupported background colour '{}'", config.colour),
            ));
        }

        let mut state = self.lock_state();
        state.initialised = true;
        state.title = config.title.clone();
        state.colour = config.colour.clone();
        state.inspector_disabled = config.disable_inspector;
        state.ipc = Some(ipc);
        info!(
            renderer = NAME,
            title = %config.title,
            width = config.width,
            height = config.height,
            "window created"
        );
        Ok(())
    }

    fn run(&self, cancel: &CancelToken) -> Result<(), RendererError> {
        if !self.lock_state().initialised {
            return Err(RendererError::Uninitialised {
                renderer: NAME.to_string(),
                operation: "run",
            });
        }

        while !self.closed.is_cancelled() {
            if cancel.wait_timeout(POLL_INTERVAL) {
                debug!(renderer = NAME, "run cancelled");
                return Ok(());
            }
        }
        debug!(renderer = NAME, "window closed");
        Ok(())
    }

    fn new_binding(&self, name: &str) -> Result<(), RendererError> {
        let mut state = self.lock_state();
        if !state.bindings.iter().any(|existing| existing == name) {
            state.bindings.push(name.to_string());
        }
        Ok(())
    }

    fn callback(&self, data: &str) -> Result<(), RendererError> {
        push_bounded(&mut self.lock_state().callbacks, data.to_string());
        Ok(())
    }

    fn notify_event(&self, event: &EventData) -> Result<(), RendererError> {
        push_bounded(&mut self.lock_state().events, event.clone());
        Ok(())
    }

    fn select_file(&self) -> Option<String> {
        None
    }

    fn select_directory(&self) -> Option<String> {
        None
    }

    fn select_save_file(&self) -> Option<String> {
        None
    }

    fn set_colour(&self, colour: &str) -> Result<(), RendererError> {
        if !is_valid_colour(colour) {
            return Err(RendererError::operation(
                NAME,
                "set_colour",
                format!("unsupported colour '{colour}'"),
            ));
        }
        self.lock_state().colour = colour.to_string();
        Ok(())
    }

    fn enable_console(&self) {
        let mut state = self.lock_state();
        if state.inspector_disabled {
            warn!(renderer = NAME, "console requested while the inspector is disabled");
            return;
        }
        state.console_enabled = true;
    }

    fn fullscreen(&self) {
        self.lock_state().fullscreen = true;
    }

    fn unfullscreen(&self) {
        self.lock_state().fullscreen = false;
    }

    fn set_title(&self, title: &str) {
        self.lock_state().title = title.to_string();
    }

    fn close(&self) {
        self.closed.cancel();
    }
}
