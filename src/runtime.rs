//! Façade handed to bound objects once the application is running.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use ui_renderer::{CancelToken, EventData, EventManager, Renderer, RendererError};

/// Cloneable handle over the event manager, the fan-out renderer and the
/// application cancellation token.
#[derive(Clone)]
pub struct Runtime {
    events: Arc<dyn EventManager>,
    renderer: Arc<dyn Renderer>,
    cancel: CancelToken,
}

impl Runtime {
    #[must_use]
    pub fn new(
        events: Arc<dyn EventManager>,
        renderer: Arc<dyn Renderer>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            events,
            renderer,
            cancel,
        }
    }

    /// Queues an event for listeners and renderers.
    pub fn emit(&self, name: &str, data: impl Into<Value>) {
        self.events.push(EventData::new(name, data));
    }

    /// Registers a backend listener for `name`.
    pub fn on(&self, name: &str, handler: impl Fn(&EventData) + Send + Sync + 'static) {
        self.events.on(name, Arc::new(handler));
    }

    pub fn off(&self, name: &str) {
        self.events.off(name);
    }

    pub fn set_title(&self, title: &str) {
        self.renderer.set_title(title);
    }

    pub fn set_colour(&self, colour: &str) -> Result<(), RendererError> {
        self.renderer.set_colour(colour)
    }

    pub fn fullscreen(&self) {
        self.renderer.fullscreen();
    }

    pub fn unfullscreen(&self) {
        self.renderer.unfullscreen();
    }

    pub fn enable_console(&self) {
        self.renderer.enable_console();
    }

    pub fn close(&self) {
        self.renderer.close();
    }

    #[must_use]
    pub fn select_file(&self) -> Option<String> {
        self.renderer.select_file()
    }

    #[must_use]
    pub fn select_directory(&self) -> Option<String> {
        self.renderer.select_directory()
    }

    #[must_use]
    pub fn select_save_file(&self) -> Option<String> {
        self.renderer.select_save_file()
    }

    /// Stops the application: fires the cancellation token and closes every
    /// renderer.
    pub fn quit(&self) {
        self.cancel.cancel();
        self.renderer.close();
    }

    #[must_use]
    pub fn is_quitting(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("renderer", &self.renderer.name())
            .field("cancel", &self.cancel)
            .finish_non_exhaustive()
    }
}
