//! Renderer and manager contract shared by the `tandem` core and every
//! rendering surface that plugs into it.
//!
//! This crate intentionally defines only the capability surface a renderer
//! exposes and the manager seams a renderer talks back through. It excludes
//! native windowing, transport framing, and binding marshalling concerns.

mod cancel;
mod config;
mod error;
mod message;

use std::sync::Arc;

use serde_json::Value;

pub use cancel::CancelToken;
pub use config::{AppConfig, LogLevel, ParseLogLevelError};
pub use error::{RendererError, StartError};
pub use message::{CallbackFunc, EventData, EventHandler, IpcMessage};

/// One rendering surface.
///
/// Every method takes `&self`: the orchestrator, the event manager and the IPC
/// dispatch loop may call into the same renderer concurrently, so
/// implementations synchronize their own state.
pub trait Renderer: Send + Sync + 'static {
    /// Stable name used in logs and error messages.
    fn name(&self) -> &str;

    /// Acquires native resources and wires the renderer to the managers.
    fn initialise(
        &self,
        config: &AppConfig,
        ipc: Arc<dyn IpcManager>,
        events: Arc<dyn EventManager>,
    ) -> Result<(), RendererError>;

    /// Runs the renderer loop until the surface exits or `cancel` fires.
    fn run(&self, cancel: &CancelToken) -> Result<(), RendererError>;

    /// Exposes a backend binding (`Object.method`) to the UI layer.
    fn new_binding(&self, name: &str) -> Result<(), RendererError>;

    /// Delivers a serialized call result back to the UI layer.
    fn callback(&self, data: &str) -> Result<(), RendererError>;

    /// Delivers a backend-originated event to the UI layer.
    fn notify_event(&self, event: &EventData) -> Result<(), RendererError>;

    /// `None` means the surface presented no chooser or the user cancelled.
    fn select_file(&self) -> Option<String>;

    fn select_directory(&self) -> Option<String>;

    fn select_save_file(&self) -> Option<String>;

    fn set_colour(&self, colour: &str) -> Result<(), RendererError>;

    fn enable_console(&self);

    fn fullscreen(&self);

    fn unfullscreen(&self);

    fn set_title(&self, title: &str);

    fn close(&self);
}

/// Routes inbound UI-originated messages to registered handlers.
pub trait IpcManager: Send + Sync + 'static {
    /// Registers a renderer as a message source and reply target.
    fn bind_renderer(&self, renderer: Arc<dyn Renderer>);

    /// Registers `handler` for inbound messages keyed `message`.
    ///
    /// Keys are unique; registering an existing key replaces its handler.
    fn dispatch(&self, message: &str, handler: CallbackFunc);

    /// Activates the dispatch loop.
    fn start(
        &self,
        events: Arc<dyn EventManager>,
        bindings: Arc<dyn BindingManager>,
    ) -> Result<(), StartError>;

    /// Queues one inbound message. Messages sent before `start` are buffered.
    fn send(&self, message: IpcMessage);

    /// Stops the dispatch loop. Idempotent.
    fn shutdown(&self);
}

/// Broadcasts backend-originated events to the renderer set.
pub trait EventManager: Send + Sync + 'static {
    /// Retains the renderer every event is delivered to and starts delivery.
    fn start(&self, renderer: Arc<dyn Renderer>) -> Result<(), StartError>;

    /// Queues an event. Delivery preserves push order.
    fn push(&self, event: EventData);

    /// Registers a backend listener for `name`.
    fn on(&self, name: &str, handler: EventHandler);

    /// Removes every backend listener for `name`.
    fn off(&self, name: &str);

    /// Records a UI-originated subscription request.
    fn subscribe(&self, name: &str);

    /// Records a UI-originated unsubscribe request.
    fn unsubscribe(&self, name: &str);

    /// Stops delivery after draining queued events. Idempotent.
    fn shutdown(&self);
}

/// Resolves UI-originated calls against registered backend bindings.
pub trait BindingManager: Send + Sync + 'static {
    /// Invokes the binding registered as `name` (`Object.method`).
    fn call(&self, name: &str, args: &[Value]) -> Result<Value, String>;

    /// Returns every exposed binding name in registration order.
    fn binding_names(&self) -> Vec<String>;
}
