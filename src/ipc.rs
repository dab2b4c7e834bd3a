//! IPC manager: routes UI-originated messages to built-in routes and to
//! handlers registered with [`IpcManager::dispatch`].

use std::collections::{HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, trace, warn};
use ui_renderer::{
    BindingManager, CallbackFunc, EventData, EventManager, IpcManager, IpcMessage, Renderer,
    RendererError, StartError,
};

use crate::sync::lock_unpoisoned;

const COMPONENT: &str = "ipc dispatcher";

pub const CALL_KEY: &str = "call";
pub const EVENT_KEY: &str = "event";
pub const SUBSCRIBE_KEY: &str = "event:subscribe";
pub const UNSUBSCRIBE_KEY: &str = "event:unsubscribe";

const BUILT_IN_KEYS: [&str; 4] = [CALL_KEY, EVENT_KEY, SUBSCRIBE_KEY, UNSUBSCRIBE_KEY];

#[derive(Debug, Error)]
pub enum IpcError {
    #[error("no handler registered for message '{key}'")]
    UnknownMessage { key: String },

    #[error("invalid payload for '{key}': {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid payload for '{key}': {message}")]
    InvalidPayload { key: String, message: String },

    #[error("handler for '{key}' failed: {message}")]
    Handler { key: String, message: String },

    #[error("handler for '{key}' panicked")]
    Panicked { key: String },

    #[error("failed to encode reply for '{callback_id}': {source}")]
    Encode {
        callback_id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("'{key}' arrived before the managers were attached")]
    NotStarted { key: String },

    #[error("failed to deliver reply for '{callback_id}': {source}")]
    Reply {
        callback_id: String,
        #[source]
        source: RendererError,
    },
}

impl IpcError {
    fn decode(key: &str, source: serde_json::Error) -> Self {
        Self::Decode {
            key: key.to_string(),
            source,
        }
    }

    fn invalid(key: &str, message: impl Into<String>) -> Self {
        Self::InvalidPayload {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

/// Payload of the built-in `call` route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRequest {
    pub name: String,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub callback_id: Option<String>,
}

/// Reply delivered through [`Renderer::callback`] for a `call` carrying a
/// `callback_id`. Exactly one of `result` and `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallReply {
    pub callback_id: String,
    pub result: Option<Value>,
    pub error: Option<String>,
}

impl CallReply {
    fn from_outcome(callback_id: String, outcome: Result<Value, String>) -> Self {
        match outcome {
            Ok(result) => Self {
                callback_id,
                result: Some(result),
                error: None,
            },
            Err(error) => Self {
                callback_id,
                result: None,
                error: Some(error),
            },
        }
    }
}

#[derive(Default)]
struct DispatchState {
    queue: VecDeque<IpcMessage>,
    started: bool,
    stopping: bool,
}

#[derive(Default)]
struct Shared {
    state: Mutex<DispatchState>,
    cvar: Condvar,
    handlers: Mutex<HashMap<String, CallbackFunc>>,
    renderers: Mutex<Vec<Arc<dyn Renderer>>>,
    events: Mutex<Option<Arc<dyn EventManager>>>,
    bindings: Mutex<Option<Arc<dyn BindingManager>>>,
}

impl Shared {
    fn next_message(&self) -> Option<IpcMessage> {
        let mut state = lock_unpoisoned(&self.state);
        loop {
            if let Some(message) = state.queue.pop_front() {
                return Some(message);
            }
            if state.stopping {
                return None;
            }
            state = self
                .cvar
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    fn run(&self) {
        while let Some(message) = self.next_message() {
            if let Err(error) = self.handle_guarded(&message) {
                warn!(key = %message.key, %error, "ipc message dropped");
            }
        }
        debug!("ipc dispatch stopped");
    }

    /// Like [`Shared::handle`], but a panicking handler or binding becomes
    /// [`IpcError::Panicked`] instead of unwinding out of the loop.
    fn handle_guarded(&self, message: &IpcMessage) -> Result<(), IpcError> {
        catch_unwind(AssertUnwindSafe(|| self.handle(message))).unwrap_or_else(|_| {
            Err(IpcError::Panicked {
                key: message.key.clone(),
            })
        })
    }

    fn handle(&self, message: &IpcMessage) -> Result<(), IpcError> {
        trace!(key = %message.key, "dispatching ipc message");
        match message.key.as_str() {
            CALL_KEY => self.handle_call(&message.payload),
            EVENT_KEY => {
                let event: EventData = serde_json::from_str(&message.payload)
                    .map_err(|source| IpcError::decode(EVENT_KEY, source))?;
                self.event_manager(EVENT_KEY)?.push(event);
                Ok(())
            }
            SUBSCRIBE_KEY => {
                let name = event_name(SUBSCRIBE_KEY, &message.payload)?;
                self.event_manager(SUBSCRIBE_KEY)?.subscribe(&name);
                Ok(())
            }
            UNSUBSCRIBE_KEY => {
                let name = event_name(UNSUBSCRIBE_KEY, &message.payload)?;
                self.event_manager(UNSUBSCRIBE_KEY)?.unsubscribe(&name);
                Ok(())
            }
            key => {
                let handler = lock_unpoisoned(&self.handlers)
                    .get(key)
                    .cloned()
                    .ok_or_else(|| IpcError::UnknownMessage {
                        key: key.to_string(),
                    })?;
                handler(&message.payload).map_err(|message| IpcError::Handler {
                    key: key.to_string(),
                    message,
                })
            }
        }
    }

    fn handle_call(&self, payload: &str) -> Result<(), IpcError> {
        let request: CallRequest =
            serde_json::from_str(payload).map_err(|source| IpcError::decode(CALL_KEY, source))?;
        let bindings = lock_unpoisoned(&self.bindings)
            .clone()
            .ok_or_else(|| IpcError::NotStarted {
                key: CALL_KEY.to_string(),
            })?;

        let outcome = bindings.call(&request.name, &request.args);
        if let Err(error) = &outcome {
            debug!(binding = %request.name, %error, "binding call failed");
        }

        let Some(callback_id) = request.callback_id else {
            return Ok(());
        };
        let reply = CallReply::from_outcome(callback_id, outcome);
        let encoded = serde_json::to_string(&reply).map_err(|source| IpcError::Encode {
            callback_id: reply.callback_id.clone(),
            source,
        })?;

        let renderers = lock_unpoisoned(&self.renderers).clone();
        for renderer in renderers {
            renderer
                .callback(&encoded)
                .map_err(|source| IpcError::Reply {
                    callback_id: reply.callback_id.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    fn event_manager(&self, key: &str) -> Result<Arc<dyn EventManager>, IpcError> {
        lock_unpoisoned(&self.events)
            .clone()
            .ok_or_else(|| IpcError::NotStarted {
                key: key.to_string(),
            })
    }
}

/// Accepts either a bare event name or a JSON string.
fn event_name(key: &str, payload: &str) -> Result<String, IpcError> {
    let trimmed = payload.trim();
    let name = if trimmed.starts_with('"') {
        serde_json::from_str::<String>(trimmed).map_err(|source| IpcError::decode(key, source))?
    } else {
        trimmed.to_string()
    };
    if name.is_empty() {
        return Err(IpcError::invalid(key, "event name is empty"));
    }
    Ok(name)
}

/// Queue-backed [`IpcManager`] with a single dispatch thread.
///
/// Messages are handled strictly in arrival order. A failing message is
/// logged and dropped; the loop keeps running.
#[derive(Default)]
pub struct IpcDispatcher {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl IpcDispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages received but not yet dispatched.
    #[must_use]
    pub fn pending(&self) -> usize {
        lock_unpoisoned(&self.shared.state).queue.len()
    }

    /// Handles one message on the calling thread, bypassing the queue.
    pub fn handle_message(&self, message: &IpcMessage) -> Result<(), IpcError> {
        self.shared.handle_guarded(message)
    }

    #[must_use]
    pub fn registered_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = lock_unpoisoned(&self.shared.handlers)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

impl IpcManager for IpcDispatcher {
    fn bind_renderer(&self, renderer: Arc<dyn Renderer>) {
        debug!(renderer = renderer.name(), "renderer bound to ipc");
        lock_unpoisoned(&self.shared.renderers).push(renderer);
    }

    fn dispatch(&self, message: &str, handler: CallbackFunc) {
        if BUILT_IN_KEYS.contains(&message) {
            warn!(key = message, "handler shadowed by built-in route");
        }
        let replaced = lock_unpoisoned(&self.shared.handlers)
            .insert(message.to_string(), handler)
            .is_some();
        if replaced {
            warn!(key = message, "ipc handler replaced");
        }
    }

    fn start(
        &self,
        events: Arc<dyn EventManager>,
        bindings: Arc<dyn BindingManager>,
    ) -> Result<(), StartError> {
        {
            let mut state = lock_unpoisoned(&self.shared.state);
            if state.started {
                return Err(StartError::AlreadyStarted {
                    component: COMPONENT,
                });
            }
            state.started = true;
        }
        *lock_unpoisoned(&self.shared.events) = Some(events);
        *lock_unpoisoned(&self.shared.bindings) = Some(bindings);

        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("ipc-dispatch".to_string())
            .spawn(move || shared.run())
            .map_err(|error| {
                lock_unpoisoned(&self.shared.state).started = false;
                StartError::Spawn {
                    component: COMPONENT,
                    message: error.to_string(),
                }
            })?;
        *lock_unpoisoned(&self.worker) = Some(handle);
        debug!("ipc dispatch started");
        Ok(())
    }

    fn send(&self, message: IpcMessage) {
        let mut state = lock_unpoisoned(&self.shared.state);
        if state.stopping {
            debug!(key = %message.key, "ipc stopped; message dropped");
            return;
        }
        state.queue.push_back(message);
        self.shared.cvar.notify_one();
    }

    fn shutdown(&self) {
        {
            let mut state = lock_unpoisoned(&self.shared.state);
            state.stopping = true;
            self.shared.cvar.notify_all();
        }
        let worker = lock_unpoisoned(&self.worker).take();
        if let Some(worker) = worker {
            if worker.thread().id() == thread::current().id() {
                return;
            }
            if worker.join().is_err() {
                warn!("ipc dispatch thread panicked");
            }
        }
    }
}

impl Drop for IpcDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}
