//! Event manager: ordered delivery of events to backend listeners and to the
//! renderer set.

use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use serde_json::Value;
use tracing::{debug, trace, warn};
use ui_renderer::{EventData, EventHandler, EventManager, Renderer, StartError};

use crate::sync::lock_unpoisoned;

const COMPONENT: &str = "event hub";

#[derive(Default)]
struct QueueState {
    pending: VecDeque<EventData>,
    started: bool,
    stopping: bool,
}

#[derive(Default)]
struct Shared {
    queue: Mutex<QueueState>,
    cvar: Condvar,
    listeners: Mutex<HashMap<String, Vec<EventHandler>>>,
    ui_subscriptions: Mutex<HashSet<String>>,
    renderer: Mutex<Option<Arc<dyn Renderer>>>,
}

impl Shared {
    /// Blocks for the next event; `None` once stopping with an empty queue.
    fn next_event(&self) -> Option<EventData> {
        let mut queue = lock_unpoisoned(&self.queue);
        loop {
            if let Some(event) = queue.pending.pop_front() {
                return Some(event);
            }
            if queue.stopping {
                return None;
            }
            queue = self
                .cvar
                .wait(queue)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    fn deliver(&self, event: &EventData) {
        let handlers = lock_unpoisoned(&self.listeners)
            .get(&event.name)
            .cloned()
            .unwrap_or_default();
        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                warn!(event = %event.name, "event listener panicked");
            }
        }

        let renderer = lock_unpoisoned(&self.renderer).clone();
        if let Some(renderer) = renderer {
            if let Err(error) = renderer.notify_event(event) {
                warn!(event = %event.name, %error, "event broadcast failed");
            }
        }
    }

    fn run(&self) {
        while let Some(event) = self.next_event() {
            self.deliver(&event);
        }
        debug!("event delivery stopped");
    }
}

/// Queues events and delivers them one at a time, in push order, on a
/// dedicated thread.
///
/// Events pushed before [`EventManager::start`] are held and delivered once
/// delivery begins. Every event reaches the whole renderer set; UI
/// subscriptions are recorded for renderers to consult and never filter
/// delivery.
#[derive(Default)]
pub struct EventHub {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl EventHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience for `push(EventData::new(name, data))`.
    pub fn emit(&self, name: &str, data: impl Into<Value>) {
        self.push(EventData::new(name, data));
    }

    /// Events queued but not yet delivered.
    #[must_use]
    pub fn pending(&self) -> usize {
        lock_unpoisoned(&self.shared.queue).pending.len()
    }

    /// Whether any UI surface has asked for `name`.
    #[must_use]
    pub fn is_subscribed(&self, name: &str) -> bool {
        lock_unpoisoned(&self.shared.ui_subscriptions).contains(name)
    }

    #[must_use]
    pub fn ui_subscriptions(&self) -> Vec<String> {
        let mut names: Vec<String> = lock_unpoisoned(&self.shared.ui_subscriptions)
            .iter()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

impl EventManager for EventHub {
    fn start(&self, renderer: Arc<dyn Renderer>) -> Result<(), StartError> {
        {
            let mut queue = lock_unpoisoned(&self.shared.queue);
            if queue.started {
                return Err(StartError::AlreadyStarted {
                    component: COMPONENT,
                });
            }
            queue.started = true;
        }
        *lock_unpoisoned(&self.shared.renderer) = Some(renderer);

        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("event-hub".to_string())
            .spawn(move || shared.run())
            .map_err(|error| {
                lock_unpoisoned(&self.shared.queue).started = false;
                StartError::Spawn {
                    component: COMPONENT,
                    message: error.to_string(),
                }
            })?;
        *lock_unpoisoned(&self.worker) = Some(handle);
        debug!("event delivery started");
        Ok(())
    }

    fn push(&self, event: EventData) {
        let mut queue = lock_unpoisoned(&self.shared.queue);
        if queue.stopping {
            debug!(event = %event.name, "event hub stopped; event dropped");
            return;
        }
        trace!(event = %event.name, "event queued");
        queue.pending.push_back(event);
        self.shared.cvar.notify_one();
    }

    fn on(&self, name: &str, handler: EventHandler) {
        lock_unpoisoned(&self.shared.listeners)
            .entry(name.to_string())
            .or_default()
            .push(handler);
    }

    fn off(&self, name: &str) {
        lock_unpoisoned(&self.shared.listeners).remove(name);
    }

    fn subscribe(&self, name: &str) {
        debug!(event = name, "UI subscribed");
        lock_unpoisoned(&self.shared.ui_subscriptions).insert(name.to_string());
    }

    fn unsubscribe(&self, name: &str) {
        debug!(event = name, "UI unsubscribed");
        lock_unpoisoned(&self.shared.ui_subscriptions).remove(name);
    }

    fn shutdown(&self) {
        {
            let mut queue = lock_unpoisoned(&self.shared.queue);
            queue.stopping = true;
            self.shared.cvar.notify_all();
        }
        let worker = lock_unpoisoned(&self.worker).take();
        if let Some(worker) = worker {
            if worker.thread().id() == thread::current().id() {
                return;
            }
            if worker.join().is_err() {
                warn!("event delivery thread panicked");
            }
        }
    }
}

impl Drop for EventHub {
    fn drop(&mut self) {
        self.shutdown();
    }
}
