//! Binding manager: backend objects exposed to the UI as `Name.method`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};
use ui_renderer::{BindingManager, Renderer, RendererError};

use crate::runtime::Runtime;
use crate::sync::lock_unpoisoned;

/// A backend object whose methods the UI may call.
pub trait Bindable: Send + Sync + 'static {
    /// Registration key. Must be non-empty and free of `.`.
    fn name(&self) -> &str;

    /// Method names exposed as `Name.method`, in broadcast order.
    fn methods(&self) -> Vec<String>;

    fn invoke(&self, method: &str, args: &[Value]) -> Result<Value, String>;

    /// Called once the runtime exists, before the object's bindings are
    /// broadcast.
    fn on_start(&self, _runtime: &Runtime) -> Result<(), String> {
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum BindingError {
    #[error("invalid binding name '{0}'")]
    InvalidName(String),

    #[error("binding '{name}' failed to start: {message}")]
    Startup { name: String, message: String },

    #[error("failed to expose binding '{binding}': {source}")]
    Broadcast {
        binding: String,
        #[source]
        source: RendererError,
    },

    #[error("binding manager already started")]
    AlreadyStarted,
}

struct Running {
    renderer: Arc<dyn Renderer>,
    runtime: Runtime,
}

#[derive(Default)]
struct Registry {
    order: Vec<String>,
    objects: HashMap<String, Arc<dyn Bindable>>,
    running: Option<Running>,
}

/// Ordered registry of bound objects.
///
/// Re-binding a name replaces the object but keeps its original position.
#[derive(Default)]
pub struct BindingRegistry {
    registry: Mutex<Registry>,
}

impl BindingRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `object`; once started, it is started and broadcast
    /// immediately. A late bind that fails leaves the registry as it was.
    pub fn bind(&self, object: Arc<dyn Bindable>) -> Result<(), BindingError> {
        let name = object.name().to_string();
        if name.is_empty() || name.contains('.') {
            return Err(BindingError::InvalidName(name));
        }

        let (renderer, runtime) = {
            let mut registry = lock_unpoisoned(&self.registry);
            match registry.running.as_ref() {
                Some(running) => (Arc::clone(&running.renderer), running.runtime.clone()),
                None => {
                    registry.insert(name, object);
                    return Ok(());
                }
            }
        };

        start_object(object.as_ref(), &runtime)?;
        let previous = lock_unpoisoned(&self.registry).insert(name.clone(), Arc::clone(&object));
        if let Err(error) = broadcast_object(object.as_ref(), renderer.as_ref()) {
            lock_unpoisoned(&self.registry).restore(&name, previous);
            return Err(error);
        }
        Ok(())
    }

    /// Starts every registered object, then broadcasts every binding in
    /// registration order. Fails fast.
    pub fn start(&self, renderer: Arc<dyn Renderer>, runtime: Runtime) -> Result<(), BindingError> {
        let objects = {
            let mut registry = lock_unpoisoned(&self.registry);
            if registry.running.is_some() {
                return Err(BindingError::AlreadyStarted);
            }
            registry.running = Some(Running {
                renderer: Arc::clone(&renderer),
                runtime: runtime.clone(),
            });
            ordered(&registry)
        };

        for object in &objects {
            start_object(object.as_ref(), &runtime)?;
        }
        for object in &objects {
            broadcast_object(object.as_ref(), renderer.as_ref())?;
        }
        info!(objects = objects.len(), "bindings exposed");
        Ok(())
    }

    #[must_use]
    pub fn is_started(&self) -> bool {
        lock_unpoisoned(&self.registry).running.is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        lock_unpoisoned(&self.registry).order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Registry {
    /// Inserts or replaces `name`, returning the object it displaced.
    fn insert(&mut self, name: String, object: Arc<dyn Bindable>) -> Option<Arc<dyn Bindable>> {
        let previous = self.objects.insert(name.clone(), object);
        if previous.is_some() {
            debug!(binding = %name, "binding replaced");
        } else {
            self.order.push(name);
        }
        previous
    }

    /// Undoes an [`Registry::insert`] of `name`.
    fn restore(&mut self, name: &str, previous: Option<Arc<dyn Bindable>>) {
        match previous {
            Some(previous) => {
                self.objects.insert(name.to_string(), previous);
            }
            None => {
                self.objects.remove(name);
                self.order.retain(|existing| existing != name);
            }
        }
    }
}

fn ordered(registry: &Registry) -> Vec<Arc<dyn Bindable>> {
    registry
        .order
        .iter()
        .filter_map(|name| registry.objects.get(name).cloned())
        .collect()
}

fn qualified(object: &dyn Bindable, method: &str) -> String {
    format!("{}.{method}", object.name())
}

fn start_object(object: &dyn Bindable, runtime: &Runtime) -> Result<(), BindingError> {
    object
        .on_start(runtime)
        .map_err(|message| BindingError::Startup {
            name: object.name().to_string(),
            message,
        })
}

fn broadcast_object(object: &dyn Bindable, renderer: &dyn Renderer) -> Result<(), BindingError> {
    for method in object.methods() {
        let binding = qualified(object, &method);
        debug!(binding = %binding, "exposing binding");
        renderer
            .new_binding(&binding)
            .map_err(|source| BindingError::Broadcast { binding, source })?;
    }
    Ok(())
}

impl BindingManager for BindingRegistry {
    fn call(&self, name: &str, args: &[Value]) -> Result<Value, String> {
        let (object_name, method) = name
            .split_once('.')
            .ok_or_else(|| format!("malformed binding name '{name}'"))?;
        let object = lock_unpoisoned(&self.registry)
            .objects
            .get(object_name)
            .cloned()
            .ok_or_else(|| format!("unknown binding '{name}'"))?;
        if !object.methods().iter().any(|known| known == method) {
            return Err(format!("unknown binding '{name}'"));
        }
        object.invoke(method, args)
    }

    fn binding_names(&self) -> Vec<String> {
        let objects = ordered(&lock_unpoisoned(&self.registry));
        objects
            .iter()
            .flat_map(|object| {
                object
                    .methods()
                    .into_iter()
                    .map(|method| qualified(object.as_ref(), &method))
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}
