#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tandem::{
    App, AppBuilder, AppConfig, AppError, AppHandle, AppState, Bindable, BuildMode, CancelToken,
    EnvConfig, EventData, EventManager, IpcManager, Renderer, RendererError, Runtime,
};

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Builder with process environment and signal handling kept out of the test.
pub fn quiet_builder() -> AppBuilder {
    App::builder()
        .build_mode(BuildMode::Debug)
        .environment(EnvConfig::default())
        .install_signal_handlers(false)
}

pub fn wait_until(timeout: Duration, mut predicate: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if predicate() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    predicate()
}

/// Runs `app` on its own thread and waits until it reports `Running`.
pub fn spawn_running(app: App) -> (AppHandle, JoinHandle<Result<(), AppError>>) {
    let handle = app.handle();
    let runner = thread::Builder::new()
        .name("app-under-test".to_string())
        .spawn(move || app.run())
        .expect("app thread spawns");
    assert!(
        wait_until(TIMEOUT, || handle.state() != AppState::Created
            && handle.state() != AppState::Initializing),
        "application never left start-up"
    );
    (handle, runner)
}

/// Bound object with an integer cell.
#[derive(Default)]
pub struct Counter {
    value: AtomicI64,
    runtime: Mutex<Option<Runtime>>,
}

impl Counter {
    pub fn runtime(&self) -> Option<Runtime> {
        lock_unpoisoned(&self.runtime).clone()
    }
}

impl Bindable for Counter {
    fn name(&self) -> &str {
        "counter"
    }

    fn methods(&self) -> Vec<String> {
        vec!["increment".to_string(), "get".to_string()]
    }

    fn invoke(&self, method: &str, args: &[Value]) -> Result<Value, String> {
        match method {
            "increment" => {
                let by = args.first().and_then(Value::as_i64).unwrap_or(1);
                Ok(json!(self.value.fetch_add(by, Ordering::SeqCst) + by))
            }
            "get" => Ok(json!(self.value.load(Ordering::SeqCst))),
            other => Err(format!("no method {other}")),
        }
    }

    fn on_start(&self, runtime: &Runtime) -> Result<(), String> {
        *lock_unpoisoned(&self.runtime) = Some(runtime.clone());
        Ok(())
    }
}

/// Secondary whose run loop ignores cancellation for a fixed time.
pub struct StubbornTransport {
    linger: Duration,
    finished: AtomicBool,
}

impl StubbornTransport {
    pub fn new(linger: Duration) -> Self {
        Self {
            linger,
            finished: AtomicBool::new(false),
        }
    }

    pub fn finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}

impl Renderer for StubbornTransport {
    fn name(&self) -> &str {
        "stubborn"
    }

    fn initialise(
        &self,
        _config: &AppConfig,
        _ipc: Arc<dyn IpcManager>,
        _events: Arc<dyn EventManager>,
    ) -> Result<(), RendererError> {
        Ok(())
    }

    fn run(&self, _cancel: &CancelToken) -> Result<(), RendererError> {
        thread::sleep(self.linger);
        self.finished.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn new_binding(&self, _name: &str) -> Result<(), RendererError> {
        Ok(())
    }

    fn callback(&self, _data: &str) -> Result<(), RendererError> {
        Ok(())
    }

    fn notify_event(&self, _event: &EventData) -> Result<(), RendererError> {
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

    fn set_colour(&self, _colour: &str) -> Result<(), RendererError> {
        Ok(())
    }

    fn enable_console(&self) {}

    fn fullscreen(&self) {}

    fn unfullscreen(&self) {}

    fn set_title(&self, _title: &str) {}

    fn close(&self) {}
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
