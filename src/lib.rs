//! Orchestration core of a desktop application runtime.
//!
//! A backend talks to one primary GUI surface and any number of secondary
//! transports through a single fan-out renderer. The core owns lifecycle,
//! IPC dispatch, event delivery and binding registration.
//!
//! # Public API Overview
//! - Build and run an application with [`App`] (or [`App::builder`] to plug in
//!   a native primary renderer).
//! - Expose backend objects to the UI by implementing [`Bindable`].
//! - Bound objects receive a [`Runtime`] for events and window control.
//! - Renderer implementations target the [`ui_renderer::Renderer`] contract.
//!
//! Invariant: the primary renderer always runs on the thread that called
//! [`App::run`]; secondaries each get their own thread.

pub mod app;
pub mod binding;
pub mod config;
pub mod error;
pub mod event;
pub mod ipc;
pub mod logging;
pub mod platform;
pub mod renderer;
pub mod runtime;

mod sync;

pub use crate::app::{App, AppBuilder, AppHandle, AppState};
pub use crate::binding::{Bindable, BindingError, BindingRegistry};
pub use crate::config::{BuildMode, ConfigError, EnvConfig};
pub use crate::error::AppError;
pub use crate::event::EventHub;
pub use crate::ipc::{CallReply, CallRequest, IpcDispatcher, IpcError};
pub use crate::renderer::{
    Bridge, BridgeClient, BridgeFrame, HeadlessWindow, MultiRenderer, RendererSet, RunFailure,
};
pub use crate::runtime::Runtime;

pub use ui_renderer::{
    AppConfig, BindingManager, CallbackFunc, CancelToken, EventData, EventHandler, EventManager,
    IpcManager, IpcMessage, LogLevel, Renderer, RendererError, StartError,
};
