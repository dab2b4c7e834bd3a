//! Secondary transport relaying renderer traffic to an external client.
//!
//! Outbound traffic is encoded as JSON [`BridgeFrame`]s into a bounded
//! backlog. Inbound client messages are pumped into the IPC manager by
//! [`Bridge::run`].

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, trace};
use ui_renderer::{
    AppConfig, CancelToken, EventData, EventManager, IpcManager, IpcMessage, Renderer,
    RendererError,
};

use crate::sync::lock_unpoisoned;

const NAME: &str = "bridge";
const POLL_INTERVAL: Duration = Duration::from_millis(20);
/// Outbound frames held for a client that is not reading; newer frames are
/// dropped once full.
const FRAME_BACKLOG: usize = 1024;

/// One outbound message on the bridge transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeFrame {
    Binding { name: String },
    Callback { data: String },
    Event(EventData),
    Colour { colour: String },
    Title { title: String },
    Fullscreen,
    Unfullscreen,
    Console,
    Close,
}

#[derive(Debug, Error)]
pub enum BridgeClientError {
    #[error("bridge renderer has been dropped")]
    Disconnected,

    #[error("invalid inbound message: {0}")]
    Decode(#[from] serde_json::Error),
}

/// External end of a [`Bridge`].
pub struct BridgeClient {
    frames: Receiver<String>,
    inbound: Sender<IpcMessage>,
}

impl BridgeClient {
    pub fn send(&self, message: IpcMessage) -> Result<(), BridgeClientError> {
        self.inbound
            .send(message)
            .map_err(|_| BridgeClientError::Disconnected)
    }

    /// Decodes `{"key": ..., "payload": ...}` and sends it.
    pub fn send_json(&self, raw: &str) -> Result<(), BridgeClientError> {
        let message: IpcMessage = serde_json::from_str(raw)?;
        self.send(message)
    }

    /// Next raw JSON frame, waiting at most `timeout`.
    pub fn recv_raw_timeout(&self, timeout: Duration) -> Option<String> {
        self.frames.recv_timeout(timeout).ok()
    }

    /// Next decoded frame, waiting at most `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<BridgeFrame> {
        self.recv_raw_timeout(timeout)
            .and_then(|raw| serde_json::from_str(&raw).ok())
    }

    /// Every frame already queued, decoded.
    pub fn drain(&self) -> Vec<BridgeFrame> {
        self.frames
            .try_iter()
            .filter_map(|raw| serde_json::from_str(&raw).ok())
            .collect()
    }
}

/// Secondary renderer backed by in-process channels.
pub struct Bridge {
    outbound: Mutex<Option<SyncSender<String>>>,
    inbound: Mutex<Option<Receiver<IpcMessage>>>,
    ipc: Mutex<Option<Arc<dyn IpcManager>>>,
    closed: CancelToken,
}

impl Bridge {
    #[must_use]
    pub fn new() -> (Self, BridgeClient) {
        let (frame_tx, frame_rx) = mpsc::sync_channel(FRAME_BACKLOG);
        let (inbound_tx, inbound_rx) = mpsc::channel();
        let bridge = Self {
            outbound: Mutex::new(Some(frame_tx)),
            inbound: Mutex::new(Some(inbound_rx)),
            ipc: Mutex::new(None),
            closed: CancelToken::new(),
        };
        let client = BridgeClient {
            frames: frame_rx,
            inbound: inbound_tx,
        };
        (bridge, client)
    }

    fn emit(&self, frame: BridgeFrame) -> Result<(), RendererError> {
        let encoded = serde_json::to_string(&frame)
            .map_err(|error| RendererError::operation(NAME, "encode", error.to_string()))?;

        let outbound = lock_unpoisoned(&self.outbound);
        let Some(sender) = outbound.as_ref() else {
            return Ok(());
        };
        match sender.try_send(encoded) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                trace!(renderer = NAME, "bridge backlog full; frame dropped");
            }
            Err(TrySendError::Disconnected(_)) => {
                trace!(renderer = NAME, "no bridge client attached; frame dropped");
            }
        }
        Ok(())
    }

    fn emit_void(&self, frame: BridgeFrame) {
        if let Err(error) = self.emit(frame) {
            debug!(renderer = NAME, %error, "failed to emit bridge frame");
        }
    }

    fn pump(
        &self,
        inbound: &Receiver<IpcMessage>,
        ipc: &Arc<dyn IpcManager>,
        cancel: &CancelToken,
    ) {
        let mut connected = true;
        while !cancel.is_cancelled() && !self.closed.is_cancelled() {
            if !connected {
                cancel.wait_timeout(POLL_INTERVAL);
                continue;
            }

            match inbound.recv_timeout(POLL_INTERVAL) {
                Ok(message) => {
                    debug!(renderer = NAME, key = %message.key, "relaying inbound message");
                    ipc.send(message);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    debug!(renderer = NAME, "bridge client disconnected");
                    connected = false;
                }
            }
        }
    }
}

impl Renderer for Bridge {
    fn name(&self) -> &str {
        NAME
    }

    fn initialise(
        &self,
        config: &AppConfig,
        ipc: Arc<dyn IpcManager>,
        _events: Arc<dyn EventManager>,
    ) -> Result<(), RendererError> {
        *lock_unpoisoned(&self.ipc) = Some(ipc);
        info!(renderer = NAME, title = %config.title, "bridge ready");
        Ok(())
    }

    fn run(&self, cancel: &CancelToken) -> Result<(), RendererError> {
        let ipc = lock_unpoisoned(&self.ipc)
            .clone()
            .ok_or_else(|| RendererError::Uninitialised {
                renderer: NAME.to_string(),
                operation: "run",
            })?;
        let inbound = lock_unpoisoned(&self.inbound)
            .take()
            .ok_or_else(|| RendererError::run(NAME, "run loop already started"))?;

        self.pump(&inbound, &ipc, cancel);
        debug!(renderer = NAME, "bridge run loop finished");
        Ok(())
    }

    fn new_binding(&self, name: &str) -> Result<(), RendererError> {
        self.emit(BridgeFrame::Binding {
            name: name.to_string(),
        })
    }

    fn callback(&self, data: &str) -> Result<(), RendererError> {
        self.emit(BridgeFrame::Callback {
            data: data.to_string(),
        })
    }

    fn notify_event(&self, event: &EventData) -> Result<(), RendererError> {
        self.emit(BridgeFrame::Event(event.clone()))
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
        self.emit(BridgeFrame::Colour {
            colour: colour.to_string(),
        })
    }

    fn enable_console(&self) {
        self.emit_void(BridgeFrame::Console);
    }

    fn fullscreen(&self) {
        self.emit_void(BridgeFrame::Fullscreen);
    }

    fn unfullscreen(&self) {
        self.emit_void(BridgeFrame::Unfullscreen);
    }

    fn set_title(&self, title: &str) {
        self.emit_void(BridgeFrame::Title {
            title: title.to_string(),
        });
    }

    fn close(&self) {
        self.emit_void(BridgeFrame::Close);
        self.closed.cancel();
    }
}
