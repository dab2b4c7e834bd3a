//! SIGINT/SIGTERM handling: the first signal fires the application
//! cancellation token.

use std::io;

use ui_renderer::CancelToken;

/// Keeps the signal listener alive. Dropping it unregisters the handlers and
/// joins the listener thread.
#[cfg(unix)]
pub struct SignalHookGuard {
    handle: signal_hook::iterator::Handle,
    thread: Option<std::thread::JoinHandle<()>>,
}

#[cfg(unix)]
impl Drop for SignalHookGuard {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Install SIGINT/SIGTERM handlers that cancel `cancel`.
#[cfg(unix)]
pub fn install_signal_handlers(cancel: CancelToken) -> io::Result<SignalHookGuard> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;
    use tracing::info;

    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    let handle = signals.handle();

    let thread = std::thread::Builder::new()
        .name("signal-listener".to_string())
        .spawn(move || {
            for signal in signals.forever() {
                if !cancel.is_cancelled() {
                    info!(signal, "termination signal received; shutting down");
                    cancel.cancel();
                }
            }
        })?;

    Ok(SignalHookGuard {
        handle,
        thread: Some(thread),
    })
}

#[cfg(not(unix))]
pub struct SignalHookGuard;

/// Signals are not routed on this platform; the guard is inert.
#[cfg(not(unix))]
pub fn install_signal_handlers(_cancel: CancelToken) -> io::Result<SignalHookGuard> {
    Ok(SignalHookGuard)
}
