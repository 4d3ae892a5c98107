//! Event-loop keeper
//!
//! A tokio current-thread runtime driven by one dedicated worker thread.
//! The worker blocks on a permanent keep-alive future, so the loop stays
//! alive while no I/O is pending instead of returning from its dispatch
//! call. Other components schedule asynchronous work through
//! [`EventLoopKeeper::handle`].

use std::io;
use std::thread::JoinHandle;

use tokio::runtime::{Builder, Handle};
use tokio_util::sync::CancellationToken;

/// Owns the dispatch loop and its worker thread.
///
/// Stopping (explicitly or on drop) cancels the keep-alive, waits for the
/// worker to exit, and drops any still-pending tasks.
pub struct EventLoopKeeper {
    handle: Handle,
    keep_alive: CancellationToken,
    worker: Option<JoinHandle<()>>,
}

impl EventLoopKeeper {
    /// Build the runtime and launch the worker thread.
    ///
    /// Thread-creation failure is surfaced immediately; there is no
    /// retry.
    pub fn start() -> io::Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let handle = runtime.handle().clone();
        let keep_alive = CancellationToken::new();

        let token = keep_alive.clone();
        let worker = std::thread::Builder::new()
            .name("timelatch-eventloop".into())
            .spawn(move || {
                // The cancelled() future is the loop's permanent no-op
                // work item: block_on parks here between completions and
                // returns only when the keeper is stopped.
                runtime.block_on(token.cancelled());
            })?;

        Ok(Self {
            handle,
            keep_alive,
            worker: Some(worker),
        })
    }

    /// Handle for scheduling asynchronous work on the loop
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Signal loop termination and wait for the worker thread to exit.
    /// Idempotent.
    pub fn stop(&mut self) {
        self.keep_alive.cancel();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("event loop worker thread panicked");
            }
        }
    }
}

impl Drop for EventLoopKeeper {
    fn drop(&mut self) {
        self.stop();
    }
}
