//! Named background threads with cooperative shutdown.

use crossbeam_channel::{bounded, select, tick, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info};

/// A running background thread. Stopped on [`stop`](Self::stop) or drop.
#[derive(Debug)]
pub struct DaemonHandle {
    name: String,
    shutdown: Option<Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl DaemonHandle {
    /// Thread name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True until the thread has been stopped.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.join.as_ref().is_some_and(|join| !join.is_finished())
    }

    /// Signals the thread and waits for it to exit.
    pub fn stop(&mut self) {
        // disconnecting the channel is the signal
        self.shutdown.take();
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                error!(daemon = %self.name, "Daemon panicked");
            } else {
                info!(daemon = %self.name, "Daemon stopped");
            }
        }
    }
}

impl Drop for DaemonHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Spawns `body` on a named thread. `body` receives the shutdown channel,
/// which disconnects when the handle is stopped or dropped.
///
/// # Errors
///
/// Returns the I/O error if the thread cannot be spawned.
pub fn spawn<F>(name: &str, body: F) -> std::io::Result<DaemonHandle>
where
    F: FnOnce(Receiver<()>) + Send + 'static,
{
    let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
    let join = thread::Builder::new()
        .name(name.to_string())
        .spawn(move || body(shutdown_rx))?;
    info!(daemon = name, "Daemon started");
    Ok(DaemonHandle {
        name: name.to_string(),
        shutdown: Some(shutdown_tx),
        join: Some(join),
    })
}

/// Spawns a thread calling `cycle` every `interval` until stopped.
///
/// # Errors
///
/// Returns the I/O error if the thread cannot be spawned.
pub fn spawn_periodic<F>(name: &str, interval: Duration, mut cycle: F) -> std::io::Result<DaemonHandle>
where
    F: FnMut() + Send + 'static,
{
    let daemon = name.to_string();
    spawn(name, move |shutdown| {
        let ticker = tick(interval);
        loop {
            select! {
                recv(shutdown) -> _ => break,
                recv(ticker) -> _ => {
                    debug!(daemon = %daemon, "Daemon cycle");
                    cycle();
                }
            }
        }
    })
}
