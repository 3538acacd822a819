//! A background thread that periodically reclaims expired cache entries.
use std::{sync::mpsc::RecvTimeoutError, time::Duration};

use crate::{Error, Result};

/// A cache sweeper thread.
///
/// The thread calls the sweep function once per interval until it is stopped, until the sweep
/// function returns `false`, or until the owning [`SweeperThread`] is dropped.
pub(crate) struct SweeperThread {
    join_handle: std::thread::JoinHandle<()>,

    /// Used to send a stop command to the sweeper thread. Dropping it disconnects the channel,
    /// which also stops the thread.
    stop_sender: std::sync::mpsc::SyncSender<()>,
}

impl SweeperThread {
    /// Start the sweeper thread.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the thread failed to start.
    pub(crate) fn start(
        interval: Duration,
        mut sweep: impl FnMut() -> bool + Send + 'static,
    ) -> std::io::Result<SweeperThread> {
        // Buffer size of 1 is enough: a second stop command can be dropped as the thread is
        // stopping anyway.
        let (stop_sender, stop_receiver) = std::sync::mpsc::sync_channel::<()>(1);

        let join_handle = std::thread::Builder::new()
            .name("splitter-cache-sweeper".to_owned())
            .spawn(move || loop {
                match stop_receiver.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        if !sweep() {
                            log::debug!(target: "splitter", "cache is gone, stopping sweeper thread");
                            return;
                        }
                    }
                    Ok(()) => {
                        log::debug!(target: "splitter", "sweeper thread received stop command");
                        return;
                    }
                    Err(RecvTimeoutError::Disconnected) => {
                        log::debug!(target: "splitter", "sweeper thread received disconnected");
                        return;
                    }
                }
            })?;

        Ok(SweeperThread {
            join_handle,
            stop_sender,
        })
    }

    /// Stop the sweeper thread without waiting for it to exit.
    pub(crate) fn stop(&self) {
        // Error means that the thread has already exited or that another stop command is
        // queued. Either way the thread is stopping.
        let _ = self.stop_sender.try_send(());
    }

    /// Stop the sweeper thread and block waiting for it to exit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SweeperThreadPanicked`] if the thread has panicked.
    pub(crate) fn shutdown(self) -> Result<()> {
        self.stop();

        self.join_handle
            .join()
            .map_err(|_| Error::SweeperThreadPanicked)?;

        Ok(())
    }
}
