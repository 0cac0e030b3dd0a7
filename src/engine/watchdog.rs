use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Last-resort deadline for a whole run.
///
/// If not cancelled within `deadline`, runs its action on a dedicated thread.
/// The default action terminates the process.
pub struct Watchdog {
    cancel: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Watchdog {
    pub fn arm<F>(deadline: Duration, action: F) -> Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let (cancel, cancelled) = bounded::<()>(1);

        let handle = thread::Builder::new()
            .name("watchdog".to_string())
            .spawn(move || match cancelled.recv_timeout(deadline) {
                Err(RecvTimeoutError::Timeout) => action(),
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {}
            })
            .map_err(|e| anyhow!("Failed to spawn watchdog: {}", e))?;

        log::debug!("watchdog armed for {:?}", deadline);
        Ok(Self {
            cancel: Some(cancel),
            handle: Some(handle),
        })
    }

    /// Arm with the default action: log and exit the process.
    pub fn arm_exit(deadline: Duration) -> Result<Self> {
        Self::arm(deadline, move || {
            log::error!("run exceeded its deadline of {:?}, terminating", deadline);
            std::process::exit(1);
        })
    }

    pub fn cancel(mut self) {
        self.disarm();
    }

    fn disarm(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.disarm();
    }
}
