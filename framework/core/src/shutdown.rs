use std::sync::Arc;

use tokio::sync::broadcast::{Receiver, Sender};
use tokio::sync::Mutex;

/// Broadcasts a stop signal to everything that took a listener from this handle.
///
/// The runner owns one handle for the whole run and one handle per virtual user, so that a single
/// user can be stopped during ramp-down without disturbing the rest of the population.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    sender: Sender<()>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self {
            sender: tokio::sync::broadcast::channel(1).0,
        }
    }

    pub fn shutdown(&self) {
        if let Err(e) = self.sender.send(()) {
            // Will fail if nobody is listening for a shutdown signal, in which case the log message
            // can be ignored.
            log::debug!("Failed to send shutdown signal: {e:?}");
        }
    }

    pub fn new_listener(&self) -> DelegatedShutdownListener {
        DelegatedShutdownListener::new(self.sender.subscribe())
    }
}

/// A listener for one stop signal.
///
/// Take a fresh listener for each concern that needs to observe the signal. A listener consumes
/// the signal when it sees it, so sharing one listener between a loop condition and a raced
/// future would make them hide the signal from each other.
#[derive(Clone, Debug)]
pub struct DelegatedShutdownListener {
    receiver: Arc<Mutex<Receiver<()>>>,
}

impl DelegatedShutdownListener {
    pub(crate) fn new(receiver: Receiver<()>) -> Self {
        Self {
            receiver: Arc::new(Mutex::new(receiver)),
        }
    }

    /// Point in time check whether the stop signal has been sent. When this returns true the
    /// current unit of work should be wrapped up so the run can move on.
    pub fn should_shutdown(&mut self) -> bool {
        match self.receiver.try_lock() {
            Ok(mut guard) => match guard.try_recv() {
                Err(tokio::sync::broadcast::error::TryRecvError::Empty) => false,
                // A received value, a lagged stream and a closed channel all mean the signal
                // has fired. The handle may be fired more than once during shutdown.
                _ => true,
            },
            Err(_) => false,
        }
    }

    /// Wait for the stop signal. It is safe to race this against another future so that the
    /// signal can cancel work in progress, which is how paced sleeps stay interruptible.
    pub async fn wait_for_shutdown(&mut self) {
        // A closed channel means the sender is gone, treat that the same as a signal.
        let _ = self.receiver.lock().await.recv().await;
    }
}

#[derive(derive_more::Error, derive_more::Display, Debug)]
pub struct ShutdownSignalError {
    msg: String,
}

impl Default for ShutdownSignalError {
    fn default() -> Self {
        Self {
            msg: "Execution cancelled by shutdown signal".to_string(),
        }
    }
}
