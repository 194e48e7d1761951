//! Cooperative cancellation shared by the poll loop and the orchestrator

use tokio::sync::watch;

/// Receiving side of the shutdown signal. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

/// Sending side of the shutdown signal
#[derive(Debug)]
pub struct ShutdownSender(watch::Sender<bool>);

impl Shutdown {
    pub fn new() -> (ShutdownSender, Shutdown) {
        let (tx, rx) = watch::channel(false);
        (ShutdownSender(tx), Shutdown { rx })
    }

    /// Completes when shutdown is signaled or the sender is dropped
    pub async fn cancelled(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl ShutdownSender {
    pub fn send_signal(&self) {
        self.0.send_replace(true);
    }
}
