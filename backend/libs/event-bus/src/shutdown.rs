//! Cooperative shutdown signal shared by background loops.

use tokio::sync::broadcast::{self, error::TryRecvError};

/// Receiving half of a process-wide shutdown broadcast.
///
/// Once triggered it stays triggered, so loops can both poll it at iteration
/// boundaries and await it inside a bounded wait.
#[derive(Debug)]
pub struct Shutdown {
    rx: broadcast::Receiver<()>,
    triggered: bool,
}

impl Shutdown {
    pub fn new(rx: broadcast::Receiver<()>) -> Self {
        Self {
            rx,
            triggered: false,
        }
    }

    /// Non-blocking check. A dropped sender counts as a shutdown request.
    pub fn is_triggered(&mut self) -> bool {
        if !self.triggered {
            match self.rx.try_recv() {
                Err(TryRecvError::Empty) => {}
                Ok(()) | Err(TryRecvError::Closed) | Err(TryRecvError::Lagged(_)) => {
                    self.triggered = true;
                }
            }
        }
        self.triggered
    }

    /// Resolve once shutdown is requested.
    pub async fn recv(&mut self) {
        if self.triggered {
            return;
        }
        let _ = self.rx.recv().await;
        self.triggered = true;
    }
}

/// Sender side plus a factory for receivers.
#[derive(Debug, Clone)]
pub struct ShutdownController {
    tx: broadcast::Sender<()>,
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownController {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> Shutdown {
        Shutdown::new(self.tx.subscribe())
    }

    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }
}

/// Resolve on SIGINT or SIGTERM.
pub async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = terminate.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler, waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
