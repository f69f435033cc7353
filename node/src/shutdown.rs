//! Stop signal shared by every spawned election service.

use tokio::signal;
use tokio::sync::broadcast;

/// Fan-out stop switch. [`ElectionService::spawn`](crate::ElectionService::spawn)
/// takes a receiver from [`subscribe`](Self::subscribe) and exits its loop
/// once the switch is thrown.
pub struct ShutdownController {
    tx: broadcast::Sender<()>,
}

impl ShutdownController {
    pub fn new() -> Self {
        Self {
            tx: broadcast::channel(1).0,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Number of services still listening.
    pub fn listeners(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn shutdown(&self) {
        let listeners = self.tx.send(()).unwrap_or(0);
        tracing::debug!(listeners, "shutdown requested");
    }

    /// Block until the process is asked to stop (Ctrl-C, or SIGTERM on
    /// unix), then throw the switch.
    pub async fn wait_for_signal(&self) -> std::io::Result<()> {
        let name = stop_signal().await?;
        tracing::info!(signal = name, "stopping election services");
        self.shutdown();
        Ok(())
    }
}

#[cfg(unix)]
async fn stop_signal() -> std::io::Result<&'static str> {
    use signal::unix::{signal as unix_signal, SignalKind};

    let mut terminate = unix_signal(SignalKind::terminate())?;
    tokio::select! {
        res = signal::ctrl_c() => res.map(|_| "SIGINT"),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn stop_signal() -> std::io::Result<&'static str> {
    signal::ctrl_c().await.map(|_| "ctrl-c")
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_listener_sees_the_stop() {
        let controller = ShutdownController::new();
        let mut a = controller.subscribe();
        let mut b = controller.subscribe();
        assert_eq!(controller.listeners(), 2);
        controller.shutdown();
        assert!(a.recv().await.is_ok());
        assert!(b.recv().await.is_ok());
    }

    #[test]
    fn shutdown_without_listeners_is_harmless() {
        let controller = ShutdownController::default();
        controller.shutdown();
        assert_eq!(controller.listeners(), 0);
    }
}
