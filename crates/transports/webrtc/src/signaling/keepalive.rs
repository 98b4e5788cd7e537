//! Keepalive heartbeats for signaling channels

use super::SignalingChannel;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Background heartbeat task bound to one signaling channel
///
/// Sends a heartbeat at a fixed interval until stopped. [`stop`] signals
/// the task and joins it, so no heartbeat can be sent once the owning
/// session tears its channel down.
///
/// [`stop`]: KeepaliveWorker::stop
pub struct KeepaliveWorker {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl KeepaliveWorker {
    /// Spawn a worker sending heartbeats over `channel` every `interval`
    pub fn spawn(channel: Arc<dyn SignalingChannel>, interval: Duration) -> Self {
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // skip the immediate first tick; the session just connected
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = channel.keepalive().await {
                            warn!("Keepalive failed: {}", e);
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            debug!("Keepalive worker shutting down");
                            break;
                        }
                    }
                }
            }
        });

        Self { shutdown, handle }
    }

    /// Stop the worker and wait for it to finish
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            warn!("Keepalive worker join failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signaling::{ControlRequest, IceCandidate, RemoteDescription};
    use crate::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingChannel {
        heartbeats: AtomicUsize,
    }

    #[async_trait]
    impl SignalingChannel for CountingChannel {
        async fn connect(&self) -> Result<()> {
            Ok(())
        }
        async fn register_streaming(&self) -> Result<()> {
            Ok(())
        }
        async fn send_control(&self, _request: ControlRequest) -> Result<()> {
            Ok(())
        }
        async fn set_remote_description(&self, _desc: &RemoteDescription) -> Result<()> {
            Ok(())
        }
        async fn add_ice_candidate(&self, _candidate: &IceCandidate) -> Result<()> {
            Ok(())
        }
        async fn keepalive(&self) -> Result<()> {
            self.heartbeats.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn disconnect(&self) -> Result<()> {
            Ok(())
        }
        fn session_id(&self) -> Option<u64> {
            Some(1)
        }
    }

    #[tokio::test]
    async fn test_heartbeats_sent_until_stopped() {
        let channel = Arc::new(CountingChannel {
            heartbeats: AtomicUsize::new(0),
        });

        let worker = KeepaliveWorker::spawn(channel.clone(), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(55)).await;
        worker.stop().await;

        let sent = channel.heartbeats.load(Ordering::SeqCst);
        assert!(sent >= 2, "expected at least 2 heartbeats, got {}", sent);

        // no heartbeat after stop() has joined
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(channel.heartbeats.load(Ordering::SeqCst), sent);
    }

    #[tokio::test]
    async fn test_stop_before_first_tick() {
        let channel = Arc::new(CountingChannel {
            heartbeats: AtomicUsize::new(0),
        });

        let worker = KeepaliveWorker::spawn(channel.clone(), Duration::from_secs(60));
        worker.stop().await;

        assert_eq!(channel.heartbeats.load(Ordering::SeqCst), 0);
    }
}
