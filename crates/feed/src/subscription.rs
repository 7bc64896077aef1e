use domain::ChangeEvent;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const FORWARD_BUFFER: usize = 32;

/// Handle to a live change feed. The producer side is stopped as soon as
/// this is dropped.
pub struct Subscription {
    rx: mpsc::Receiver<ChangeEvent>,
    cancel: CancellationToken,
}

impl Subscription {
    pub fn new(rx: mpsc::Receiver<ChangeEvent>, cancel: CancellationToken) -> Self {
        Self { rx, cancel }
    }

    /// Bridge an in-process broadcast channel. A lagged receiver turns into
    /// a single `Resync` so nothing is silently lost.
    pub fn from_broadcast(mut source: broadcast::Receiver<ChangeEvent>) -> Self {
        let (tx, rx) = mpsc::channel(FORWARD_BUFFER);
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = token.cancelled() => break,
                    res = source.recv() => match res {
                        Ok(ev) => ev,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Change subscriber lagged by {} events, forcing resync", n);
                            ChangeEvent::Resync
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                };
                tokio::select! {
                    _ = token.cancelled() => break,
                    sent = tx.send(event) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
            debug!("Change forwarder stopped");
        });

        Self::new(rx, cancel)
    }

    /// `None` once the producer is gone.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
