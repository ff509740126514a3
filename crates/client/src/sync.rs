//! Session list synchronization
//!
//! One payload-less "sessions changed" signal. Mutating components publish
//! after success; list views subscribe and refetch. Signals with nobody
//! listening are dropped.

use std::sync::Arc;

use parlance_protocol::{SessionQuery, SessionSummary};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::api::ChatApi;
use crate::error::ClientError;

pub trait SessionNotifier: Send + Sync {
    fn sessions_changed(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionsChanged;

const CHANNEL_CAPACITY: usize = 16;

/// Broadcast-backed notifier shared by the whole runtime.
#[derive(Debug, Clone)]
pub struct SessionSync {
    tx: broadcast::Sender<SessionsChanged>,
}

impl Default for SessionSync {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionSync {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionsChanged> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl SessionNotifier for SessionSync {
    fn sessions_changed(&self) {
        let delivered = self.tx.send(SessionsChanged).unwrap_or(0);
        debug!(
            component = "sync",
            event = "sync.sessions_changed",
            subscribers = delivered,
        );
    }
}

/// Notifier that drops every signal.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl SessionNotifier for NoopNotifier {
    fn sessions_changed(&self) {}
}

/// Live session list: fetches on start, refetches on every change.
///
/// Results (or fetch errors) go to the sink. Dropping the watch cancels the
/// background task and its subscription.
pub struct SessionListWatch {
    handle: JoinHandle<()>,
}

impl SessionListWatch {
    pub fn start<F>(
        api: Arc<dyn ChatApi>,
        sync: &SessionSync,
        query: SessionQuery,
        mut sink: F,
    ) -> Self
    where
        F: FnMut(Result<Vec<SessionSummary>, ClientError>) + Send + 'static,
    {
        // Subscribe before the first fetch so a change during it is not lost.
        let mut rx = sync.subscribe();

        let handle = tokio::spawn(async move {
            sink(api.list_sessions(&query).await);

            loop {
                match rx.recv().await {
                    Ok(SessionsChanged) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(
                            component = "sync",
                            event = "sync.watch.lagged",
                            skipped = skipped,
                            "Session list watch lagged, refetching"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
                sink(api.list_sessions(&query).await);
            }
        });

        Self { handle }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for SessionListWatch {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
