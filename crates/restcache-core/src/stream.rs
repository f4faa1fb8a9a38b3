// ── State subscriptions ──
//
// Readers hold an `Arc<CrudState>` snapshot and get notified when the
// single writer publishes a new one.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::model::CrudState;

/// A subscription to the cache state.
///
/// Provides both point-in-time snapshot access and change notification
/// via [`changed`](Self::changed) or by converting to a `Stream`.
pub struct StateStream {
    current: Arc<CrudState>,
    receiver: watch::Receiver<Arc<CrudState>>,
}

impl StateStream {
    pub(crate) fn new(mut receiver: watch::Receiver<Arc<CrudState>>) -> Self {
        let current = Arc::clone(&receiver.borrow_and_update());
        Self { current, receiver }
    }

    /// Snapshot as of creation or the last `changed()`.
    pub fn current(&self) -> &Arc<CrudState> {
        &self.current
    }

    /// Latest published snapshot.
    pub fn latest(&self) -> Arc<CrudState> {
        Arc::clone(&self.receiver.borrow())
    }

    /// Wait for the next snapshot.
    /// Returns `None` once the orchestrator has been dropped.
    pub async fn changed(&mut self) -> Option<Arc<CrudState>> {
        self.receiver.changed().await.ok()?;
        let snap = Arc::clone(&self.receiver.borrow_and_update());
        self.current = Arc::clone(&snap);
        Some(snap)
    }

    /// Wait until a snapshot satisfies `predicate`, checking the current
    /// one first.
    pub async fn wait_until<F>(&mut self, mut predicate: F) -> Option<Arc<CrudState>>
    where
        F: FnMut(&CrudState) -> bool,
    {
        let snap = self.receiver.wait_for(|state| predicate(&**state)).await.ok()?;
        let snap = Arc::clone(&snap);
        self.current = Arc::clone(&snap);
        Some(snap)
    }

    /// Convert into a `Stream` for use with `StreamExt` combinators.
    pub fn into_stream(self) -> StateWatchStream {
        StateWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter backed by a `watch::Receiver`.
///
/// Yields the current snapshot first, then each newly published one.
pub struct StateWatchStream {
    inner: WatchStream<Arc<CrudState>>,
}

impl Stream for StateWatchStream {
    type Item = Arc<CrudState>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::event::CrudEvent;
    use crate::store::reduce;

    #[tokio::test]
    async fn changed_tracks_the_writer() {
        let (tx, rx) = watch::channel(Arc::new(CrudState::new()));
        let mut stream = StateStream::new(rx);
        assert!(stream.current().is_empty());

        let next = reduce(
            stream.current(),
            &CrudEvent::CreateStarted {
                model: "books".into(),
            },
        );
        tx.send(Arc::clone(&next)).unwrap();

        let seen = stream.changed().await.unwrap();
        assert!(Arc::ptr_eq(&seen, &next));
        assert!(Arc::ptr_eq(stream.current(), &next));

        drop(tx);
        assert!(stream.changed().await.is_none());
    }

    #[tokio::test]
    async fn wait_until_checks_current_snapshot() {
        let (_tx, rx) = watch::channel(Arc::new(CrudState::new()));
        let mut stream = StateStream::new(rx);
        let snap = stream.wait_until(CrudState::is_empty).await.unwrap();
        assert!(snap.is_empty());
    }

    #[tokio::test]
    async fn into_stream_yields_current_first() {
        use futures_util::StreamExt;

        let (_tx, rx) = watch::channel(Arc::new(CrudState::new()));
        let mut stream = StateStream::new(rx).into_stream();
        let first = stream.next().await.unwrap();
        assert!(first.is_empty());
    }
}
