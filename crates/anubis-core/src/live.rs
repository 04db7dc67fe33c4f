use std::future::Future;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::service::SnapshotStream;

/// A running live-update task: a subscription forwarder or a poll timer.
///
/// Cancelling is synchronous and idempotent. Once the token is cancelled the
/// task posts nothing further; [`shutdown`](LiveHandle::shutdown) additionally
/// waits until the task (and whatever feed it owns) has been dropped.
/// Dropping the handle cancels it.
#[derive(Debug)]
pub struct LiveHandle {
    label: String,
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl LiveHandle {
    pub fn spawn<F, Fut>(label: impl Into<String>, run: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let task = tokio::spawn(run(token.clone()));
        Self {
            label: label.into(),
            token,
            task: Some(task),
        }
    }

    /// Forwards every snapshot of `stream` through `tx`, wrapped by `wrap`.
    /// The end of the stream is forwarded once as `wrap(None)`.
    pub fn forward<T, U, W>(
        label: impl Into<String>,
        mut stream: SnapshotStream<T>,
        tx: mpsc::UnboundedSender<U>,
        wrap: W,
    ) -> Self
    where
        T: Send + 'static,
        U: Send + 'static,
        W: Fn(Option<Vec<T>>) -> U + Send + 'static,
    {
        Self::spawn(label, move |token| async move {
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    next = stream.next() => {
                        let closed = next.is_none();
                        if tx.send(wrap(next)).is_err() || closed {
                            break;
                        }
                    }
                }
            }
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled() && self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn cancel(&self) {
        if !self.token.is_cancelled() {
            debug!("cancelling live handle {}", self.label);
            self.token.cancel();
        }
    }

    /// Cancels and waits for the task to be dropped.
    pub async fn shutdown(mut self) {
        self.cancel();
        if let Some(task) = self.task.take() {
            // A cancelled forwarder only ever exits cleanly; join errors are
            // panics inside the feed and are already reported by tokio.
            let _ = task.await;
        }
    }
}

impl Drop for LiveHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures_util::stream;

    use super::*;

    #[tokio::test]
    async fn forward_relays_until_stream_ends() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let feed: SnapshotStream<u32> = stream::iter(vec![vec![1], vec![1, 2]]).boxed();
        let handle = LiveHandle::forward("numbers", feed, tx, |s| s);

        assert_eq!(rx.recv().await, Some(Some(vec![1])));
        assert_eq!(rx.recv().await, Some(Some(vec![1, 2])));
        assert_eq!(rx.recv().await, Some(None));
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn cancelled_forwarder_posts_nothing() {
        let (tx, mut rx) = mpsc::unbounded_channel::<Option<Vec<u32>>>();
        let feed: SnapshotStream<u32> = stream::pending().boxed();
        let handle = LiveHandle::forward("idle", feed, tx, |s| s);
        assert!(handle.is_active());

        handle.cancel();
        assert!(!handle.is_active());
        handle.shutdown().await;

        // Sender was dropped with the task.
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn drop_cancels_task() {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();
        let handle = LiveHandle::spawn("ticker", move |token| async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        let _ = tx.send(());
                    }
                }
            }
        });
        assert_eq!(rx.recv().await, Some(()));
        drop(handle);
        while rx.recv().await.is_some() {}
    }
}
