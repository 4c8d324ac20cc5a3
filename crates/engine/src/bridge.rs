//! Watch event bridge: drains the directory event stream into a bounded queue
//! that the update loop reads one event at a time.

#![forbid(unsafe_code)]

use fleet_api::{CancelHandle, StreamHandle, WatchEvent};
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub struct WatchBridge {
    rx: mpsc::Receiver<WatchEvent>,
    drain: JoinHandle<()>,
    upstream: Option<CancelHandle>,
}

impl WatchBridge {
    /// Start draining `stream` into a queue of `capacity` slots. A full queue stalls the drain task,
    /// and with it the stream; nothing is dropped.
    pub fn spawn<S>(stream: S, capacity: usize) -> Self
    where
        S: Stream<Item = WatchEvent> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<WatchEvent>(capacity.max(1));
        let drain = tokio::spawn(async move {
            let stream = stream.fuse();
            futures::pin_mut!(stream);
            let mut forwarded: u64 = 0;
            while let Some(ev) = stream.next().await {
                metrics::counter!("watch_events_total", 1u64, "kind" => ev.kind());
                if tx.send(ev).await.is_err() {
                    debug!(forwarded, "bridge: consumer gone");
                    return;
                }
                forwarded += 1;
                metrics::gauge!("watch_queue_depth", (tx.max_capacity() - tx.capacity()) as f64);
            }
            info!(forwarded, "bridge: stream closed");
        });
        Self { rx, drain, upstream: None }
    }

    /// Bridge a directory stream handle. The handle's cancel guard is released with the bridge.
    pub fn from_handle(handle: StreamHandle<WatchEvent>, capacity: usize) -> Self {
        let StreamHandle { rx, cancel } = handle;
        let stream = futures::stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|ev| (ev, rx)) });
        let mut bridge = Self::spawn(stream, capacity);
        bridge.upstream = Some(cancel);
        bridge
    }

    /// Next queued event; `None` once the stream has closed and the queue is empty.
    pub async fn next(&mut self) -> Option<WatchEvent> {
        self.rx.recv().await
    }
}

impl Drop for WatchBridge {
    fn drop(&mut self) {
        self.drain.abort();
        if let Some(c) = self.upstream.take() { c.cancel(); }
    }
}
