//! Producer and consumer halves of the bridge
//!
//! ```text
//! producer thread                     async runtime
//! ---------------                     -------------
//! StreamBridge::write --coalesce-->  dispatch queue --forward task--> body queue --> BridgeBody
//!        ^                                (unbounded)                  (bounded)
//!        +------------ drain signal <--------+
//! ```
//!
//! `write` never blocks. The producer asks [`StreamBridge::write_queue_full`]
//! and, when full, parks in [`StreamBridge::wait_for_drain`] until the
//! in-flight count falls to half the high-water mark and the body queue
//! has room again.

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use futures_util::Stream;
use tokio::sync::mpsc;

use super::config::BridgeConfig;
use super::errors::{BridgeError, BridgeResult};
use crate::observability::MetricsRegistry;

/// How often a parked producer re-checks the queues
const DRAIN_POLL: Duration = Duration::from_millis(10);

type BodyItem = Result<Vec<u8>, BridgeError>;

enum Dispatch {
    Chunk(Vec<u8>),
    Abort(String),
}

struct Shared {
    in_flight: AtomicUsize,
    high_water_mark: usize,
    /// Set while the producer is parked waiting for a drain
    drain_pending: AtomicBool,
    closed: AtomicBool,
    body_tx: mpsc::Sender<BodyItem>,
}

impl Shared {
    fn is_full(&self) -> bool {
        self.body_tx.capacity() == 0 || self.in_flight.load(Ordering::Acquire) > self.high_water_mark
    }

    fn is_drained(&self) -> bool {
        self.body_tx.capacity() > 0
            && self.in_flight.load(Ordering::Acquire) <= self.high_water_mark / 2
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.body_tx.is_closed()
    }
}

/// Producer half; lives on the thread that runs the pipeline
pub struct StreamBridge {
    shared: Arc<Shared>,
    dispatch_tx: Option<mpsc::UnboundedSender<Dispatch>>,
    drain_rx: std_mpsc::Receiver<()>,
    on_drain: Option<Box<dyn FnMut() + Send>>,
    buffer: Vec<u8>,
    flush_threshold: usize,
    dispatched: u64,
}

/// Consumer half; a byte stream for the transport
pub struct BridgeBody {
    rx: mpsc::Receiver<BodyItem>,
}

impl StreamBridge {
    /// Create both halves and start the forwarding task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        config: &BridgeConfig,
        metrics: Option<Arc<MetricsRegistry>>,
    ) -> (StreamBridge, BridgeBody) {
        let (body_tx, body_rx) = mpsc::channel(config.consumer_queue_chunks.max(1));
        let (dispatch_tx, dispatch_rx) = mpsc::unbounded_channel();
        let (drain_tx, drain_rx) = std_mpsc::channel();

        let shared = Arc::new(Shared {
            in_flight: AtomicUsize::new(0),
            high_water_mark: config.high_water_mark.max(1),
            drain_pending: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            body_tx,
        });

        tokio::spawn(forward(Arc::clone(&shared), dispatch_rx, drain_tx, metrics));

        let bridge = StreamBridge {
            shared,
            dispatch_tx: Some(dispatch_tx),
            drain_rx,
            on_drain: None,
            buffer: Vec::new(),
            flush_threshold: config.flush_threshold_bytes.max(1),
            dispatched: 0,
        };
        (bridge, BridgeBody { rx: body_rx })
    }

    /// Register the callback run on the producer thread after each drain
    pub fn on_drain(&mut self, callback: impl FnMut() + Send + 'static) {
        self.on_drain = Some(Box::new(callback));
    }

    /// Queue bytes for the consumer.
    ///
    /// Only fails once the consumer has gone away.
    pub fn write(&mut self, bytes: &[u8]) -> BridgeResult<()> {
        if self.shared.is_closed() {
            return Err(BridgeError::Closed);
        }
        self.buffer.extend_from_slice(bytes);
        if self.buffer.len() >= self.flush_threshold {
            self.flush_buffer()?;
        }
        Ok(())
    }

    /// True while the consumer is full or too many chunks are in flight
    pub fn write_queue_full(&self) -> bool {
        self.shared.is_full()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Number of chunks handed to the consumer side so far
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    /// Chunks dispatched but not yet accepted by the consumer
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.load(Ordering::Acquire)
    }

    /// Block the producer until the bridge drains, then run the drain
    /// callback. Returns immediately, without the callback, if the bridge
    /// is not full.
    pub fn wait_for_drain(&mut self) -> BridgeResult<()> {
        self.wait_for_drain_until(None)
    }

    /// [`wait_for_drain`](Self::wait_for_drain) that gives up with
    /// [`BridgeError::DeadlineExceeded`] once `deadline` passes.
    pub fn wait_for_drain_until(&mut self, deadline: Option<Instant>) -> BridgeResult<()> {
        if !self.shared.is_full() {
            return Ok(());
        }
        self.shared.drain_pending.store(true, Ordering::Release);
        loop {
            if self.shared.is_closed() {
                self.shared.drain_pending.store(false, Ordering::Release);
                return Err(BridgeError::Closed);
            }
            if deadline.is_some_and(|at| Instant::now() >= at) {
                self.shared.drain_pending.store(false, Ordering::Release);
                return Err(BridgeError::DeadlineExceeded);
            }
            match self.drain_rx.recv_timeout(DRAIN_POLL) {
                Ok(()) => break,
                Err(std_mpsc::RecvTimeoutError::Timeout) => {
                    // Whoever clears the flag reports the transition
                    if self.shared.is_drained()
                        && self.shared.drain_pending.swap(false, Ordering::AcqRel)
                    {
                        break;
                    }
                }
                Err(std_mpsc::RecvTimeoutError::Disconnected) => {
                    return Err(BridgeError::Closed);
                }
            }
        }
        if let Some(callback) = self.on_drain.as_mut() {
            callback();
        }
        Ok(())
    }

    /// Dispatch whatever is coalesced
    pub fn flush(&mut self) -> BridgeResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        self.flush_buffer()
    }

    fn flush_buffer(&mut self) -> BridgeResult<()> {
        let chunk = std::mem::take(&mut self.buffer);
        self.dispatch(Dispatch::Chunk(chunk))?;
        self.dispatched += 1;
        Ok(())
    }

    fn dispatch(&mut self, item: Dispatch) -> BridgeResult<()> {
        let tx = self.dispatch_tx.as_ref().ok_or(BridgeError::Closed)?;
        self.shared.in_flight.fetch_add(1, Ordering::AcqRel);
        tx.send(item).map_err(|_| {
            self.shared.in_flight.fetch_sub(1, Ordering::AcqRel);
            BridgeError::Closed
        })
    }

    /// Flush and close the stream normally
    pub fn end(mut self) -> BridgeResult<()> {
        self.flush()?;
        self.dispatch_tx = None;
        Ok(())
    }

    /// Terminate the stream with an error; buffered bytes are discarded.
    ///
    /// The consumer sees the error after every chunk already dispatched.
    pub fn abort(mut self, reason: &str) {
        self.buffer.clear();
        let _ = self.dispatch(Dispatch::Abort(reason.to_string()));
        self.dispatch_tx = None;
    }
}

impl io::Write for StreamBridge {
    /// Writes, then parks the calling thread while the bridge is full
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        StreamBridge::write(self, buf)?;
        self.wait_for_drain()?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

async fn forward(
    shared: Arc<Shared>,
    mut dispatch_rx: mpsc::UnboundedReceiver<Dispatch>,
    drain_tx: std_mpsc::Sender<()>,
    metrics: Option<Arc<MetricsRegistry>>,
) {
    while let Some(item) = dispatch_rx.recv().await {
        let (body_item, last) = match item {
            Dispatch::Chunk(chunk) => {
                if let Some(metrics) = &metrics {
                    metrics.add_bytes_streamed(chunk.len() as u64);
                }
                (Ok(chunk), false)
            }
            Dispatch::Abort(reason) => (Err(BridgeError::Aborted(reason)), true),
        };
        let sent = shared.body_tx.send(body_item).await;
        shared.in_flight.fetch_sub(1, Ordering::AcqRel);
        if sent.is_err() {
            shared.closed.store(true, Ordering::Release);
            break;
        }
        if last {
            break;
        }
        if shared.is_drained() && shared.drain_pending.swap(false, Ordering::AcqRel) {
            let _ = drain_tx.send(());
        }
    }
}

impl BridgeBody {
    /// Gather the whole stream; used where no transport is involved
    pub async fn collect(mut self) -> BridgeResult<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(item) = self.rx.recv().await {
            out.extend_from_slice(&item?);
        }
        Ok(out)
    }
}

impl Stream for BridgeBody {
    type Item = Result<Vec<u8>, BridgeError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn config(high_water_mark: usize, flush: usize, queue: usize) -> BridgeConfig {
        BridgeConfig {
            high_water_mark,
            flush_threshold_bytes: flush,
            consumer_queue_chunks: queue,
        }
    }

    #[tokio::test]
    async fn test_coalesces_until_threshold() {
        let (mut bridge, body) = StreamBridge::new(&config(16, 4, 8), None);
        bridge.write(b"ab").unwrap();
        assert_eq!(bridge.dispatched(), 0);
        bridge.write(b"cd").unwrap();
        assert_eq!(bridge.dispatched(), 1);
        bridge.write(b"e").unwrap();
        bridge.end().unwrap();
        assert_eq!(body.collect().await.unwrap(), b"abcde");
    }

    #[tokio::test]
    async fn test_preserves_write_order_across_threads() {
        let (bridge, body) = StreamBridge::new(&config(2, 1, 1), None);
        let producer = tokio::task::spawn_blocking(move || {
            let mut bridge = bridge;
            for i in 0..200u32 {
                io::Write::write_all(&mut bridge, format!("{}\n", i).as_bytes()).unwrap();
            }
            bridge.end().unwrap();
        });
        let out = body.collect().await.unwrap();
        producer.await.unwrap();

        let expected: String = (0..200u32).map(|i| format!("{}\n", i)).collect();
        assert_eq!(String::from_utf8(out).unwrap(), expected);
    }

    #[tokio::test]
    async fn test_drain_fires_once_per_transition() {
        let (mut bridge, mut body) = StreamBridge::new(&config(2, 1, 1), None);
        let drains = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&drains);
        bridge.on_drain(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        for _ in 0..5 {
            bridge.write(b"x").unwrap();
        }
        // Nothing is consuming, so the bridge fills up
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(bridge.write_queue_full());

        let producer = tokio::task::spawn_blocking(move || {
            bridge.wait_for_drain().unwrap();
            bridge
        });
        let mut received = 0;
        while received < 5 {
            if body.rx.recv().await.is_some() {
                received += 1;
            }
        }
        let bridge = producer.await.unwrap();
        assert_eq!(drains.load(Ordering::SeqCst), 1);
        assert!(!bridge.write_queue_full());
    }

    #[tokio::test]
    async fn test_wait_returns_at_once_when_not_full() {
        let (mut bridge, _body) = StreamBridge::new(&config(16, 1, 8), None);
        let drains = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&drains);
        bridge.on_drain(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let started = Instant::now();
        bridge.wait_for_drain().unwrap();
        assert!(started.elapsed() < DRAIN_POLL);
        assert_eq!(drains.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_wait_gives_up_at_deadline() {
        let (mut bridge, _body) = StreamBridge::new(&config(1, 1, 1), None);
        for _ in 0..4 {
            bridge.write(b"x").unwrap();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(bridge.write_queue_full());

        let result = tokio::task::spawn_blocking(move || {
            bridge.wait_for_drain_until(Some(Instant::now() + Duration::from_millis(50)))
        })
        .await
        .unwrap();
        assert_eq!(result, Err(BridgeError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_abort_truncates_stream() {
        let (mut bridge, body) = StreamBridge::new(&config(16, 1, 8), None);
        bridge.write(b"partial").unwrap();
        bridge.abort("source failed");
        let err = body.collect().await.unwrap_err();
        assert_eq!(err, BridgeError::Aborted("source failed".into()));
    }

    #[tokio::test]
    async fn test_closed_consumer_fails_writes() {
        let (mut bridge, body) = StreamBridge::new(&config(16, 1, 1), None);
        drop(body);
        let result = tokio::task::spawn_blocking(move || {
            // The forwarding task notices on its next send
            for _ in 0..100 {
                if let Err(e) = bridge.write(b"x") {
                    return Err(e);
                }
                std::thread::sleep(Duration::from_millis(1));
            }
            Ok(())
        })
        .await
        .unwrap();
        assert_eq!(result, Err(BridgeError::Closed));
    }

    #[tokio::test]
    async fn test_bytes_streamed_metric() {
        let metrics = Arc::new(MetricsRegistry::new());
        let (mut bridge, body) = StreamBridge::new(&config(16, 1024, 8), Some(Arc::clone(&metrics)));
        bridge.write(b"hello").unwrap();
        bridge.end().unwrap();
        body.collect().await.unwrap();
        assert_eq!(metrics.snapshot().bytes_streamed, 5);
    }
}
