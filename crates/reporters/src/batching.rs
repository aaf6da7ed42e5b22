// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared batching/retry/fallback machinery (spec §4.5) wrapping any
//! concrete [`Sink`]. Every reporter backend (Kafka, console) is built by
//! passing its `Sink` impl to [`BatchingReporter::spawn`].

use crate::error::ReporterError;
use crate::traits::{Reporter, Sink};
use async_trait::async_trait;
use otus_core::OutputPacket;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct BatchingConfig {
    pub batch_size: usize,
    pub batch_timeout: Duration,
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub send_timeout: Duration,
    pub capacity: usize,
    pub high_watermark: f64,
    pub low_watermark: f64,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            batch_size: 500,
            batch_timeout: Duration::from_millis(500),
            max_attempts: 5,
            base_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            send_timeout: Duration::from_secs(3),
            capacity: 65_536,
            high_watermark: 0.8,
            low_watermark: 0.3,
        }
    }
}

impl BatchingConfig {
    fn high_watermark_len(&self) -> usize {
        ((self.capacity as f64) * self.high_watermark) as usize
    }

    fn low_watermark_len(&self) -> usize {
        ((self.capacity as f64) * self.low_watermark) as usize
    }
}

struct Queue {
    packets: Mutex<VecDeque<OutputPacket>>,
    notify: Notify,
}

/// The batching/retry loop's view of a reporter: everything `run_loop`
/// needs, held behind its own `Arc` so the worker can be spawned from
/// `&self` without requiring callers to hold `Arc<BatchingReporter<S>>`.
struct Inner<S: Sink + 'static> {
    sink: Arc<S>,
    fallback: Option<Arc<dyn Sink>>,
    config: BatchingConfig,
    queue: Queue,
    dropped_overflow: AtomicU64,
    dropped_exhausted: AtomicU64,
    cancel: CancellationToken,
    backpressured: AtomicBool,
}

impl<S: Sink + 'static> Inner<S> {
    async fn run_loop(self: Arc<Self>) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    self.flush_once().await;
                    return;
                }
                _ = tokio::time::sleep(self.config.batch_timeout) => {}
                _ = self.queue.notify.notified() => {}
            }
            self.flush_once().await;
        }
    }

    async fn flush_once(&self) {
        let batch: Vec<OutputPacket> = {
            let mut packets = self.queue.packets.lock();
            let take = packets.len().min(self.config.batch_size);
            packets.drain(..take).collect()
        };
        if batch.is_empty() {
            return;
        }
        self.send_with_retry(batch).await;
    }

    async fn send_with_retry(&self, batch: Vec<OutputPacket>) {
        let mut attempt = 0u32;
        let mut backoff = self.config.base_backoff;
        loop {
            let result = tokio::time::timeout(self.config.send_timeout, self.sink.send_batch(&batch)).await;
            match result {
                Ok(Ok(())) => {
                    metrics::counter!("otus_reporter_sent_total", "sink" => self.sink.name()).increment(batch.len() as u64);
                    return;
                }
                Ok(Err(err)) => {
                    tracing::warn!(sink = self.sink.name(), attempt, error = %err, "reporter send failed");
                }
                Err(_) => {
                    tracing::warn!(sink = self.sink.name(), attempt, "reporter send timed out");
                }
            }
            attempt += 1;
            if attempt >= self.config.max_attempts {
                self.handle_exhausted(batch).await;
                return;
            }
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(self.config.max_backoff);
        }
    }

    /// Hysteresis check (spec §4.5 high/low watermark): once the queue
    /// crosses the high watermark, backpressure stays asserted until it
    /// drains back down to the low watermark, instead of flapping on every
    /// push/pop pair sitting right at the high watermark.
    fn backpressure_engaged(&self, len: usize) -> bool {
        if self.backpressured.load(Ordering::Relaxed) {
            if len <= self.config.low_watermark_len() {
                self.backpressured.store(false, Ordering::Relaxed);
                false
            } else {
                true
            }
        } else if len >= self.config.high_watermark_len() {
            self.backpressured.store(true, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    async fn handle_exhausted(&self, batch: Vec<OutputPacket>) {
        if let Some(fallback) = &self.fallback {
            if fallback.send_batch(&batch).await.is_ok() {
                metrics::counter!("otus_reporter_fallback_sent_total").increment(batch.len() as u64);
                return;
            }
        }
        self.dropped_exhausted.fetch_add(batch.len() as u64, Ordering::Relaxed);
        metrics::counter!("otus_dropped_by_reporter_total", "sink" => self.sink.name()).increment(batch.len() as u64);
    }
}

/// Generic reporter: a bounded head-drop queue (spec §5 `send_buffer`
/// policy) feeding a background batching loop that flushes on `batch_size`
/// or `batch_timeout`, retries with exponential backoff, and falls back or
/// drops on exhaustion (spec §4.5).
pub struct BatchingReporter<S: Sink + 'static> {
    inner: Arc<Inner<S>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
}

impl<S: Sink + 'static> BatchingReporter<S> {
    pub fn new(sink: S, fallback: Option<Arc<dyn Sink>>, config: BatchingConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                sink: Arc::new(sink),
                fallback,
                config,
                queue: Queue { packets: Mutex::new(VecDeque::new()), notify: Notify::new() },
                dropped_overflow: AtomicU64::new(0),
                dropped_exhausted: AtomicU64::new(0),
                cancel: CancellationToken::new(),
                backpressured: AtomicBool::new(false),
            }),
            worker: Mutex::new(None),
            started: AtomicBool::new(false),
        }
    }

    pub fn dropped_overflow(&self) -> u64 {
        self.inner.dropped_overflow.load(Ordering::Relaxed)
    }

    pub fn dropped_exhausted(&self) -> u64 {
        self.inner.dropped_exhausted.load(Ordering::Relaxed)
    }

    async fn send_with_retry(&self, batch: Vec<OutputPacket>) {
        self.inner.send_with_retry(batch).await;
    }
}

#[async_trait]
impl<S: Sink + 'static> Reporter for BatchingReporter<S> {
    async fn init(&self) -> Result<(), ReporterError> {
        Ok(())
    }

    async fn start(&self) -> Result<(), ReporterError> {
        if !self.started.swap(true, Ordering::SeqCst) {
            let inner = Arc::clone(&self.inner);
            let handle = tokio::spawn(async move { inner.run_loop().await });
            *self.worker.lock() = Some(handle);
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), ReporterError> {
        self.inner.cancel.cancel();
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        Ok(())
    }

    async fn report(&self, packet: OutputPacket) -> Result<(), ReporterError> {
        let inner = &self.inner;
        let mut packets = inner.queue.packets.lock();
        if inner.backpressure_engaged(packets.len()) {
            packets.pop_front();
            inner.dropped_overflow.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("otus_reporter_queue_overflow_total", "sink" => inner.sink.name()).increment(1);
            packets.push_back(packet);
            drop(packets);
            inner.queue.notify.notify_one();
            return Err(ReporterError::BackpressureBlocked);
        }
        let should_flush = packets.len() + 1 >= inner.config.batch_size;
        packets.push_back(packet);
        drop(packets);
        if should_flush {
            inner.queue.notify.notify_one();
        }
        Ok(())
    }

    async fn flush(&self, deadline: Duration) -> Result<(), ReporterError> {
        let remaining = {
            let packets = self.inner.queue.packets.lock();
            packets.len()
        };
        if remaining == 0 {
            return Ok(());
        }
        match tokio::time::timeout(deadline, self.inner.flush_once()).await {
            Ok(()) => Ok(()),
            Err(_) => Err(ReporterError::FlushDeadlineExceeded(remaining)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::SystemTime;

    struct CountingSink {
        calls: AtomicUsize,
        fail_first_n: usize,
    }

    #[async_trait]
    impl Sink for CountingSink {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn send_batch(&self, _batch: &[OutputPacket]) -> Result<(), ReporterError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first_n {
                return Err(ReporterError::SendFailed("simulated".into()));
            }
            Ok(())
        }
    }

    fn dummy_packet() -> OutputPacket {
        OutputPacket {
            task_id: otus_core::TaskId::new("t1"),
            agent_id: otus_core::AgentId::new("h1"),
            pipeline_id: 0,
            five_tuple: otus_core::WireFiveTuple {
                src_ip: "10.0.0.1".parse().unwrap(),
                dst_ip: "10.0.0.2".parse().unwrap(),
                src_port: 1,
                dst_port: 2,
                protocol: 17,
            },
            timestamp: SystemTime::now(),
            payload_type: otus_core::PayloadType::Raw,
            labels: Default::default(),
            payload: None,
            raw_payload: vec![],
        }
    }

    #[tokio::test]
    async fn queue_overflow_drops_oldest_and_signals_backpressure() {
        let sink = CountingSink { calls: AtomicUsize::new(0), fail_first_n: 0 };
        let config = BatchingConfig { capacity: 2, high_watermark: 1.0, batch_size: 1000, ..Default::default() };
        let reporter = BatchingReporter::new(sink, None, config);

        reporter.report(dummy_packet()).await.unwrap();
        reporter.report(dummy_packet()).await.unwrap();
        let result = reporter.report(dummy_packet()).await;
        assert!(matches!(result, Err(ReporterError::BackpressureBlocked)));
        assert_eq!(reporter.dropped_overflow(), 1);
    }

    #[tokio::test]
    async fn batch_size_one_and_zero_timeout_flushes_every_packet_individually() {
        let sink = CountingSink { calls: AtomicUsize::new(0), fail_first_n: 0 };
        let config = BatchingConfig { batch_size: 1, batch_timeout: Duration::ZERO, ..Default::default() };
        let reporter = BatchingReporter::new(sink, None, config);
        reporter.start().await.unwrap();

        reporter.report(dummy_packet()).await.unwrap();
        reporter.report(dummy_packet()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        reporter.stop().await.unwrap();

        assert_eq!(reporter.inner.sink.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn backpressure_stays_engaged_until_queue_drains_to_low_watermark() {
        let sink = CountingSink { calls: AtomicUsize::new(0), fail_first_n: 0 };
        let config =
            BatchingConfig { capacity: 10, high_watermark: 0.5, low_watermark: 0.2, batch_size: 2, ..Default::default() };
        let reporter = BatchingReporter::new(sink, None, config);

        for _ in 0..5 {
            reporter.report(dummy_packet()).await.unwrap();
        }
        // queue at the high watermark (5): next push trips backpressure.
        assert!(matches!(reporter.report(dummy_packet()).await, Err(ReporterError::BackpressureBlocked)));
        assert_eq!(reporter.dropped_overflow(), 1);

        // drains 2, down to 3 — below the high watermark but still above
        // the low watermark (2), so backpressure must stay engaged.
        reporter.flush(Duration::from_secs(1)).await.unwrap();
        assert!(matches!(reporter.report(dummy_packet()).await, Err(ReporterError::BackpressureBlocked)));
        assert_eq!(reporter.dropped_overflow(), 2);

        // drains 2 more, down to 1 — at or below the low watermark, so
        // backpressure clears and the next report succeeds.
        reporter.flush(Duration::from_secs(1)).await.unwrap();
        assert!(reporter.report(dummy_packet()).await.is_ok());
    }

    #[tokio::test]
    async fn retries_then_succeeds_within_max_attempts() {
        let sink = CountingSink { calls: AtomicUsize::new(0), fail_first_n: 2 };
        let config = BatchingConfig { max_attempts: 5, base_backoff: Duration::from_millis(1), ..Default::default() };
        let reporter = BatchingReporter::new(sink, None, config);
        reporter.send_with_retry(vec![dummy_packet()]).await;
        assert_eq!(reporter.dropped_exhausted(), 0);
    }

    #[tokio::test]
    async fn exhausted_retries_fall_back() {
        struct AlwaysFails;
        #[async_trait]
        impl Sink for AlwaysFails {
            fn name(&self) -> &'static str {
                "always-fails"
            }
            async fn send_batch(&self, _batch: &[OutputPacket]) -> Result<(), ReporterError> {
                Err(ReporterError::SendFailed("nope".into()))
            }
        }
        struct AlwaysSucceeds(AtomicUsize);
        #[async_trait]
        impl Sink for AlwaysSucceeds {
            fn name(&self) -> &'static str {
                "fallback"
            }
            async fn send_batch(&self, batch: &[OutputPacket]) -> Result<(), ReporterError> {
                self.0.fetch_add(batch.len(), Ordering::SeqCst);
                Ok(())
            }
        }

        let fallback = Arc::new(AlwaysSucceeds(AtomicUsize::new(0)));
        let config = BatchingConfig { max_attempts: 2, base_backoff: Duration::from_millis(1), ..Default::default() };
        let reporter = BatchingReporter::new(AlwaysFails, Some(fallback.clone() as Arc<dyn Sink>), config);
        reporter.send_with_retry(vec![dummy_packet()]).await;
        assert_eq!(reporter.dropped_exhausted(), 0);
        assert_eq!(fallback.0.load(Ordering::SeqCst), 1);
    }
}
