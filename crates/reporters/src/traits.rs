// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Reporter plugin contract (spec §4.5) and the lower-level `Sink` a
//! concrete reporter implements to plug into [`crate::batching::BatchingReporter`].

use crate::error::ReporterError;
use async_trait::async_trait;
use otus_core::OutputPacket;
use std::time::Duration;

/// A reporter plugin (spec §4.5). Most reporters are built from
/// [`crate::batching::BatchingReporter`] wrapping a [`Sink`]; the trait
/// itself stays minimal so a fully custom reporter can still be wired into
/// a Pipeline.
#[async_trait]
pub trait Reporter: Send + Sync {
    async fn init(&self) -> Result<(), ReporterError>;
    async fn start(&self) -> Result<(), ReporterError>;
    async fn stop(&self) -> Result<(), ReporterError>;

    /// Enqueue for send; must not block indefinitely (spec §4.5: returns
    /// `BackpressureBlocked` rather than waiting when the buffer is full
    /// past the high watermark).
    async fn report(&self, packet: OutputPacket) -> Result<(), ReporterError>;

    /// Drain the pending batch synchronously, honoring `deadline`.
    async fn flush(&self, deadline: Duration) -> Result<(), ReporterError>;
}

/// The I/O a concrete reporter backend performs once a batch is ready. The
/// batching/retry/backoff/fallback machinery lives in
/// [`crate::batching::BatchingReporter`] and is shared by every backend.
#[async_trait]
pub trait Sink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send_batch(&self, batch: &[OutputPacket]) -> Result<(), ReporterError>;
}
