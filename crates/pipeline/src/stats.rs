// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Atomic per-Pipeline counters (spec §4.6), rolled up into the
//! [`otus_core::PipelineStats`] snapshot consumed by the metrics endpoint
//! and `daemon_stats`.

use otus_core::PipelineStats;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct PipelineCounters {
    pub received: AtomicU64,
    pub decoded: AtomicU64,
    pub parsed: AtomicU64,
    pub processed: AtomicU64,
    pub reported: AtomicU64,
    pub dropped_by_processor: AtomicU64,
    pub dropped_by_reporter: AtomicU64,
}

impl PipelineCounters {
    pub fn snapshot(&self, send_queue_depth: u64) -> PipelineStats {
        PipelineStats {
            received: self.received.load(Ordering::Relaxed),
            decoded: self.decoded.load(Ordering::Relaxed),
            parsed: self.parsed.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            reported: self.reported.load(Ordering::Relaxed),
            dropped_by_processor: self.dropped_by_processor.load(Ordering::Relaxed),
            dropped_by_reporter: self.dropped_by_reporter.load(Ordering::Relaxed),
            send_queue_depth,
        }
    }
}
