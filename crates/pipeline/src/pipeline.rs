// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A single worker's decode→parse→process→report chain (spec §4.6). A Task
//! owns `config.workers` of these, each with its own plugin instances and
//! its own [`otus_decode::Decoder`] (so IP-reassembly state is never shared
//! across workers).

use crate::stats::PipelineCounters;
use otus_core::{OutputPacket, RawPacket, TaskId};
use otus_decode::Decoder;
use otus_parsers::{parse_with_fallback, process_chain, Parser, Processor};
use otus_reporters::Reporter;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// The fixed identity an `OutputPacket` carries back to its origin (spec §3).
pub struct PipelineIdentity {
    pub task_id: TaskId,
    pub agent_id: otus_core::AgentId,
    pub pipeline_id: u32,
}

pub struct Pipeline {
    pub identity: PipelineIdentity,
    pub decoder: Decoder,
    pub parsers: Vec<Box<dyn Parser>>,
    pub processors: Vec<Box<dyn Processor>>,
    pub reporters: Vec<Arc<dyn Reporter>>,
    pub counters: Arc<PipelineCounters>,
}

impl Pipeline {
    /// Run one raw packet through the full chain. Returns `true` if an
    /// `OutputPacket` reached at least one reporter.
    pub async fn handle_raw(&mut self, raw: RawPacket) -> bool {
        self.counters.received.fetch_add(1, Ordering::Relaxed);

        let decoded = match self.decoder.decode(&raw) {
            Ok(Some(decoded)) => decoded,
            Ok(None) => return false, // fragment buffered, nothing to emit yet
            Err(err) => {
                tracing::debug!(error = %err, "decode failed");
                return false;
            }
        };
        self.counters.decoded.fetch_add(1, Ordering::Relaxed);

        let outcome = parse_with_fallback(&mut self.parsers, &decoded);
        self.counters.parsed.fetch_add(1, Ordering::Relaxed);

        let five_tuple = decoded.five_tuple();
        let mut packet = OutputPacket {
            task_id: self.identity.task_id.clone(),
            agent_id: self.identity.agent_id.clone(),
            pipeline_id: self.identity.pipeline_id,
            five_tuple: five_tuple.map(Into::into).unwrap_or(otus_core::WireFiveTuple {
                src_ip: std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED),
                dst_ip: std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED),
                src_port: 0,
                dst_port: 0,
                protocol: 0,
            }),
            timestamp: decoded.timestamp,
            payload_type: outcome.payload_type,
            labels: outcome.labels,
            payload: outcome.structured,
            raw_payload: decoded.payload,
        };

        if !process_chain(&mut self.processors, &mut packet) {
            self.counters.dropped_by_processor.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        self.counters.processed.fetch_add(1, Ordering::Relaxed);

        let mut reported = false;
        for reporter in &self.reporters {
            match reporter.report(packet.clone()).await {
                Ok(()) => {
                    self.counters.reported.fetch_add(1, Ordering::Relaxed);
                    reported = true;
                }
                Err(err) => {
                    self.counters.dropped_by_reporter.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(error = %err, "reporter rejected packet");
                }
            }
        }
        reported
    }

    pub fn reap_expired_fragments(&mut self) {
        self.decoder.reap_expired_fragments();
    }
}
