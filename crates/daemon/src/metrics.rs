// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Metrics HTTP exporter (spec §6): counters per Task/Pipeline for
//! packets received/decoded/parsed/processed/reported, drops by stage,
//! active reassembly fragments, and task state as a labeled gauge.

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("invalid metrics listen address {0:?}: {1}")]
    InvalidAddr(String, std::net::AddrParseError),
    #[error("failed to install prometheus exporter: {0}")]
    Install(#[from] metrics_exporter_prometheus::BuildError),
}

pub const PACKETS_RECEIVED: &str = "otus_packets_received_total";
pub const PACKETS_DECODED: &str = "otus_packets_decoded_total";
pub const PACKETS_PARSED: &str = "otus_packets_parsed_total";
pub const PACKETS_PROCESSED: &str = "otus_packets_processed_total";
pub const PACKETS_REPORTED: &str = "otus_packets_reported_total";
pub const DROPPED_BY_PROCESSOR: &str = "otus_dropped_by_processor_total";
pub const DROPPED_BY_REPORTER: &str = "otus_dropped_by_reporter_total";
pub const REASSEMBLY_ACTIVE_FRAGMENTS: &str = "otus_reassembly_active_fragments";
pub const TASK_STATE: &str = "otus_task_state";

/// Installs the Prometheus HTTP exporter at `listen_addr` and registers
/// this binary's metric descriptions. Idempotent across daemon restarts
/// within the same process is not a concern — this runs once at startup.
pub fn install(listen_addr: &str) -> Result<(), MetricsError> {
    let addr: SocketAddr = listen_addr.parse().map_err(|err| MetricsError::InvalidAddr(listen_addr.to_string(), err))?;
    PrometheusBuilder::new().with_http_listener(addr).install()?;

    metrics::describe_counter!(PACKETS_RECEIVED, metrics::Unit::Count, "Packets received by a Task's capturer(s)");
    metrics::describe_counter!(PACKETS_DECODED, metrics::Unit::Count, "Packets successfully decoded");
    metrics::describe_counter!(PACKETS_PARSED, metrics::Unit::Count, "Packets handled by a parser plugin");
    metrics::describe_counter!(PACKETS_PROCESSED, metrics::Unit::Count, "Packets handled by a processor plugin");
    metrics::describe_counter!(PACKETS_REPORTED, metrics::Unit::Count, "Packets accepted by a reporter plugin");
    metrics::describe_counter!(DROPPED_BY_PROCESSOR, metrics::Unit::Count, "Packets dropped by a processor plugin");
    metrics::describe_counter!(DROPPED_BY_REPORTER, metrics::Unit::Count, "Packets dropped by a reporter (backpressure or send failure)");
    metrics::describe_gauge!(REASSEMBLY_ACTIVE_FRAGMENTS, metrics::Unit::Count, "IP fragments currently held awaiting reassembly");
    metrics::describe_gauge!(TASK_STATE, metrics::Unit::Count, "Task lifecycle state, one gauge per (task_id, state) pair");
    Ok(())
}
