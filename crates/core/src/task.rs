// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `TaskConfig` and `TaskState` (spec §3 `TaskConfig`/`Task`, §4.7 the Task
//! state machine).

use crate::id::TaskId;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// How packets reach a Task's N workers (spec §4.1, Glossary "Dispatch mode").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// N independent capture handles, kernel-side fanout by flow hash.
    Binding,
    /// One capture handle, agent-level fanout.
    Dispatch { strategy: DispatchStrategy },
}

impl DispatchMode {
    /// Whether per-flow packet ordering is guaranteed (spec §5). SIP
    /// parsing requires this; the config validator rejects combinations
    /// that don't provide it.
    pub fn preserves_flow_order(&self) -> bool {
        match self {
            DispatchMode::Binding => true,
            DispatchMode::Dispatch { strategy } => *strategy == DispatchStrategy::FlowHash,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStrategy {
    FlowHash,
    RoundRobin,
}

/// Named plugin reference with an opaque config blob (spec §9: "TaskConfig
/// holds (name, opaque config map); the factory consumes the map").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginSpec {
    pub name: String,
    #[serde(default)]
    pub config: JsonValue,
}

impl PluginSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), config: JsonValue::Null }
    }

    pub fn with_config(mut self, config: JsonValue) -> Self {
        self.config = config;
        self
    }
}

/// Decoder configuration (spec §4.2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecoderSpec {
    #[serde(default)]
    pub tunnels: Vec<String>,
    #[serde(default = "default_true")]
    pub ip_reassembly: bool,
    #[serde(default = "default_reassembly_ttl_secs")]
    pub reassembly_ttl_secs: u64,
    #[serde(default = "default_reassembly_max_keys")]
    pub reassembly_max_fragment_keys: usize,
}

fn default_true() -> bool {
    true
}
fn default_reassembly_ttl_secs() -> u64 {
    30
}
fn default_reassembly_max_keys() -> usize {
    10_000
}

impl Default for DecoderSpec {
    fn default() -> Self {
        Self {
            tunnels: Vec::new(),
            ip_reassembly: true,
            reassembly_ttl_secs: default_reassembly_ttl_secs(),
            reassembly_max_fragment_keys: default_reassembly_max_keys(),
        }
    }
}

/// Capture configuration (spec §3, §4.1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureSpec {
    pub plugin: String,
    pub interface: String,
    #[serde(default)]
    pub bpf_filter: Option<String>,
    #[serde(default = "default_snaplen")]
    pub snaplen: u32,
    pub dispatch_mode: DispatchMode,
}

fn default_snaplen() -> u32 {
    65535
}

/// A Task's static definition (spec §3 `TaskConfig`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    pub id: TaskId,
    #[serde(default = "default_workers")]
    pub workers: u32,
    pub capture: CaptureSpec,
    #[serde(default)]
    pub decoder: DecoderSpec,
    #[serde(default)]
    pub parsers: Vec<PluginSpec>,
    #[serde(default)]
    pub processors: Vec<PluginSpec>,
    pub reporters: Vec<PluginSpec>,
}

fn default_workers() -> u32 {
    1
}

/// Validation failure reasons, surfaced as `ConfigInvalid` (spec §3
/// invariants, §7).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskConfigError {
    #[error("task id must not be empty")]
    EmptyId,
    #[error("workers must be >= 1")]
    ZeroWorkers,
    #[error("at least one reporter is required")]
    NoReporters,
    #[error("dispatch mode {0:?} with a parser requiring flow order is invalid: round-robin dispatch does not guarantee per-flow ordering")]
    UnorderedDispatchWithOrderedParser(DispatchMode),
}

impl TaskConfig {
    /// Validate the invariants from spec §3: non-empty id, workers >= 1,
    /// at least one reporter, and (spec §5) reject round-robin dispatch
    /// when an order-sensitive parser (SIP) is configured.
    pub fn validate(&self) -> Result<(), TaskConfigError> {
        if self.id.is_empty() {
            return Err(TaskConfigError::EmptyId);
        }
        if self.workers == 0 {
            return Err(TaskConfigError::ZeroWorkers);
        }
        if self.reporters.is_empty() {
            return Err(TaskConfigError::NoReporters);
        }
        let has_order_sensitive_parser = self.parsers.iter().any(|p| p.name == "sip");
        if has_order_sensitive_parser && !self.capture.dispatch_mode.preserves_flow_order() {
            return Err(TaskConfigError::UnorderedDispatchWithOrderedParser(self.capture.dispatch_mode));
        }
        Ok(())
    }
}

/// Task lifecycle state (spec §4.7).
///
/// Transitions are monotonic forward except `Stopped → <removed>`, which is
/// modeled at the `TaskManager` level (spec §3 invariant), not as a state
/// variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Created,
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

crate::simple_display! {
    TaskState {
        Created => "created",
        Starting => "starting",
        Running => "running",
        Stopping => "stopping",
        Stopped => "stopped",
        Failed => "failed",
    }
}

impl TaskState {
    /// Spec §4.7: "Stop is valid from starting, running, or failed;
    /// idempotent from stopped."
    pub fn can_stop(self) -> bool {
        matches!(self, TaskState::Starting | TaskState::Running | TaskState::Failed | TaskState::Stopped)
    }

    /// Spec §4.7: "Start is valid only from created."
    pub fn can_start(self) -> bool {
        matches!(self, TaskState::Created)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Stopped | TaskState::Failed)
    }
}

/// Stats snapshot attached to a Task (spec §3: "stats derived, never
/// authoritative"). Aggregated from per-Pipeline snapshots.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskStats {
    pub received: u64,
    pub decoded: u64,
    pub parsed: u64,
    pub processed: u64,
    pub reported: u64,
    pub dropped_by_processor: u64,
    pub dropped_by_reporter: u64,
    pub send_queue_depth: u64,
    #[serde(default)]
    pub per_pipeline: BTreeMap<u32, PipelineStats>,
}

/// Per-pipeline counters (spec §4.6). `u64` and monotonically
/// non-decreasing for the Task's lifetime; deltas use `saturating_sub`
/// (spec §9: "underflow-safe delta calculation").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineStats {
    pub received: u64,
    pub decoded: u64,
    pub parsed: u64,
    pub processed: u64,
    pub reported: u64,
    pub dropped_by_processor: u64,
    pub dropped_by_reporter: u64,
    pub send_queue_depth: u64,
}

impl PipelineStats {
    /// Underflow-safe delta against a previous snapshot (spec §9).
    pub fn delta_since(&self, previous: &PipelineStats) -> PipelineStats {
        PipelineStats {
            received: self.received.saturating_sub(previous.received),
            decoded: self.decoded.saturating_sub(previous.decoded),
            parsed: self.parsed.saturating_sub(previous.parsed),
            processed: self.processed.saturating_sub(previous.processed),
            reported: self.reported.saturating_sub(previous.reported),
            dropped_by_processor: self.dropped_by_processor.saturating_sub(previous.dropped_by_processor),
            dropped_by_reporter: self.dropped_by_reporter.saturating_sub(previous.dropped_by_reporter),
            send_queue_depth: self.send_queue_depth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> TaskConfig {
        TaskConfig {
            id: TaskId::new("t1"),
            workers: 1,
            capture: CaptureSpec {
                plugin: "pcap".into(),
                interface: "eth0".into(),
                bpf_filter: None,
                snaplen: 65535,
                dispatch_mode: DispatchMode::Binding,
            },
            decoder: DecoderSpec::default(),
            parsers: vec![],
            processors: vec![],
            reporters: vec![PluginSpec::new("kafka")],
        }
    }

    #[test]
    fn rejects_empty_id() {
        let mut cfg = valid_config();
        cfg.id = TaskId::new("");
        assert_eq!(cfg.validate(), Err(TaskConfigError::EmptyId));
    }

    #[test]
    fn rejects_zero_workers() {
        let mut cfg = valid_config();
        cfg.workers = 0;
        assert_eq!(cfg.validate(), Err(TaskConfigError::ZeroWorkers));
    }

    #[test]
    fn rejects_empty_reporters() {
        let mut cfg = valid_config();
        cfg.reporters.clear();
        assert_eq!(cfg.validate(), Err(TaskConfigError::NoReporters));
    }

    #[test]
    fn rejects_sip_with_round_robin_dispatch() {
        let mut cfg = valid_config();
        cfg.parsers.push(PluginSpec::new("sip"));
        cfg.capture.dispatch_mode = DispatchMode::Dispatch { strategy: DispatchStrategy::RoundRobin };
        assert!(matches!(cfg.validate(), Err(TaskConfigError::UnorderedDispatchWithOrderedParser(_))));
    }

    #[test]
    fn accepts_sip_with_flow_hash_dispatch() {
        let mut cfg = valid_config();
        cfg.parsers.push(PluginSpec::new("sip"));
        cfg.capture.dispatch_mode = DispatchMode::Dispatch { strategy: DispatchStrategy::FlowHash };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn state_machine_transitions() {
        assert!(TaskState::Created.can_start());
        assert!(!TaskState::Running.can_start());
        assert!(TaskState::Running.can_stop());
        assert!(TaskState::Stopped.can_stop());
        assert!(!TaskState::Created.can_stop());
    }

    #[test]
    fn pipeline_stats_delta_never_underflows_on_counter_reset() {
        let previous = PipelineStats { received: 1000, ..Default::default() };
        let reset = PipelineStats { received: 0, ..Default::default() };
        let delta = reset.delta_since(&previous);
        assert_eq!(delta.received, 0);
    }
}
