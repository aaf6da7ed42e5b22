// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A Task: one Capturer, N Pipelines, a lifecycle state machine (spec §4.7).
//!
//! Every goroutine-equivalent a Task spawns (capture feed, dispatch loop,
//! worker loops, fragment-reap ticker) is enrolled in a single
//! [`tokio::task::JoinSet`]; `stop` awaits it draining to empty before the
//! state transitions to `Stopped` (spec §4.7, §9 — this is the
//! wait-group-balance invariant carried over from the original).

use crate::capture::{CaptureError, Capturer};
use crate::pipeline::{Pipeline, PipelineIdentity};
use crate::registry::{self, PluginError};
use crate::stats::PipelineCounters;
use otus_core::{AgentId, DispatchMode, DispatchStrategy, RawPacket, TaskConfig, TaskState, TaskStats};
use otus_decode::{Decoder, Reassembler, ReassemblerConfig};
use otus_parsers::FlowRegistry;
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("task is not in a startable state: {0}")]
    NotStartable(TaskState),
    #[error("unknown capture plugin {0:?}")]
    UnknownCapturePlugin(String),
    #[error(transparent)]
    Plugin(#[from] PluginError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Decode(#[from] otus_decode::DecodeError),
}

const CHANNEL_CAPACITY: usize = 65_536;
const FRAGMENT_REAP_INTERVAL: Duration = Duration::from_secs(5);

pub struct Task {
    pub config: TaskConfig,
    pub agent_id: AgentId,
    state: Mutex<TaskState>,
    started_at: Mutex<Option<SystemTime>>,
    error: Mutex<Option<String>>,
    registry: Arc<FlowRegistry>,
    counters: Mutex<Vec<Arc<PipelineCounters>>>,
    cancel: CancellationToken,
    joins: Mutex<JoinSet<()>>,
    capturers: Mutex<Vec<Arc<dyn Capturer>>>,
    started: AtomicBool,
}

impl Task {
    pub fn new(config: TaskConfig, agent_id: AgentId) -> Self {
        Self {
            config,
            agent_id,
            state: Mutex::new(TaskState::Created),
            started_at: Mutex::new(None),
            error: Mutex::new(None),
            registry: Arc::new(FlowRegistry::new()),
            counters: Mutex::new(Vec::new()),
            cancel: CancellationToken::new(),
            joins: Mutex::new(JoinSet::new()),
            capturers: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> TaskState {
        *self.state.lock()
    }

    pub fn error_message(&self) -> Option<String> {
        self.error.lock().clone()
    }

    pub fn started_at(&self) -> Option<SystemTime> {
        *self.started_at.lock()
    }

    pub fn stats(&self) -> TaskStats {
        let counters = self.counters.lock();
        let mut stats = TaskStats::default();
        for (idx, counter) in counters.iter().enumerate() {
            let snapshot = counter.snapshot(0);
            stats.received += snapshot.received;
            stats.decoded += snapshot.decoded;
            stats.parsed += snapshot.parsed;
            stats.processed += snapshot.processed;
            stats.reported += snapshot.reported;
            stats.dropped_by_processor += snapshot.dropped_by_processor;
            stats.dropped_by_reporter += snapshot.dropped_by_reporter;
            stats.per_pipeline.insert(idx as u32, snapshot);
        }
        stats
    }

    /// Spec §4.7: valid only from `created`; on partial failure, cleans up
    /// everything already started and transitions to `failed`.
    pub async fn start(self: &Arc<Self>) -> Result<(), TaskError> {
        {
            let mut state = self.state.lock();
            if !state.can_start() {
                return Err(TaskError::NotStartable(*state));
            }
            *state = TaskState::Starting;
        }

        match self.start_inner().await {
            Ok(()) => {
                *self.started_at.lock() = Some(SystemTime::now());
                *self.state.lock() = TaskState::Running;
                Ok(())
            }
            Err(err) => {
                self.teardown().await;
                *self.error.lock() = Some(err.to_string());
                *self.state.lock() = TaskState::Failed;
                Err(err)
            }
        }
    }

    async fn start_inner(self: &Arc<Self>) -> Result<(), TaskError> {
        let mut pipelines = Vec::with_capacity(self.config.workers as usize);
        let mut counters = Vec::with_capacity(self.config.workers as usize);
        for id in 0..self.config.workers {
            let parsers = registry::build_parsers(&self.config.parsers, &self.registry)?;
            let processors = registry::build_processors(&self.config.processors)?;
            let reporters = registry::build_reporters(&self.config.reporters)?;
            let pipeline_counters = Arc::new(PipelineCounters::default());
            counters.push(Arc::clone(&pipeline_counters));
            pipelines.push(Pipeline {
                identity: PipelineIdentity { task_id: self.config.id.clone(), agent_id: self.agent_id.clone(), pipeline_id: id },
                decoder: self.build_decoder()?,
                parsers,
                processors,
                reporters,
                counters: pipeline_counters,
            });
        }
        *self.counters.lock() = counters;

        match self.config.capture.dispatch_mode {
            DispatchMode::Binding => self.start_binding(pipelines).await?,
            DispatchMode::Dispatch { strategy } => self.start_dispatch(pipelines, strategy).await?,
        }

        Ok(())
    }

    fn build_decoder(&self) -> Result<Decoder, TaskError> {
        let spec = &self.config.decoder;
        let reassembler = spec.ip_reassembly.then(|| {
            Reassembler::new(ReassemblerConfig {
                ttl: Duration::from_secs(spec.reassembly_ttl_secs),
                max_keys: spec.reassembly_max_fragment_keys,
            })
        });
        Ok(Decoder::new(&spec.tunnels, reassembler)?)
    }

    fn new_capturer(&self) -> Result<Arc<dyn Capturer>, TaskError> {
        match self.config.capture.plugin.as_str() {
            #[cfg(feature = "pcap-capture")]
            "pcap" => Ok(Arc::new(crate::capture::PcapCapturer::new(
                self.config.capture.interface.clone(),
                self.config.capture.bpf_filter.clone(),
                self.config.capture.snaplen,
            ))),
            "channel" => Ok(Arc::new(crate::capture::ChannelCapturer::new(Vec::new()))),
            other => Err(TaskError::UnknownCapturePlugin(other.to_string())),
        }
    }

    /// Binding dispatch: one Capturer per worker, each feeding its Pipeline
    /// directly — no agent-level fanout (spec §4.1).
    async fn start_binding(self: &Arc<Self>, pipelines: Vec<Pipeline>) -> Result<(), TaskError> {
        let mut capturers = Vec::with_capacity(pipelines.len());
        for mut pipeline in pipelines {
            let capturer = self.new_capturer()?;
            let (tx, mut rx) = mpsc::channel::<RawPacket>(CHANNEL_CAPACITY);
            capturer.start(tx).await?;
            capturers.push(Arc::clone(&capturer));

            let cancel = self.cancel.clone();
            self.joins.lock().spawn(async move { run_worker(&mut pipeline, &mut rx, &cancel).await });
        }
        *self.capturers.lock() = capturers;
        Ok(())
    }

    /// Agent-level dispatch: one Capturer, one dispatch loop routing each
    /// packet to a worker by flow hash or round robin (spec §4.1, §5).
    async fn start_dispatch(self: &Arc<Self>, pipelines: Vec<Pipeline>, strategy: DispatchStrategy) -> Result<(), TaskError> {
        let capturer = self.new_capturer()?;
        let (raw_tx, mut raw_rx) = mpsc::channel::<RawPacket>(CHANNEL_CAPACITY);
        capturer.start(raw_tx).await?;
        *self.capturers.lock() = vec![Arc::clone(&capturer)];

        let mut worker_txs = Vec::with_capacity(pipelines.len());
        for mut pipeline in pipelines {
            let (tx, mut rx) = mpsc::channel::<RawPacket>(CHANNEL_CAPACITY);
            worker_txs.push(tx);
            let cancel = self.cancel.clone();
            self.joins.lock().spawn(async move { run_worker(&mut pipeline, &mut rx, &cancel).await });
        }

        let cancel = self.cancel.clone();
        let worker_count = worker_txs.len().max(1);
        self.joins.lock().spawn(async move {
            let mut round_robin = 0usize;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    packet = raw_rx.recv() => {
                        let Some(packet) = packet else { break };
                        let worker = match strategy {
                            DispatchStrategy::FlowHash => dispatch_key_hash(&packet) % worker_count,
                            DispatchStrategy::RoundRobin => {
                                let worker = round_robin % worker_count;
                                round_robin = round_robin.wrapping_add(1);
                                worker
                            }
                        };
                        if worker_txs[worker].send(packet).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });
        Ok(())
    }

    async fn teardown(&self) {
        let capturers: Vec<_> = self.capturers.lock().drain(..).collect();
        for capturer in capturers {
            let _ = capturer.stop().await;
        }
        self.cancel.cancel();
        let mut joins = std::mem::replace(&mut *self.joins.lock(), JoinSet::new());
        while joins.join_next().await.is_some() {}
    }

    /// Spec §4.7: valid from `starting`, `running`, or `failed`; idempotent
    /// from `stopped`.
    pub async fn stop(&self) -> Result<(), TaskError> {
        if !self.started.swap(true, Ordering::SeqCst) && self.state() == TaskState::Created {
            *self.state.lock() = TaskState::Stopped;
            return Ok(());
        }
        let current = self.state();
        if current == TaskState::Stopped {
            return Ok(());
        }
        if !current.can_stop() {
            return Err(TaskError::NotStartable(current));
        }
        *self.state.lock() = TaskState::Stopping;
        self.teardown().await;
        *self.state.lock() = TaskState::Stopped;
        Ok(())
    }
}

/// A Pipeline's worker loop: consume raw packets until cancelled, sweeping
/// expired IP-reassembly fragments on a fixed tick regardless of traffic
/// (spec §4.2's reassembler TTL applies even when no further packets for a
/// stalled group ever arrive).
async fn run_worker(pipeline: &mut Pipeline, rx: &mut mpsc::Receiver<RawPacket>, cancel: &CancellationToken) {
    let mut reap_tick = tokio::time::interval(FRAGMENT_REAP_INTERVAL);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = reap_tick.tick() => pipeline.reap_expired_fragments(),
            packet = rx.recv() => match packet {
                Some(packet) => { pipeline.handle_raw(packet).await; }
                None => return,
            },
        }
    }
}

fn dispatch_key_hash(packet: &RawPacket) -> usize {
    // A cheap peek decode is unnecessary here: the dispatch key only needs
    // to be stable per-flow across the packets this Task actually receives,
    // and the raw bytes already encode the full header (Ethernet/IP/ports)
    // at a fixed early offset for the untagged, non-tunneled traffic this
    // mode targets. Tunneled/VLAN traffic loses strict per-flow stability
    // here; binding mode is the documented choice when that matters.
    let mut hasher = DefaultHasher::new();
    let header_len = packet.data.len().min(54);
    packet.data[..header_len].hash(&mut hasher);
    hasher.finish() as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use otus_core::{CaptureSpec, DecoderSpec, PluginSpec};

    fn base_config(workers: u32, dispatch_mode: DispatchMode) -> TaskConfig {
        TaskConfig {
            id: TaskId::new("t1"),
            workers,
            capture: CaptureSpec {
                plugin: "channel".into(),
                interface: "lo".into(),
                bpf_filter: None,
                snaplen: 65535,
                dispatch_mode,
            },
            decoder: DecoderSpec::default(),
            parsers: vec![],
            processors: vec![],
            reporters: vec![PluginSpec::new("console")],
        }
    }

    #[tokio::test]
    async fn starts_and_stops_cleanly() {
        let task = Arc::new(Task::new(base_config(2, DispatchMode::Binding), AgentId::new("h1")));
        task.start().await.unwrap();
        assert_eq!(task.state(), TaskState::Running);
        task.stop().await.unwrap();
        assert_eq!(task.state(), TaskState::Stopped);
    }

    #[tokio::test]
    async fn stop_is_idempotent_from_stopped() {
        let task = Arc::new(Task::new(base_config(1, DispatchMode::Binding), AgentId::new("h1")));
        task.start().await.unwrap();
        task.stop().await.unwrap();
        task.stop().await.unwrap();
        assert_eq!(task.state(), TaskState::Stopped);
    }

    #[tokio::test]
    async fn start_fails_on_unknown_capture_plugin() {
        let mut config = base_config(1, DispatchMode::Binding);
        config.capture.plugin = "nope".into();
        let task = Arc::new(Task::new(config, AgentId::new("h1")));
        let result = task.start().await;
        assert!(result.is_err());
        assert_eq!(task.state(), TaskState::Failed);
    }

    #[tokio::test]
    async fn dispatch_mode_round_robin_starts() {
        let task = Arc::new(Task::new(
            base_config(3, DispatchMode::Dispatch { strategy: DispatchStrategy::RoundRobin }),
            AgentId::new("h1"),
        ));
        task.start().await.unwrap();
        assert_eq!(task.state(), TaskState::Running);
        task.stop().await.unwrap();
    }
}
