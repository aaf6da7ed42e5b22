// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `TaskRecord` (spec §3): the persisted shadow of a `Task` — its config,
//! last observed state, and timestamps, written on every state change so
//! `TaskManager::Restore` can recreate Tasks after a restart.

use otus_core::{Clock, TaskConfig, TaskId, TaskState};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub config: TaskConfig,
    pub state: TaskState,
    pub created_at_epoch_ms: u64,
    pub updated_at_epoch_ms: u64,
    pub last_error: Option<String>,
}

impl TaskRecord {
    /// A freshly `Create`d record, state `Created`, no error.
    pub fn new(config: TaskConfig, clock: &impl Clock) -> Self {
        let now = clock.epoch_ms();
        Self { id: config.id.clone(), config, state: TaskState::Created, created_at_epoch_ms: now, updated_at_epoch_ms: now, last_error: None }
    }

    /// Updates `state`/`last_error` and bumps `updated_at`, leaving
    /// `created_at` untouched (spec §3: "Written on state change").
    pub fn transition(&mut self, state: TaskState, last_error: Option<String>, clock: &impl Clock) {
        self.state = state;
        self.last_error = last_error;
        self.updated_at_epoch_ms = clock.epoch_ms();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use otus_core::{CaptureSpec, DispatchMode, FakeClock, PluginSpec};

    fn config() -> TaskConfig {
        TaskConfig {
            id: TaskId::new("t1"),
            workers: 1,
            capture: CaptureSpec { plugin: "channel".into(), interface: "lo".into(), bpf_filter: None, snaplen: 65535, dispatch_mode: DispatchMode::Binding },
            decoder: Default::default(),
            parsers: vec![],
            processors: vec![],
            reporters: vec![PluginSpec::new("console")],
        }
    }

    #[test]
    fn new_record_starts_created_with_no_error() {
        let clock = FakeClock::new();
        let record = TaskRecord::new(config(), &clock);
        assert_eq!(record.state, TaskState::Created);
        assert!(record.last_error.is_none());
        assert_eq!(record.created_at_epoch_ms, record.updated_at_epoch_ms);
    }

    #[test]
    fn transition_bumps_updated_at_but_not_created_at() {
        let clock = FakeClock::new();
        let mut record = TaskRecord::new(config(), &clock);
        let created = record.created_at_epoch_ms;
        clock.advance(std::time::Duration::from_secs(1));
        record.transition(TaskState::Failed, Some("capture open failed".into()), &clock);
        assert_eq!(record.created_at_epoch_ms, created);
        assert!(record.updated_at_epoch_ms > created);
        assert_eq!(record.last_error.as_deref(), Some("capture open failed"));
    }
}
