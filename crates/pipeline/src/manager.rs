// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task Manager (spec §4.8): owns the id→Task map behind a single mutex
//! held only across bookkeeping, never across `Task::start`/`stop`.

use crate::task::{Task, TaskError};
use otus_core::{AgentId, TaskConfig, TaskId, TaskState};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("task {0:?} already exists")]
    AlreadyExists(String),
    #[error("task {0:?} not found")]
    NotFound(String),
    #[error(transparent)]
    Config(#[from] otus_core::TaskConfigError),
    #[error(transparent)]
    Task(#[from] TaskError),
}

pub struct TaskManager {
    agent_id: AgentId,
    tasks: Mutex<HashMap<TaskId, Arc<Task>>>,
}

impl TaskManager {
    pub fn new(agent_id: AgentId) -> Self {
        Self { agent_id, tasks: Mutex::new(HashMap::new()) }
    }

    /// Spec §4.8 `Create`: rejects an existing id, persists as `created`
    /// (persistence is the caller's concern — this crate only enforces the
    /// map-membership invariant), releases the lock, then starts the Task.
    /// On start failure the Task is already `failed`; the entry stays in
    /// the map for `Status`/history rather than being silently dropped.
    pub async fn create(&self, config: TaskConfig) -> Result<Arc<Task>, ManagerError> {
        config.validate()?;
        let task = {
            let mut tasks = self.tasks.lock();
            if tasks.contains_key(&config.id) {
                return Err(ManagerError::AlreadyExists(config.id.as_str().to_string()));
            }
            let task = Arc::new(Task::new(config.clone(), self.agent_id.clone()));
            tasks.insert(config.id.clone(), Arc::clone(&task));
            task
        };
        task.start().await?;
        Ok(task)
    }

    /// Spec §4.8 `Delete`: moves the Task to stopping, stops it outside the
    /// lock, then removes it from the map.
    pub async fn delete(&self, id: &TaskId) -> Result<(), ManagerError> {
        let task = self.get(id)?;
        task.stop().await?;
        self.tasks.lock().remove(id);
        Ok(())
    }

    pub fn list(&self) -> Vec<TaskId> {
        self.tasks.lock().keys().cloned().collect()
    }

    pub fn get(&self, id: &TaskId) -> Result<Arc<Task>, ManagerError> {
        self.tasks.lock().get(id).cloned().ok_or_else(|| ManagerError::NotFound(id.as_str().to_string()))
    }

    pub fn status(&self, id: &TaskId) -> Result<TaskState, ManagerError> {
        Ok(self.get(id)?.state())
    }

    /// Spec §4.8 `StopAll`: stops every task in parallel with bounded
    /// concurrency and a deadline, used on daemon shutdown.
    pub async fn stop_all(&self, concurrency: usize, deadline: Duration) {
        let tasks: Vec<Arc<Task>> = self.tasks.lock().values().cloned().collect();
        let semaphore = Arc::new(tokio::sync::Semaphore::new(concurrency.max(1)));
        let mut joins = tokio::task::JoinSet::new();
        for task in tasks {
            let semaphore = Arc::clone(&semaphore);
            joins.spawn(async move {
                let _permit = semaphore.acquire().await;
                let _ = tokio::time::timeout(deadline, task.stop()).await;
            });
        }
        while joins.join_next().await.is_some() {}
    }

    /// Spec §4.8 `GCOldTasks`: prunes terminal-state entries beyond the
    /// cap, oldest first by `started_at`. Persistence-backed history beyond
    /// this in-memory map is `otus-storage`'s concern.
    pub fn gc_old_tasks(&self, max_history: usize) -> Vec<TaskId> {
        let mut tasks = self.tasks.lock();
        let mut terminal: Vec<(TaskId, Option<std::time::SystemTime>)> = tasks
            .iter()
            .filter(|(_, task)| task.state().is_terminal())
            .map(|(id, task)| (id.clone(), task.started_at()))
            .collect();
        if terminal.len() <= max_history {
            return Vec::new();
        }
        terminal.sort_by_key(|(_, started_at)| *started_at);
        let evict_count = terminal.len() - max_history;
        let evicted: Vec<TaskId> = terminal.into_iter().take(evict_count).map(|(id, _)| id).collect();
        for id in &evicted {
            tasks.remove(id);
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use otus_core::{CaptureSpec, DecoderSpec, DispatchMode, PluginSpec};

    fn config(id: &str) -> TaskConfig {
        TaskConfig {
            id: TaskId::new(id),
            workers: 1,
            capture: CaptureSpec { plugin: "channel".into(), interface: "lo".into(), bpf_filter: None, snaplen: 65535, dispatch_mode: DispatchMode::Binding },
            decoder: DecoderSpec::default(),
            parsers: vec![],
            processors: vec![],
            reporters: vec![PluginSpec::new("console")],
        }
    }

    #[tokio::test]
    async fn create_rejects_duplicate_id() {
        let manager = TaskManager::new(AgentId::new("h1"));
        manager.create(config("t1")).await.unwrap();
        let result = manager.create(config("t1")).await;
        assert!(matches!(result, Err(ManagerError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn delete_removes_from_map() {
        let manager = TaskManager::new(AgentId::new("h1"));
        manager.create(config("t1")).await.unwrap();
        manager.delete(&TaskId::new("t1")).await.unwrap();
        assert!(manager.list().is_empty());
    }

    #[tokio::test]
    async fn stop_all_drains_every_running_task_under_bounded_concurrency() {
        let manager = TaskManager::new(AgentId::new("h1"));
        for id in ["t1", "t2", "t3", "t4"] {
            manager.create(config(id)).await.unwrap();
        }
        manager.stop_all(2, Duration::from_secs(5)).await;
        for id in ["t1", "t2", "t3", "t4"] {
            let task = manager.get(&TaskId::new(id)).unwrap();
            assert_eq!(task.state(), TaskState::Stopped);
        }
    }

    #[tokio::test]
    async fn gc_prunes_oldest_terminal_tasks_beyond_cap() {
        let manager = TaskManager::new(AgentId::new("h1"));
        for id in ["t1", "t2", "t3"] {
            let mut bad = config(id);
            bad.capture.plugin = "nope".into();
            // create() fails to start but still leaves the Failed task in
            // the map — exactly the terminal-but-retained case GC targets.
            assert!(manager.create(bad).await.is_err());
        }
        let evicted = manager.gc_old_tasks(1);
        assert_eq!(evicted.len(), 2);
        assert_eq!(manager.list().len(), 1);
    }
}
