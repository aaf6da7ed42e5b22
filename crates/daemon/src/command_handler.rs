// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command Handler (spec §4.9): dispatches JSON-RPC methods arriving over
//! the UDS socket or the Kafka command channel onto the `TaskManager` and
//! `TaskStore`, keeping persisted records in sync with in-memory state.

use crate::config::GlobalConfig;
use otus_core::error::{jsonrpc_code, ErrorKind};
use otus_core::{Clock, SystemClock, TaskConfig, TaskId, TaskState};
use otus_pipeline::{ManagerError, TaskManager};
use otus_storage::{TaskRecord, TaskStore};
use otus_wire::{RpcError, RpcRequest, RpcResponse};
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// What the RPC transport must do after writing the response (spec §4.9:
/// `daemon_shutdown` "responds... then asynchronously triggers graceful
/// stop after the response is written").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostAction {
    None,
    Shutdown,
}

pub struct CommandHandler {
    manager: Arc<TaskManager>,
    store: Arc<TaskStore>,
    config: RwLock<GlobalConfig>,
    config_path: PathBuf,
    hostname: String,
    start_time: Instant,
}

impl CommandHandler {
    pub fn new(manager: Arc<TaskManager>, store: Arc<TaskStore>, config: GlobalConfig, config_path: PathBuf, hostname: String) -> Self {
        Self { manager, store, config: RwLock::new(config), config_path, hostname, start_time: Instant::now() }
    }

    pub async fn handle(&self, request: &RpcRequest) -> (RpcResponse, PostAction) {
        let id = request.id.clone();
        let result = match request.method.as_str() {
            "task_create" => self.task_create(request.params.clone()).await,
            "task_delete" => self.task_delete_by_id(request.params.clone()).await,
            "task_list" => Ok(serde_json::json!({ "tasks": self.manager.list().iter().map(|t| t.as_str().to_string()).collect::<Vec<_>>() })),
            "task_status" => self.task_status(request.params.clone()),
            "task_start" => self.task_start_role(request.params.clone()).await,
            "task_stop" => self.task_stop_role(request.params.clone()).await,
            "config_reload" => self.config_reload(),
            "daemon_status" => Ok(self.daemon_status()),
            "daemon_stats" => Ok(self.daemon_stats()),
            "daemon_shutdown" => {
                return (RpcResponse::ok(id, serde_json::json!("shutting_down")), PostAction::Shutdown);
            }
            other => Err(RpcError::method_not_found(other)),
        };
        match result {
            Ok(value) => (RpcResponse::ok(id, value), PostAction::None),
            Err(err) => (RpcResponse::err(id, err), PostAction::None),
        }
    }

    async fn task_create(&self, params: serde_json::Value) -> Result<serde_json::Value, RpcError> {
        let config: TaskConfig = serde_json::from_value(params).map_err(|err| RpcError::invalid_params(err.to_string()))?;
        self.create_and_persist(config).await
    }

    /// Persists the `created` record, calls `Task.Start()`, then persists
    /// the resulting state — `failed` on start failure, matching spec
    /// §4.8's `Create` sequencing.
    async fn create_and_persist(&self, config: TaskConfig) -> Result<serde_json::Value, RpcError> {
        let clock = SystemClock;
        let mut record = TaskRecord::new(config.clone(), &clock);
        let id = record.id.clone();
        if let Err(err) = self.store.save(&record) {
            warn!(task_id = %id, error = %err, "failed to persist created task record");
        }
        match self.manager.create(config).await {
            Ok(task) => {
                record.transition(task.state(), task.error_message(), &clock);
                let _ = self.store.save(&record);
                Ok(serde_json::json!({ "id": id.as_str(), "state": task.state().to_string() }))
            }
            Err(err) => {
                record.transition(TaskState::Failed, Some(err.to_string()), &clock);
                let _ = self.store.save(&record);
                Err(manager_error_to_rpc(err))
            }
        }
    }

    async fn task_delete_by_id(&self, params: serde_json::Value) -> Result<serde_json::Value, RpcError> {
        let id = parse_task_id(&params)?;
        self.delete_and_persist(&id).await
    }

    async fn delete_and_persist(&self, id: &TaskId) -> Result<serde_json::Value, RpcError> {
        self.manager.delete(id).await.map_err(|err| RpcError::internal(err.to_string()))?;
        if let Ok(mut record) = self.store.load(id) {
            record.transition(TaskState::Stopped, None, &SystemClock);
            let _ = self.store.save(&record);
        }
        Ok(serde_json::json!({ "id": id.as_str() }))
    }

    fn task_status(&self, params: serde_json::Value) -> Result<serde_json::Value, RpcError> {
        let id = parse_task_id(&params)?;
        let task = self.manager.get(&id).map_err(|err| RpcError::internal(err.to_string()))?;
        Ok(serde_json::json!({
            "id": id.as_str(),
            "state": task.state().to_string(),
            "error": task.error_message(),
            "stats": task.stats(),
        }))
    }

    async fn task_start_role(&self, params: serde_json::Value) -> Result<serde_json::Value, RpcError> {
        let role = parse_role(&params)?;
        let mut config = self.role_task_config(&role)?;
        if let Some(bpf_override) = params.get("bpf_override").and_then(|v| v.as_str()) {
            config.capture.bpf_filter = Some(bpf_override.to_string());
        }
        self.create_and_persist(config).await
    }

    async fn task_stop_role(&self, params: serde_json::Value) -> Result<serde_json::Value, RpcError> {
        let role = parse_role(&params)?;
        self.delete_and_persist(&TaskId::new(role)).await
    }

    /// Resolves a role to its default `TaskConfig`, with `id` forced to
    /// the role name so `task_stop`'s role shorthand can find it again
    /// (spec §4.9: "role-based shorthand ... delete the default").
    fn role_task_config(&self, role: &str) -> Result<TaskConfig, RpcError> {
        let config = self.config.read();
        let mut task_config = config.otus.roles.get(role).cloned().ok_or_else(|| RpcError::invalid_params(format!("no default task config for role {role:?}")))?;
        task_config.id = TaskId::new(role);
        Ok(task_config)
    }

    /// Re-reads the config file; only the hot-reloadable fields (log
    /// level/format, metrics collect interval) take effect immediately,
    /// everything else is reported back as requiring a restart (spec
    /// §4.9).
    fn config_reload(&self) -> Result<serde_json::Value, RpcError> {
        let new_config = GlobalConfig::load(&self.config_path).map_err(|err| RpcError::internal(err.to_string()))?;
        let mut current = self.config.write();
        let requires_restart = current.hot_reloadable_diff(&new_config);
        current.otus.log.level = new_config.otus.log.level.clone();
        current.otus.log.format = new_config.otus.log.format.clone();
        current.otus.metrics.collect_interval_secs = new_config.otus.metrics.collect_interval_secs;
        info!(requires_restart = ?requires_restart, "config reloaded");
        Ok(serde_json::json!({ "applied": ["log.level", "log.format", "metrics.collect_interval_secs"], "requires_restart": requires_restart }))
    }

    fn daemon_status(&self) -> serde_json::Value {
        serde_json::json!({
            "hostname": self.hostname,
            "uptime_secs": self.start_time.elapsed().as_secs(),
            "task_count": self.manager.list().len(),
        })
    }

    fn daemon_stats(&self) -> serde_json::Value {
        let tasks: serde_json::Map<String, serde_json::Value> = self
            .manager
            .list()
            .into_iter()
            .filter_map(|id| {
                let task = self.manager.get(&id).ok()?;
                Some((id.as_str().to_string(), serde_json::to_value(task.stats()).unwrap_or(serde_json::Value::Null)))
            })
            .collect();
        serde_json::json!({ "tasks": tasks })
    }

    /// Spec §4.8 `GCOldTasks`, invoked on a timer by the composition root:
    /// prunes both the in-memory map and the on-disk record history.
    pub fn gc_old_tasks(&self, max_history: usize) {
        let evicted = self.manager.gc_old_tasks(max_history);
        for id in &evicted {
            let _ = self.store.delete(id);
        }
        if let Ok(evicted_on_disk) = self.store.gc(max_history) {
            if !evicted_on_disk.is_empty() {
                info!(count = evicted_on_disk.len(), "pruned on-disk task history beyond cap");
            }
        }
    }

    pub fn manager(&self) -> &Arc<TaskManager> {
        &self.manager
    }

    /// Spec §4.8 `Restore`: enumerates persisted records at boot; when
    /// `auto_restart` is set, recreates and starts Tasks whose last known
    /// state was `starting`, `running`, or `stopping`. Terminal-state
    /// records are left on disk for history, not recreated. Returns the
    /// number of tasks actually restarted.
    pub async fn restore(&self, auto_restart: bool) -> usize {
        let records = match self.store.load_all() {
            Ok(records) => records,
            Err(err) => {
                warn!(error = %err, "failed to enumerate persisted task records during restore");
                return 0;
            }
        };
        if !auto_restart {
            info!(count = records.len(), "auto_restart disabled, leaving persisted records untouched");
            return 0;
        }
        let mut restarted = 0;
        for record in records {
            if !matches!(record.state, TaskState::Starting | TaskState::Running | TaskState::Stopping) {
                continue;
            }
            let id = record.id.clone();
            match self.create_and_persist(record.config).await {
                Ok(_) => restarted += 1,
                Err(err) => warn!(task_id = %id, error = %err.message, "failed to restore persisted task"),
            }
        }
        info!(restarted, "completed task restore from persisted records");
        restarted
    }
}

fn parse_task_id(params: &serde_json::Value) -> Result<TaskId, RpcError> {
    params.get("id").and_then(|v| v.as_str()).map(TaskId::new).ok_or_else(|| RpcError::invalid_params("missing `id` parameter"))
}

fn parse_role(params: &serde_json::Value) -> Result<String, RpcError> {
    params.get("role").and_then(|v| v.as_str()).map(str::to_string).ok_or_else(|| RpcError::invalid_params("missing `role` parameter"))
}

/// A bad config or a duplicate id is the caller's fault, not the daemon's —
/// surface both as `INVALID_PARAMS` rather than the `AlreadyExists`/`Config`
/// blanket-internal treatment.
fn manager_error_to_rpc(err: ManagerError) -> RpcError {
    let code = match &err {
        ManagerError::AlreadyExists(_) => ErrorKind::CommandInvalidParams.jsonrpc_code(),
        ManagerError::Config(_) => ErrorKind::ConfigInvalid.jsonrpc_code(),
        _ => jsonrpc_code::INTERNAL_ERROR,
    };
    RpcError::new(code, err.to_string())
}

/// JSON-RPC's catch-all parse-error code, surfaced by the transport layer
/// before a request even reaches [`CommandHandler::handle`].
pub const PARSE_ERROR: i32 = jsonrpc_code::PARSE_ERROR;

#[cfg(test)]
mod tests {
    use super::*;
    use otus_core::{AgentId, CaptureSpec, DispatchMode, PluginSpec};

    fn config(id: &str) -> TaskConfig {
        TaskConfig {
            id: TaskId::new(id),
            workers: 1,
            capture: CaptureSpec { plugin: "channel".into(), interface: "lo".into(), bpf_filter: None, snaplen: 65535, dispatch_mode: DispatchMode::Binding },
            decoder: Default::default(),
            parsers: vec![],
            processors: vec![],
            reporters: vec![PluginSpec::new("console")],
        }
    }

    fn handler(dir: &std::path::Path) -> CommandHandler {
        let manager = Arc::new(TaskManager::new(AgentId::new("test-host")));
        let store = Arc::new(TaskStore::new(dir).unwrap());
        CommandHandler::new(manager, store, GlobalConfig::default(), dir.join("config.toml"), "test-host".into())
    }

    #[tokio::test]
    async fn task_create_persists_record_and_starts_task() {
        let dir = tempfile::tempdir().unwrap();
        let handler = handler(dir.path());
        let request = RpcRequest::new("task_create", serde_json::to_value(config("t1")).unwrap(), "r1");
        let (response, post) = handler.handle(&request).await;
        assert_eq!(post, PostAction::None);
        assert!(response.error.is_none(), "{:?}", response.error);
        let record = handler.store.load(&TaskId::new("t1")).unwrap();
        assert_eq!(record.state, TaskState::Running);
    }

    #[tokio::test]
    async fn create_delete_create_reaches_identical_final_state() {
        let dir = tempfile::tempdir().unwrap();
        let handler = handler(dir.path());
        let id = TaskId::new("t1");

        handler.create_and_persist(config("t1")).await.unwrap();
        let first = handler.manager().get(&id).unwrap();
        assert_eq!(first.state(), TaskState::Running);

        handler.delete_and_persist(&id).await.unwrap();
        assert!(handler.manager().get(&id).is_err());

        handler.create_and_persist(config("t1")).await.unwrap();
        let second = handler.manager().get(&id).unwrap();
        assert_eq!(second.state(), TaskState::Running);

        let record = handler.store.load(&id).unwrap();
        assert_eq!(record.state, TaskState::Running);
    }

    #[tokio::test]
    async fn duplicate_task_create_surfaces_as_invalid_params() {
        let dir = tempfile::tempdir().unwrap();
        let handler = handler(dir.path());
        let request = RpcRequest::new("task_create", serde_json::to_value(config("t1")).unwrap(), "r1");
        let (first, _) = handler.handle(&request).await;
        assert!(first.error.is_none(), "{:?}", first.error);

        let (second, _) = handler.handle(&request).await;
        assert_eq!(second.error.unwrap().code, jsonrpc_code::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn unknown_method_returns_method_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let handler = handler(dir.path());
        let request = RpcRequest::new("bogus_method", serde_json::Value::Null, "r1");
        let (response, _) = handler.handle(&request).await;
        assert_eq!(response.error.unwrap().code, jsonrpc_code::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn daemon_shutdown_signals_post_action_before_stopping() {
        let dir = tempfile::tempdir().unwrap();
        let handler = handler(dir.path());
        let request = RpcRequest::new("daemon_shutdown", serde_json::Value::Null, "r1");
        let (response, post) = handler.handle(&request).await;
        assert_eq!(post, PostAction::Shutdown);
        assert_eq!(response.result, Some(serde_json::json!("shutting_down")));
    }

    #[tokio::test]
    async fn task_start_role_rejects_unknown_role() {
        let dir = tempfile::tempdir().unwrap();
        let handler = handler(dir.path());
        let request = RpcRequest::new("task_start", serde_json::json!({"role": "sbc"}), "r1");
        let (response, _) = handler.handle(&request).await;
        assert_eq!(response.error.unwrap().code, jsonrpc_code::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn task_start_role_applies_bpf_override_onto_role_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let mut handler = handler(dir.path());
        handler.config.get_mut().otus.roles.insert("sbc".to_string(), config("sbc"));
        let request = RpcRequest::new("task_start", serde_json::json!({"role": "sbc", "bpf_override": "udp and port 5060"}), "r1");
        let (response, _) = handler.handle(&request).await;
        assert!(response.error.is_none(), "{:?}", response.error);
        let record = handler.store.load(&TaskId::new("sbc")).unwrap();
        assert_eq!(record.config.capture.bpf_filter.as_deref(), Some("udp and port 5060"));
    }

    #[tokio::test]
    async fn restore_recreates_only_non_terminal_records() {
        let dir = tempfile::tempdir().unwrap();
        let clock = otus_core::SystemClock;
        let store = TaskStore::new(dir.path()).unwrap();
        let mut running = TaskRecord::new(config("running"), &clock);
        running.transition(TaskState::Running, None, &clock);
        store.save(&running).unwrap();
        let mut stopped = TaskRecord::new(config("stopped"), &clock);
        stopped.transition(TaskState::Stopped, None, &clock);
        store.save(&stopped).unwrap();

        let manager = Arc::new(TaskManager::new(otus_core::AgentId::new("test-host")));
        let handler = CommandHandler::new(Arc::clone(&manager), Arc::new(TaskStore::new(dir.path()).unwrap()), GlobalConfig::default(), dir.join("config.toml"), "test-host".into());
        let restarted = handler.restore(true).await;
        assert_eq!(restarted, 1);
        assert!(manager.get(&TaskId::new("running")).is_ok());
        assert!(manager.get(&TaskId::new("stopped")).is_err());
    }

    #[tokio::test]
    async fn restore_skips_everything_when_auto_restart_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let clock = otus_core::SystemClock;
        let store = TaskStore::new(dir.path()).unwrap();
        let mut running = TaskRecord::new(config("running"), &clock);
        running.transition(TaskState::Running, None, &clock);
        store.save(&running).unwrap();

        let handler = handler(dir.path());
        let restarted = handler.restore(false).await;
        assert_eq!(restarted, 0);
        assert!(handler.manager().get(&TaskId::new("running")).is_err());
    }
}
