// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! On-disk `TaskRecord` store: one JSON file per task under
//! `{data_dir}/tasks/{id}.json`, written atomically (temp file + rename,
//! spec §3) so a crash mid-write never leaves a torn record behind.

use crate::error::StorageError;
use crate::record::TaskRecord;
use otus_core::TaskId;
use std::fs;
use std::path::{Path, PathBuf};

pub struct TaskStore {
    tasks_dir: PathBuf,
}

impl TaskStore {
    /// Creates `{data_dir}/tasks` if it doesn't already exist.
    pub fn new(data_dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let tasks_dir = data_dir.as_ref().join("tasks");
        fs::create_dir_all(&tasks_dir)?;
        Ok(Self { tasks_dir })
    }

    fn path_for(&self, id: &TaskId) -> PathBuf {
        self.tasks_dir.join(format!("{}.json", id.as_str()))
    }

    /// Serializes `record` to a sibling `.tmp` file, fsyncs it, then
    /// renames it over the final path — the rename is atomic on the same
    /// filesystem, so readers never observe a partially-written record.
    pub fn save(&self, record: &TaskRecord) -> Result<(), StorageError> {
        let final_path = self.path_for(&record.id);
        let tmp_path = self.tasks_dir.join(format!("{}.json.tmp", record.id.as_str()));
        let body = serde_json::to_vec_pretty(record)?;
        {
            let file = fs::File::create(&tmp_path)?;
            use std::io::Write;
            let mut file = file;
            file.write_all(&body)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &final_path)?;
        Ok(())
    }

    pub fn load(&self, id: &TaskId) -> Result<TaskRecord, StorageError> {
        let path = self.path_for(id);
        let body = fs::read(&path).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(id.clone())
            } else {
                StorageError::Io(err)
            }
        })?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Enumerates every persisted record, used by `TaskManager::Restore`
    /// at daemon boot (spec §4.8). Stray `.tmp` files from a crash mid-save
    /// are ignored rather than surfaced as errors.
    pub fn load_all(&self) -> Result<Vec<TaskRecord>, StorageError> {
        let mut records = Vec::new();
        for entry in fs::read_dir(&self.tasks_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let body = fs::read(&path)?;
            records.push(serde_json::from_slice(&body)?);
        }
        Ok(records)
    }

    pub fn delete(&self, id: &TaskId) -> Result<(), StorageError> {
        match fs::remove_file(self.path_for(id)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Spec §4.8 `GCOldTasks`: prunes terminal-state records beyond
    /// `max_history`, oldest first by `created_at`. Mirrors
    /// `otus-pipeline::TaskManager::gc_old_tasks`'s in-memory eviction —
    /// this is the on-disk counterpart, run after the in-memory prune.
    pub fn gc(&self, max_history: usize) -> Result<Vec<TaskId>, StorageError> {
        let mut terminal: Vec<TaskRecord> = self.load_all()?.into_iter().filter(|record| record.state.is_terminal()).collect();
        if terminal.len() <= max_history {
            return Ok(Vec::new());
        }
        terminal.sort_by_key(|record| record.created_at_epoch_ms);
        let evict_count = terminal.len() - max_history;
        let mut evicted = Vec::with_capacity(evict_count);
        for record in terminal.into_iter().take(evict_count) {
            self.delete(&record.id)?;
            evicted.push(record.id);
        }
        Ok(evicted)
    }
}
