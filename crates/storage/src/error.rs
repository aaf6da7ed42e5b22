// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use otus_core::{ErrorClass, ErrorKind, TaskId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error persisting task record: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed task record: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no persisted record for task {0:?}")]
    NotFound(TaskId),
}

impl ErrorClass for StorageError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::PersistenceWriteFailed
    }
}
