// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use otus_core::{ErrorClass, ErrorKind};

/// Reporter failures (spec §4.5, §7).
#[derive(Debug, thiserror::Error)]
pub enum ReporterError {
    #[error("send buffer full past high watermark")]
    BackpressureBlocked,
    #[error("sink send failed: {0}")]
    SendFailed(String),
    #[error("flush deadline exceeded with {0} packets still pending")]
    FlushDeadlineExceeded(usize),
    #[error("reporter init failed: {0}")]
    InitFailed(String),
}

impl ErrorClass for ReporterError {
    fn kind(&self) -> ErrorKind {
        match self {
            ReporterError::BackpressureBlocked => ErrorKind::BackpressureBlocked,
            _ => ErrorKind::ReporterSendFailed,
        }
    }
}
