// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use otus_core::{ErrorClass, ErrorKind};

/// Parser failures (spec §4.3, §7 `ParseFailed`: "downgraded to `raw`
/// payload-type and still emitted", never a hard error to the pipeline).
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("malformed request/status line: {0}")]
    MalformedStartLine(String),
    #[error("missing required header: {0}")]
    MissingHeader(&'static str),
    #[error("malformed sdp body: {0}")]
    MalformedSdp(String),
    #[error("payload is not valid utf-8")]
    NotUtf8,
}

impl ErrorClass for ParseError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::ParseFailed
    }
}
