// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Newline-delimited JSON-RPC framing for the UDS control surface
//! (spec §6: "Protocol: newline-separated JSON-RPC 2.0 objects").

use crate::rpc::{RpcRequest, RpcResponse};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt};

#[derive(Debug, Error)]
pub enum FramingError {
    #[error("connection closed")]
    Closed,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed json-rpc line: {0}")]
    Json(#[from] serde_json::Error),
}

/// Reads one line from `reader` and deserializes it as a request. Returns
/// [`FramingError::Closed`] on EOF (peer closed the connection) rather
/// than an empty-line parse error.
pub async fn read_request<R: AsyncBufReadExt + Unpin>(reader: &mut R) -> Result<RpcRequest, FramingError> {
    let mut line = String::new();
    let bytes_read = reader.read_line(&mut line).await?;
    if bytes_read == 0 {
        return Err(FramingError::Closed);
    }
    Ok(serde_json::from_str(line.trim_end())?)
}

/// Writes `response` as one JSON line terminated by `\n`.
pub async fn write_response<W: AsyncWriteExt + Unpin>(writer: &mut W, response: &RpcResponse) -> Result<(), FramingError> {
    let mut line = serde_json::to_string(response)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}
