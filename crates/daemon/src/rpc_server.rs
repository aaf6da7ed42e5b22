// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! UDS JSON-RPC server (spec §4.9, §6): line-delimited JSON-RPC 2.0, one
//! `tokio::spawn`ed task per connection, socket permissioned 0600.

use crate::command_handler::{CommandHandler, PostAction};
use otus_wire::{read_request, write_response, FramingError, RpcError, RpcResponse};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const RPC_DEADLINE: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum RpcServerError {
    #[error("failed to bind uds socket at {path}: {source}")]
    Bind { path: std::path::PathBuf, source: std::io::Error },
    #[error("failed to set socket permissions: {0}")]
    Permissions(#[from] std::io::Error),
}

pub struct RpcServer {
    listener: UnixListener,
}

impl RpcServer {
    /// Binds the socket and sets its permissions to 0600 (spec §6).
    /// Removes a stale socket file left by a prior crashed instance
    /// before binding, since `bind` otherwise fails with `AddrInUse`.
    pub fn bind(path: &Path) -> Result<Self, RpcServerError> {
        if path.exists() {
            let _ = std::fs::remove_file(path);
        }
        let listener = UnixListener::bind(path).map_err(|source| RpcServerError::Bind { path: path.to_path_buf(), source })?;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        Ok(Self { listener })
    }

    /// Accepts connections until `cancel` fires, spawning one task per
    /// connection; each connection is independent (spec §6). Returns once
    /// every spawned connection task has drained, so the caller can rely
    /// on `stop_all`/on-disk flush happening after all in-flight RPCs
    /// finish.
    pub async fn serve(self, handler: Arc<CommandHandler>, cancel: CancellationToken) {
        let mut connections = tokio::task::JoinSet::new();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, _addr)) => {
                            let handler = Arc::clone(&handler);
                            let conn_cancel = cancel.clone();
                            connections.spawn(async move { handle_connection(stream, handler, conn_cancel).await });
                        }
                        Err(err) => warn!(error = %err, "failed to accept uds connection"),
                    }
                }
            }
        }
        connections.abort_all();
        while connections.join_next().await.is_some() {}
        info!("uds server stopped accepting connections");
    }
}

async fn handle_connection(stream: UnixStream, handler: Arc<CommandHandler>, cancel: CancellationToken) {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    loop {
        let request = tokio::select! {
            _ = cancel.cancelled() => return,
            request = read_request(&mut reader) => request,
        };
        let request = match request {
            Ok(request) => request,
            Err(FramingError::Closed) => return,
            Err(err) => {
                warn!(error = %err, "malformed json-rpc line, closing connection");
                let response = RpcResponse::err("", RpcError::new(otus_core::error::jsonrpc_code::PARSE_ERROR, err.to_string()));
                let _ = write_response(&mut write_half, &response).await;
                return;
            }
        };

        let response = match tokio::time::timeout(RPC_DEADLINE, handler.handle(&request)).await {
            Ok((response, PostAction::None)) => response,
            Ok((response, PostAction::Shutdown)) => {
                if write_response(&mut write_half, &response).await.is_err() {
                    return;
                }
                let _ = write_half.shutdown().await;
                cancel.cancel();
                return;
            }
            Err(_) => RpcResponse::err(request.id.clone(), RpcError::internal("request exceeded the per-rpc deadline")),
        };

        if let Err(err) = write_response(&mut write_half, &response).await {
            error!(error = %err, "failed to write json-rpc response");
            return;
        }
    }
}
