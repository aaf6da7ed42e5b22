// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use otus_core::{ErrorClass, ErrorKind};

/// Decode failures (spec §4.2: "too-short buffers, unsupported EtherType").
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("buffer too short for {layer} header: {len} bytes")]
    TooShort { layer: &'static str, len: usize },
    #[error("unsupported ethertype 0x{0:04x}")]
    UnsupportedEtherType(u16),
    #[error("unsupported ip protocol {0}")]
    UnsupportedIpProtocol(u8),
    #[error("unknown tunnel kind: {0}")]
    UnknownTunnel(String),
    #[error("tunnel unwrap failed: {0}")]
    TunnelUnwrapFailed(String),
    #[error("etherparse: {0}")]
    Etherparse(String),
}

impl ErrorClass for DecodeError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::DecodeFailed
    }
}
