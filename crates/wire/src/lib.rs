// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

//! Wire types for the control surface (spec §3, §4.9, §6): JSON-RPC 2.0
//! over the UDS socket, Kafka command/response envelopes, and the legacy
//! `SimpleCommand` array format accepted on the same command topic.

mod framing;
mod kafka_envelope;
mod rpc;
mod simple_command;

pub use framing::{read_request, write_response, FramingError};
pub use kafka_envelope::{KafkaCommandEnvelope, KafkaResponseEnvelope, TARGET_ALL};
pub use rpc::{RpcError, RpcRequest, RpcResponse};
pub use simple_command::{PortRange, SimpleCommand, SimpleCommandAction, SimpleCommandBatch};
