// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

//! Library surface behind the `otusd` binary: configuration, the Command
//! Handler, metrics/tracing setup, and the UDS/Kafka transports (spec §4,
//! §6). Split out of `main.rs` so integration tests can drive the pieces
//! directly.

pub mod command_handler;
pub mod config;
#[cfg(feature = "kafka")]
pub mod kafka_consumer;
pub mod metrics;
pub mod rpc_server;
pub mod tracing_setup;
