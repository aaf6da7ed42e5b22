// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

//! Shared domain types for the Otus packet-capture agent: identifiers,
//! packet/flow types, the Task config and state machine, the error-kind
//! taxonomy, a testable clock, and timestamp formatting helpers used by
//! every other crate in this workspace.

pub mod clock;
pub mod error;
pub mod flow;
pub mod id;
#[macro_use]
pub mod macros;
pub mod packet;
pub mod task;
pub mod time_fmt;

pub use clock::{Clock, FakeClock, SystemClock};
pub use error::{ErrorClass, ErrorKind};
pub use flow::{FlowContext, FlowKey};
pub use id::{AgentId, RequestId, TaskId};
pub use packet::{
    DecodedPacket, EthernetHeader, FiveTuple, IpHeader, OutputPacket, PayloadType, Protocol,
    RawPacket, TransportHeader, WireFiveTuple,
};
pub use task::{
    CaptureSpec, DecoderSpec, DispatchMode, DispatchStrategy, PipelineStats, PluginSpec,
    TaskConfig, TaskConfigError, TaskState, TaskStats,
};
