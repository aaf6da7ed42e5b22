// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

//! Reporter plugins (spec §4.5): the `Reporter`/`Sink` contracts, the shared
//! batching/retry/fallback machinery, and the Kafka and console backends.

mod batching;
mod console;
mod error;
#[cfg(feature = "kafka")]
mod kafka;
mod traits;

pub use batching::{BatchingConfig, BatchingReporter};
pub use console::ConsoleSink;
pub use error::ReporterError;
#[cfg(feature = "kafka")]
pub use kafka::{KafkaSink, KafkaSinkConfig, TopicRouting};
pub use traits::{Reporter, Sink};
