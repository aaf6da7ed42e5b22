// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Capturer contract (spec §4.1) and its concrete backends.

#[cfg(feature = "pcap-capture")]
mod pcap_capturer;
mod test_support;

#[cfg(feature = "pcap-capture")]
pub use pcap_capturer::PcapCapturer;
pub use test_support::ChannelCapturer;

use async_trait::async_trait;
use otus_core::RawPacket;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open capture device {iface}: {reason}")]
    OpenFailed { iface: String, reason: String },
    #[error("invalid BPF filter {filter:?}: {reason}")]
    InvalidFilter { filter: String, reason: String },
    #[error("capture stopped")]
    Stopped,
}

/// A live or simulated source of [`RawPacket`]s (spec §4.1). A Task owns
/// exactly one Capturer, shared across its Pipelines in dispatch mode.
#[async_trait]
pub trait Capturer: Send + Sync {
    /// Open the device/source and start delivering packets on `sender`.
    /// Returns once the capture loop has been spawned; packets arrive
    /// asynchronously until `stop` is called or the source is exhausted.
    async fn start(&self, sender: tokio::sync::mpsc::Sender<RawPacket>) -> Result<(), CaptureError>;

    /// Signal the capture loop to stop and wait for it to exit.
    async fn stop(&self) -> Result<(), CaptureError>;
}
