// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The reference live capturer, backed by `pcap::Capture<Active>` (spec
//! §4.1). Binding-mode fanout is approximated by opening one `Capture` per
//! worker on the same interface — the `pcap` crate has no `PACKET_FANOUT`
//! equivalent, so true kernel-level load balancing is out of reach here
//! (documented in DESIGN.md).

use super::{CaptureError, Capturer};
use otus_core::RawPacket;
use parking_lot::Mutex;
use std::time::SystemTime;
use tokio_util::sync::CancellationToken;

pub struct PcapCapturer {
    interface: String,
    bpf_filter: Option<String>,
    snaplen: u32,
    cancel: CancellationToken,
    worker: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl PcapCapturer {
    pub fn new(interface: impl Into<String>, bpf_filter: Option<String>, snaplen: u32) -> Self {
        Self {
            interface: interface.into(),
            bpf_filter,
            snaplen,
            cancel: CancellationToken::new(),
            worker: Mutex::new(None),
        }
    }

    fn open(&self) -> Result<pcap::Capture<pcap::Active>, CaptureError> {
        let mut cap = pcap::Capture::from_device(self.interface.as_str())
            .map_err(|err| CaptureError::OpenFailed { iface: self.interface.clone(), reason: err.to_string() })?
            .promisc(true)
            .snaplen(self.snaplen as i32)
            .timeout(250)
            .open()
            .map_err(|err| CaptureError::OpenFailed { iface: self.interface.clone(), reason: err.to_string() })?;
        if let Some(filter) = &self.bpf_filter {
            cap.filter(filter, true)
                .map_err(|err| CaptureError::InvalidFilter { filter: filter.clone(), reason: err.to_string() })?;
        }
        Ok(cap)
    }
}

#[async_trait::async_trait]
impl Capturer for PcapCapturer {
    async fn start(&self, sender: tokio::sync::mpsc::Sender<RawPacket>) -> Result<(), CaptureError> {
        let mut cap = self.open()?;
        let cancel = self.cancel.clone();
        let iface = self.interface.clone();
        let handle = std::thread::spawn(move || {
            while !cancel.is_cancelled() {
                match cap.next_packet() {
                    Ok(packet) => {
                        let raw = RawPacket::new(
                            SystemTime::now(),
                            packet.data.to_vec(),
                            packet.header.len,
                        );
                        if sender.blocking_send(raw).is_err() {
                            return;
                        }
                    }
                    Err(pcap::Error::TimeoutExpired) => continue,
                    Err(err) => {
                        tracing::warn!(iface = %iface, error = %err, "capture read failed");
                        return;
                    }
                }
            }
        });
        *self.worker.lock() = Some(handle);
        Ok(())
    }

    async fn stop(&self) -> Result<(), CaptureError> {
        self.cancel.cancel();
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            let _ = tokio::task::spawn_blocking(move || handle.join()).await;
        }
        Ok(())
    }
}
