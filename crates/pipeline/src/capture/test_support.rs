// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A fixture capturer that replays a fixed packet list, used by the
//! property tests (spec §8) and the S1–S6 scenario tests.

use super::{CaptureError, Capturer};
use async_trait::async_trait;
use otus_core::RawPacket;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

pub struct ChannelCapturer {
    packets: Mutex<Vec<RawPacket>>,
    cancel: CancellationToken,
}

impl ChannelCapturer {
    pub fn new(packets: Vec<RawPacket>) -> Self {
        Self { packets: Mutex::new(packets), cancel: CancellationToken::new() }
    }
}

#[async_trait]
impl Capturer for ChannelCapturer {
    async fn start(&self, sender: tokio::sync::mpsc::Sender<RawPacket>) -> Result<(), CaptureError> {
        let packets = std::mem::take(&mut *self.packets.lock());
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            for packet in packets {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    result = sender.send(packet) => if result.is_err() { return; },
                }
            }
        });
        Ok(())
    }

    async fn stop(&self) -> Result<(), CaptureError> {
        self.cancel.cancel();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    #[tokio::test]
    async fn replays_every_packet_in_order() {
        let packets = vec![
            RawPacket::new(SystemTime::now(), vec![1], 1),
            RawPacket::new(SystemTime::now(), vec![2], 1),
        ];
        let capturer = ChannelCapturer::new(packets);
        let (tx, mut rx) = tokio::sync::mpsc::channel(8);
        capturer.start(tx).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().data, vec![1]);
        assert_eq!(rx.recv().await.unwrap().data, vec![2]);
    }
}
