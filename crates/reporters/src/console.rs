// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Newline-delimited JSON stdout sink (spec §4.5), the default fallback
//! reporter and the one used by test/demo tasks that don't configure Kafka.

use crate::error::ReporterError;
use crate::traits::Sink;
use async_trait::async_trait;
use otus_core::OutputPacket;

pub struct ConsoleSink;

#[async_trait]
impl Sink for ConsoleSink {
    fn name(&self) -> &'static str {
        "console"
    }

    async fn send_batch(&self, batch: &[OutputPacket]) -> Result<(), ReporterError> {
        for packet in batch {
            let line = serde_json::to_string(packet).map_err(|err| ReporterError::SendFailed(err.to_string()))?;
            tracing::info!(target: "otus::reporter::console", "{line}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use otus_core::{PayloadType, TaskId, AgentId, WireFiveTuple};
    use std::time::SystemTime;

    #[tokio::test]
    async fn send_batch_serializes_every_packet() {
        let sink = ConsoleSink;
        let packet = OutputPacket {
            task_id: TaskId::new("t1"),
            agent_id: AgentId::new("h1"),
            pipeline_id: 0,
            five_tuple: WireFiveTuple {
                src_ip: "10.0.0.1".parse().unwrap(),
                dst_ip: "10.0.0.2".parse().unwrap(),
                src_port: 1,
                dst_port: 2,
                protocol: 17,
            },
            timestamp: SystemTime::now(),
            payload_type: PayloadType::Raw,
            labels: Default::default(),
            payload: None,
            raw_payload: vec![],
        };
        assert!(sink.send_batch(&[packet]).await.is_ok());
    }
}
