// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Kafka reference [`Sink`] (spec §4.5, §6 "Kafka data envelope").

use crate::error::ReporterError;
use crate::traits::Sink;
use async_trait::async_trait;
use base64::Engine;
use otus_core::{OutputPacket, PayloadType};
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rdkafka::ClientConfig;
use std::time::Duration;

/// Mutually-exclusive topic routing (spec §4.5): either every packet lands
/// on one fixed topic, or the topic is computed as `{prefix}-{payload_type}`.
#[derive(Debug, Clone)]
pub enum TopicRouting {
    Fixed(String),
    PrefixByPayloadType(String),
}

impl TopicRouting {
    fn topic_for(&self, payload_type: PayloadType) -> String {
        match self {
            TopicRouting::Fixed(topic) => topic.clone(),
            TopicRouting::PrefixByPayloadType(prefix) => format!("{prefix}-{payload_type}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct KafkaSinkConfig {
    pub brokers: String,
    pub routing: TopicRouting,
    pub send_timeout: Duration,
}

/// Writes [`OutputPacket`]s to Kafka per spec §6's data envelope: headers
/// carry task/agent/payload identity and each label as `l.{key}`, the key is
/// the partition key, and the body is the JSON mirror of `OutputPacket` with
/// a base64-encoded raw payload.
pub struct KafkaSink {
    producer: FutureProducer,
    routing: TopicRouting,
    send_timeout: Duration,
}

impl KafkaSink {
    pub fn new(config: KafkaSinkConfig) -> Result<Self, ReporterError> {
        let producer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .create()
            .map_err(|err| ReporterError::InitFailed(err.to_string()))?;
        Ok(Self { producer, routing: config.routing, send_timeout: config.send_timeout })
    }

    fn headers_for(packet: &OutputPacket) -> OwnedHeaders {
        let mut headers = OwnedHeaders::new()
            .insert(Header { key: "task_id", value: Some(packet.task_id.as_str()) })
            .insert(Header { key: "agent_id", value: Some(packet.agent_id.as_str()) })
            .insert(Header { key: "payload_type", value: Some(&packet.payload_type.to_string()) })
            .insert(Header { key: "src_ip", value: Some(&packet.five_tuple.src_ip.to_string()) })
            .insert(Header { key: "dst_ip", value: Some(&packet.five_tuple.dst_ip.to_string()) })
            .insert(Header { key: "src_port", value: Some(&packet.five_tuple.src_port.to_string()) })
            .insert(Header { key: "dst_port", value: Some(&packet.five_tuple.dst_port.to_string()) })
            .insert(Header { key: "timestamp", value: Some(&epoch_millis(packet).to_string()) });
        for (key, value) in &packet.labels {
            headers = headers.insert(Header { key: &format!("l.{key}"), value: Some(value) });
        }
        headers
    }

    fn body_for(packet: &OutputPacket) -> serde_json::Value {
        serde_json::json!({
            "task_id": packet.task_id,
            "agent_id": packet.agent_id,
            "pipeline_id": packet.pipeline_id,
            "timestamp": epoch_millis(packet),
            "src_ip": packet.five_tuple.src_ip,
            "dst_ip": packet.five_tuple.dst_ip,
            "src_port": packet.five_tuple.src_port,
            "dst_port": packet.five_tuple.dst_port,
            "protocol": packet.five_tuple.protocol,
            "payload_type": packet.payload_type,
            "labels": packet.labels,
            "raw_payload_len": packet.raw_payload.len(),
            "raw_payload": base64::engine::general_purpose::STANDARD.encode(&packet.raw_payload),
            "payload": packet.payload,
        })
    }
}

fn epoch_millis(packet: &OutputPacket) -> i64 {
    packet
        .timestamp
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[async_trait]
impl Sink for KafkaSink {
    fn name(&self) -> &'static str {
        "kafka"
    }

    async fn send_batch(&self, batch: &[OutputPacket]) -> Result<(), ReporterError> {
        for packet in batch {
            let topic = self.routing.topic_for(packet.payload_type);
            let key = packet.five_tuple.partition_key();
            let body = Self::body_for(packet);
            let payload = serde_json::to_vec(&body).map_err(|err| ReporterError::SendFailed(err.to_string()))?;
            let record = FutureRecord::to(&topic).payload(&payload).key(&key).headers(Self::headers_for(packet));
            self.producer
                .send(record, Timeout::After(self.send_timeout))
                .await
                .map_err(|(err, _)| ReporterError::SendFailed(err.to_string()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_routing_ignores_payload_type() {
        let routing = TopicRouting::Fixed("otus-events".into());
        assert_eq!(routing.topic_for(PayloadType::Sip), "otus-events");
        assert_eq!(routing.topic_for(PayloadType::Raw), "otus-events");
    }

    #[test]
    fn prefix_routing_computes_per_payload_type_topic() {
        let routing = TopicRouting::PrefixByPayloadType("otus".into());
        assert_eq!(routing.topic_for(PayloadType::Sip), "otus-sip");
        assert_eq!(routing.topic_for(PayloadType::Rtp), "otus-rtp");
    }
}
