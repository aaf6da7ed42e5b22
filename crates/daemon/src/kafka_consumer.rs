// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Kafka command channel consumer (spec §4.9, §6, §8 property 5): a
//! `StreamConsumer` loop that accepts both the standard JSON-RPC envelope
//! and the legacy `SimpleCommand` array, filters by target hostname and
//! TTL, dispatches through the same [`CommandHandler`] the UDS transport
//! uses, and writes responses back to the configured response topic.

use crate::command_handler::CommandHandler;
use crate::config::CommandChannelKafkaConfig;
use chrono::Utc;
use otus_wire::{KafkaCommandEnvelope, KafkaResponseEnvelope, RpcRequest, RpcResponse, SimpleCommandAction, SimpleCommandBatch};
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rdkafka::ClientConfig;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const RESPONSE_SEND_TIMEOUT: Timeout = Timeout::After(Duration::from_millis(5_000));

#[derive(Debug, Error)]
pub enum KafkaConsumerError {
    #[error("failed to build kafka consumer: {0}")]
    Consumer(#[source] rdkafka::error::KafkaError),
    #[error("failed to build kafka producer: {0}")]
    Producer(#[source] rdkafka::error::KafkaError),
    #[error("failed to subscribe to topic {topic:?}: {source}")]
    Subscribe { topic: String, source: rdkafka::error::KafkaError },
}

pub struct KafkaCommandConsumer {
    consumer: StreamConsumer,
    producer: FutureProducer,
    config: CommandChannelKafkaConfig,
    response_topic: Option<String>,
    hostname: String,
}

impl KafkaCommandConsumer {
    pub fn new(config: CommandChannelKafkaConfig, effective_brokers: &[String], hostname: String) -> Result<Self, KafkaConsumerError> {
        let brokers = effective_brokers.join(",");
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("group.id", format!("otus-agent-{hostname}"))
            .set("enable.auto.commit", "false")
            .create()
            .map_err(KafkaConsumerError::Consumer)?;
        consumer.subscribe(&[config.topic.as_str()]).map_err(|source| KafkaConsumerError::Subscribe { topic: config.topic.clone(), source })?;
        let producer: FutureProducer = ClientConfig::new().set("bootstrap.servers", &brokers).create().map_err(KafkaConsumerError::Producer)?;
        let response_topic = config.response_topic.clone();
        Ok(Self { consumer, producer, config, response_topic, hostname })
    }

    /// Runs until `cancel` fires. Every message is committed after
    /// handling regardless of outcome (spec §7: "the command channel
    /// commits offsets unconditionally — a malformed or misdirected
    /// command is not redelivered").
    pub async fn run(self, handler: Arc<CommandHandler>, cancel: CancellationToken) {
        let ttl = chrono::Duration::seconds(self.config.command_ttl_secs as i64);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = self.consumer.recv() => {
                    match received {
                        Ok(message) => {
                            if let Some(payload) = message.payload() {
                                self.dispatch(payload, &handler, ttl).await;
                            }
                            if let Err(err) = self.consumer.commit_message(&message, CommitMode::Async) {
                                warn!(error = %err, "failed to commit kafka command offset");
                            }
                        }
                        Err(err) => warn!(error = %err, "kafka command consumer recv error"),
                    }
                }
            }
        }
        info!("kafka command consumer stopped");
    }

    async fn dispatch(&self, payload: &[u8], handler: &Arc<CommandHandler>, ttl: chrono::Duration) {
        if let Ok(batch) = serde_json::from_slice::<SimpleCommandBatch>(payload) {
            self.dispatch_simple_batch(batch, handler).await;
            return;
        }
        let envelope: KafkaCommandEnvelope = match serde_json::from_slice(payload) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(error = %err, "discarding malformed kafka command payload");
                return;
            }
        };
        if !envelope.targets(&self.hostname) {
            return;
        }
        if envelope.is_expired(Utc::now(), ttl) {
            warn!(request_id = %envelope.request_id, command = %envelope.command, "discarding expired kafka command");
            return;
        }
        let request = RpcRequest::new(envelope.command.clone(), envelope.payload.clone(), envelope.request_id.clone());
        let (response, _post_action) = handler.handle(&request).await;
        self.send_response(&envelope, response).await;
    }

    /// Translates each legacy item into the equivalent standard command
    /// (spec §4.9): `start` becomes `task_start{role}` with the item's BPF
    /// override layered onto the role's default capture filter, `stop`
    /// becomes `task_stop{role}`. The legacy format carries no
    /// target/request-id, so every item is treated as addressed to this
    /// agent and a response is synthesized rather than published.
    async fn dispatch_simple_batch(&self, batch: SimpleCommandBatch, handler: &Arc<CommandHandler>) {
        for item in batch {
            let method = match item.cmd {
                SimpleCommandAction::Start => "task_start",
                SimpleCommandAction::Stop => "task_stop",
            };
            let mut params = serde_json::json!({ "role": item.role });
            if let Some(bpf_override) = item.bpf_override() {
                params["bpf_override"] = serde_json::Value::String(bpf_override);
            }
            let request = RpcRequest::new(method, params, format!("simple-{}", item.role));
            let (response, _post_action) = handler.handle(&request).await;
            if let Some(error) = &response.error {
                warn!(role = %request.id, error = %error.message, "legacy simple command failed");
            }
        }
    }

    async fn send_response(&self, envelope: &KafkaCommandEnvelope, response: RpcResponse) {
        let Some(topic) = &self.response_topic else { return };
        let reply = match response.error {
            Some(error) => KafkaResponseEnvelope::err(&self.hostname, &envelope.command, &envelope.request_id, Utc::now(), error),
            None => KafkaResponseEnvelope::ok(&self.hostname, &envelope.command, &envelope.request_id, Utc::now(), response.result.unwrap_or(serde_json::Value::Null)),
        };
        let payload = match serde_json::to_vec(&reply) {
            Ok(payload) => payload,
            Err(err) => {
                error!(error = %err, "failed to encode kafka command response");
                return;
            }
        };
        let record = FutureRecord::to(topic).payload(&payload).key(&self.hostname);
        if let Err((err, _)) = self.producer.send(record, RESPONSE_SEND_TIMEOUT).await {
            error!(error = %err, topic, "failed to publish kafka command response");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use otus_wire::{PortRange, SimpleCommand};

    #[test]
    fn simple_start_command_carries_its_bpf_override_into_rpc_params() {
        let command = SimpleCommand {
            role: "sbc".into(),
            cmd: SimpleCommandAction::Start,
            port_range: Some(PortRange { start: 5060, end: 5060 }),
            protocol: Some("udp".into()),
        };
        let mut params = serde_json::json!({ "role": command.role });
        if let Some(bpf_override) = command.bpf_override() {
            params["bpf_override"] = serde_json::Value::String(bpf_override);
        }
        assert_eq!(params["bpf_override"], "udp and port 5060");
    }
}
