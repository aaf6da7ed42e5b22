// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Kafka command/response envelopes (spec §6). Distinct from the Kafka
//! *data* envelope, which carries `OutputPacket`s and lives in
//! `otus-reporters::kafka` next to the producer that writes it.

use crate::rpc::RpcError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// `target` value meaning "every agent" (spec §4.9).
pub const TARGET_ALL: &str = "*";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KafkaCommandEnvelope {
    pub version: String,
    pub target: String,
    pub command: String,
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
    #[serde(default)]
    pub payload: JsonValue,
}

impl KafkaCommandEnvelope {
    /// Spec §4.9: processed iff `target` is `"*"`, empty, or this agent's
    /// hostname.
    pub fn targets(&self, hostname: &str) -> bool {
        self.target == TARGET_ALL || self.target.is_empty() || self.target == hostname
    }

    /// Spec §4.9/§8 property 5: commands older than `ttl` are skipped
    /// without invoking the handler.
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        now.signed_duration_since(self.timestamp) > ttl
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KafkaResponseEnvelope {
    pub version: String,
    pub source: String,
    pub command: String,
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl KafkaResponseEnvelope {
    pub fn ok(source: impl Into<String>, command: impl Into<String>, request_id: impl Into<String>, timestamp: DateTime<Utc>, result: JsonValue) -> Self {
        Self { version: "v1".to_string(), source: source.into(), command: command.into(), request_id: request_id.into(), timestamp, result: Some(result), error: None }
    }

    pub fn err(source: impl Into<String>, command: impl Into<String>, request_id: impl Into<String>, timestamp: DateTime<Utc>, error: RpcError) -> Self {
        Self { version: "v1".to_string(), source: source.into(), command: command.into(), request_id: request_id.into(), timestamp, result: None, error: Some(error) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn envelope(target: &str, timestamp: DateTime<Utc>) -> KafkaCommandEnvelope {
        KafkaCommandEnvelope { version: "v1".into(), target: target.into(), command: "task_status".into(), timestamp, request_id: "r1".into(), payload: JsonValue::Null }
    }

    #[test]
    fn targets_wildcard_empty_and_exact_hostname() {
        let now = Utc::now();
        assert!(envelope("*", now).targets("edge-1"));
        assert!(envelope("", now).targets("edge-1"));
        assert!(envelope("edge-1", now).targets("edge-1"));
        assert!(!envelope("edge-2", now).targets("edge-1"));
    }

    #[test]
    fn expired_past_ttl_is_flagged() {
        let sent = Utc::now() - ChronoDuration::seconds(400);
        let command = envelope("*", sent);
        assert!(command.is_expired(Utc::now(), ChronoDuration::seconds(300)));
        assert!(!command.is_expired(Utc::now(), ChronoDuration::seconds(500)));
    }
}
