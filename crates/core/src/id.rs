// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identifier types.
//!
//! Unlike most of this codebase's identifiers, a [`TaskId`] is not
//! generated — it comes from the caller's `TaskConfig.id` (spec: "id
//! (unique, non-empty string)") and must be preserved byte-for-byte across
//! persistence and restart. `RequestId` is similarly caller-supplied
//! (JSON-RPC correlation) but falls back to a generated token when a
//! transport needs one internally (e.g. synthesizing a Kafka response
//! correlation id for a command that omitted one).

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Unique identifier for a Task, taken verbatim from `TaskConfig.id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for TaskId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// The hostname this agent instance runs on. Resolved once at daemon
/// startup and threaded through `OutputPacket`, command routing, and
/// Kafka envelopes (spec §3 `OutputPacket.agent_id`, §6 `target`/`source`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self(hostname.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Correlation token for request/response matching (spec §3, "Request-id").
///
/// Caller-supplied over JSON-RPC; generated with a random nanoid when a
/// transport needs to synthesize one (e.g. a SimpleCommand translated
/// internally into a standard command, spec §4.9).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(nanoid::nanoid!(16))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_id_roundtrips_through_serde() {
        let id = TaskId::new("edge-sip-1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"edge-sip-1\"");
        let back: TaskId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn request_id_generate_is_nonempty_and_varies() {
        let a = RequestId::generate();
        let b = RequestId::generate();
        assert!(!a.as_str().is_empty());
        assert_ne!(a, b);
    }
}
