// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Legacy `SimpleCommand` format (spec §4.9): an array of role/cmd/port
//! range/protocol items accepted on the same Kafka command topic as the
//! standard envelope, for agents that predate the JSON-RPC-shaped
//! command surface.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SimpleCommandAction {
    Start,
    Stop,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    /// A BPF port-range clause, e.g. `portrange 5060-5090`.
    pub fn to_bpf_clause(self) -> String {
        if self.start == self.end {
            format!("port {}", self.start)
        } else {
            format!("portrange {}-{}", self.start, self.end)
        }
    }
}

/// One item of the legacy array-of-commands payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimpleCommand {
    pub role: String,
    pub cmd: SimpleCommandAction,
    #[serde(default)]
    pub port_range: Option<PortRange>,
    #[serde(default)]
    pub protocol: Option<String>,
}

impl SimpleCommand {
    /// Whether this item applies to `role`; the legacy format matches
    /// role exactly, no wildcard.
    pub fn applies_to(&self, role: &str) -> bool {
        self.role == role
    }

    /// The BPF filter override this item contributes, layered on top of
    /// the role's own defaults by the caller (spec §4.9: "BPF filter
    /// synthesized from the role's defaults overridden by message
    /// fields").
    pub fn bpf_override(&self) -> Option<String> {
        match (&self.port_range, &self.protocol) {
            (Some(range), Some(proto)) => Some(format!("{proto} and {}", range.to_bpf_clause())),
            (Some(range), None) => Some(range.to_bpf_clause()),
            (None, Some(proto)) => Some(proto.clone()),
            (None, None) => None,
        }
    }
}

pub type SimpleCommandBatch = Vec<SimpleCommand>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_range_single_port_omits_range_syntax() {
        let range = PortRange { start: 5060, end: 5060 };
        assert_eq!(range.to_bpf_clause(), "port 5060");
    }

    #[test]
    fn port_range_spans_multiple_ports() {
        let range = PortRange { start: 5060, end: 5090 };
        assert_eq!(range.to_bpf_clause(), "portrange 5060-5090");
    }

    #[test]
    fn bpf_override_combines_protocol_and_range() {
        let command = SimpleCommand { role: "sbc".into(), cmd: SimpleCommandAction::Start, port_range: Some(PortRange { start: 5060, end: 5060 }), protocol: Some("udp".into()) };
        assert_eq!(command.bpf_override().as_deref(), Some("udp and port 5060"));
    }

    #[test]
    fn applies_to_matches_role_exactly() {
        let command = SimpleCommand { role: "sbc".into(), cmd: SimpleCommandAction::Stop, port_range: None, protocol: None };
        assert!(command.applies_to("sbc"));
        assert!(!command.applies_to("media-relay"));
    }

    #[test]
    fn batch_deserializes_from_json_array() {
        let raw = r#"[{"role":"sbc","cmd":"start","port_range":{"start":5060,"end":5060}}]"#;
        let batch: SimpleCommandBatch = serde_json::from_str(raw).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].cmd, SimpleCommandAction::Start);
    }
}
