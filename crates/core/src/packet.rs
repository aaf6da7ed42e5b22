// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Packet types that flow through a Pipeline (spec §3): `RawPacket` from
//! the Capturer, `DecodedPacket` from the Decoder, `OutputPacket` handed to
//! Reporters.

use crate::id::{AgentId, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::time::SystemTime;

/// Transport-layer protocol, carried in `FlowKey` and the wire `protocol`
/// field (spec §6: "protocol (int)").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    Tcp,
    Udp,
    Sctp,
    Other(u8),
}

impl Protocol {
    /// IANA protocol number, matching the IPv4/IPv6 next-header byte.
    pub fn number(self) -> u8 {
        match self {
            Protocol::Tcp => 6,
            Protocol::Udp => 17,
            Protocol::Sctp => 132,
            Protocol::Other(n) => n,
        }
    }

    pub fn from_number(n: u8) -> Self {
        match n {
            6 => Protocol::Tcp,
            17 => Protocol::Udp,
            132 => Protocol::Sctp,
            other => Protocol::Other(other),
        }
    }
}

/// What kind of structured payload a parser produced (spec §3
/// `OutputPacket.payload-type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadType {
    Sip,
    Rtp,
    Raw,
}

crate::simple_display! {
    PayloadType {
        Sip => "sip",
        Rtp => "rtp",
        Raw => "raw",
    }
}

/// Five-tuple identifying a flow (spec §3 `FlowKey`).
///
/// A flow and its reverse direction are distinct keys — `(A,B,a,b,p)` is
/// not equal to `(B,A,b,a,p)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FiveTuple {
    pub src_ip: IpAddr,
    pub dst_ip: IpAddr,
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: Protocol,
}

impl FiveTuple {
    pub fn new(src_ip: IpAddr, src_port: u16, dst_ip: IpAddr, dst_port: u16, protocol: Protocol) -> Self {
        Self { src_ip, src_port, dst_ip, dst_port, protocol }
    }

    /// The reverse-direction tuple (dst→src), for registering the answer
    /// side of a bidirectional flow (spec §4.3 SIP parser).
    pub fn reversed(&self) -> Self {
        Self {
            src_ip: self.dst_ip,
            dst_ip: self.src_ip,
            src_port: self.dst_port,
            dst_port: self.src_port,
            protocol: self.protocol,
        }
    }

    /// `{src_ip}:{src_port}-{dst_ip}:{dst_port}`, used as the Kafka message
    /// key for partition stability (spec §4.5, §6).
    pub fn partition_key(&self) -> String {
        format!("{}:{}-{}:{}", self.src_ip, self.src_port, self.dst_ip, self.dst_port)
    }
}

/// A packet as handed off by the Capturer, before any decoding (spec §3).
#[derive(Debug, Clone)]
pub struct RawPacket {
    pub captured_at: SystemTime,
    pub data: Vec<u8>,
    pub captured_len: u32,
    pub original_len: u32,
}

impl RawPacket {
    pub fn new(captured_at: SystemTime, data: Vec<u8>, original_len: u32) -> Self {
        let captured_len = data.len() as u32;
        Self { captured_at, data, captured_len, original_len }
    }
}

/// Ethernet header fields retained after decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthernetHeader {
    pub src_mac: [u8; 6],
    pub dst_mac: [u8; 6],
    pub ether_type: u16,
}

/// IP header fields retained after decode (v4 or v6 — src/dst normalize to
/// `IpAddr` either way, per spec §3 `FlowKey` "IP addresses normalized").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpHeader {
    pub src: IpAddr,
    pub dst: IpAddr,
    pub protocol: Protocol,
    pub ttl: u8,
}

/// Transport header fields retained after decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportHeader {
    pub src_port: u16,
    pub dst_port: u16,
}

/// A packet after L2/L3/L4 decode (spec §3 `DecodedPacket`).
///
/// Header fields are only meaningful when decode succeeded past that
/// layer: `ip`/`transport` are `None` when decode stopped short (e.g. an
/// ARP frame has no IP header).
#[derive(Debug, Clone)]
pub struct DecodedPacket {
    pub timestamp: SystemTime,
    pub ethernet: Option<EthernetHeader>,
    pub ip: Option<IpHeader>,
    pub transport: Option<TransportHeader>,
    /// Offset of `payload` within the packet is implicit — this is already
    /// the sliced view, bounded by construction (spec §3 invariant).
    pub payload: Vec<u8>,
    pub original_len: u32,
    pub captured_len: u32,
}

impl DecodedPacket {
    /// The five-tuple for this packet, when decode reached the transport
    /// layer. `None` for non-IP or non-UDP/TCP/SCTP traffic.
    pub fn five_tuple(&self) -> Option<FiveTuple> {
        let ip = self.ip?;
        let transport = self.transport?;
        Some(FiveTuple::new(ip.src, transport.src_port, ip.dst, transport.dst_port, ip.protocol))
    }
}

/// A packet after parsing/processing, ready for a Reporter (spec §3
/// `OutputPacket`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputPacket {
    pub task_id: TaskId,
    pub agent_id: AgentId,
    pub pipeline_id: u32,
    pub five_tuple: WireFiveTuple,
    #[serde(with = "crate::time_fmt::epoch_millis")]
    pub timestamp: SystemTime,
    pub payload_type: PayloadType,
    /// `{protocol}.{field}` lowercase dotted keys (spec §3 invariant).
    pub labels: BTreeMap<String, String>,
    /// Structured payload variant matching `payload_type`; `None` for raw.
    pub payload: Option<serde_json::Value>,
    pub raw_payload: Vec<u8>,
}

/// Serde-friendly mirror of [`FiveTuple`] (JSON can't key a map by IpAddr
/// pairs; this is the flattened shape used on the wire, spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireFiveTuple {
    pub src_ip: IpAddr,
    pub dst_ip: IpAddr,
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: u8,
}

impl From<FiveTuple> for WireFiveTuple {
    fn from(t: FiveTuple) -> Self {
        Self { src_ip: t.src_ip, dst_ip: t.dst_ip, src_port: t.src_port, dst_port: t.dst_port, protocol: t.protocol.number() }
    }
}

impl WireFiveTuple {
    /// `{src_ip}:{src_port}-{dst_ip}:{dst_port}`, used as the Kafka message
    /// key for partition stability (spec §4.5, §6).
    pub fn partition_key(&self) -> String {
        format!("{}:{}-{}:{}", self.src_ip, self.src_port, self.dst_ip, self.dst_port)
    }
}

impl OutputPacket {
    /// `{protocol}.{field}` label insertion, enforcing the lowercase dotted
    /// naming invariant (spec §3).
    pub fn set_label(&mut self, protocol: &str, field: &str, value: impl Into<String>) {
        self.labels.insert(format!("{}.{}", protocol.to_ascii_lowercase(), field.to_ascii_lowercase()), value.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reversed_tuple_is_distinct_from_forward() {
        let a: IpAddr = "10.0.0.1".parse().unwrap();
        let b: IpAddr = "10.0.0.2".parse().unwrap();
        let fwd = FiveTuple::new(a, 5000, b, 5001, Protocol::Udp);
        let rev = fwd.reversed();
        assert_ne!(fwd, rev);
        assert_eq!(rev.reversed(), fwd);
    }

    #[test]
    fn partition_key_matches_spec_format() {
        let a: IpAddr = "192.168.1.100".parse().unwrap();
        let b: IpAddr = "192.168.1.200".parse().unwrap();
        let t = FiveTuple::new(a, 30000, b, 40000, Protocol::Udp);
        assert_eq!(t.partition_key(), "192.168.1.100:30000-192.168.1.200:40000");
    }

    #[test]
    fn set_label_lowercases_and_dots() {
        let mut pkt = OutputPacket {
            task_id: TaskId::new("t1"),
            agent_id: AgentId::new("edge-01"),
            pipeline_id: 0,
            five_tuple: WireFiveTuple {
                src_ip: "10.0.0.1".parse().unwrap(),
                dst_ip: "10.0.0.2".parse().unwrap(),
                src_port: 5060,
                dst_port: 5060,
                protocol: 17,
            },
            timestamp: SystemTime::now(),
            payload_type: PayloadType::Sip,
            labels: BTreeMap::new(),
            payload: None,
            raw_payload: vec![],
        };
        pkt.set_label("SIP", "Call-ID", "abc123");
        assert_eq!(pkt.labels.get("sip.call-id").map(String::as_str), Some("abc123"));
    }
}
