// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! IPv4 fragment reassembly (spec §4.2).
//!
//! Keyed by `(src, dst, protocol, IP-id)`. A group completes when a
//! contiguous byte range `[0, last]` is present and the last fragment has
//! MF=0, or is dropped after `ttl` with no activity. Concurrent groups are
//! bounded; over the limit the oldest group is evicted and counted via
//! metrics.

use otus_core::{Clock, DecodedPacket, EthernetHeader, IpHeader, Protocol, SystemClock};
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::time::{Duration, Instant, SystemTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct FragKey {
    src: IpAddr,
    dst: IpAddr,
    protocol: Protocol,
    ip_id: u16,
}

struct FragGroup {
    fragments: BTreeMap<u32, Vec<u8>>,
    total_len: Option<u32>,
    first_seen_at: Instant,
    first_captured_at: SystemTime,
    original_len: u32,
    captured_len: u32,
    ethernet: Option<EthernetHeader>,
    ip: IpHeader,
}

impl FragGroup {
    fn is_complete(&self) -> bool {
        let Some(total_len) = self.total_len else { return false };
        let mut expected_start = 0u32;
        for (&offset, bytes) in &self.fragments {
            if offset != expected_start {
                return false;
            }
            expected_start += bytes.len() as u32;
        }
        expected_start == total_len
    }

    fn assemble(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for bytes in self.fragments.values() {
            out.extend_from_slice(bytes);
        }
        out
    }
}

/// Bounds and policy for the reassembler; mirrors [`otus_core::DecoderSpec`]
/// (spec §4.2 defaults: 30s TTL, 10000 concurrent keys).
#[derive(Debug, Clone, Copy)]
pub struct ReassemblerConfig {
    pub ttl: Duration,
    pub max_keys: usize,
}

impl Default for ReassemblerConfig {
    fn default() -> Self {
        Self { ttl: Duration::from_secs(30), max_keys: 10_000 }
    }
}

/// Fragment reassembler, generic over [`Clock`] so the TTL sweep is
/// deterministic in tests (see `otus_core::clock`).
pub struct Reassembler<C: Clock = SystemClock> {
    config: ReassemblerConfig,
    groups: BTreeMap<FragKeyOrdered, FragGroup>,
    clock: C,
    pub evicted_overflow: u64,
    pub expired: u64,
}

/// `FragKey` plus insertion order, so eviction picks the oldest group
/// without a second index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct FragKeyOrdered {
    seq: u64,
    src: IpAddr,
    dst: IpAddr,
    protocol_num: u8,
    ip_id: u16,
}

impl Reassembler<SystemClock> {
    pub fn new(config: ReassemblerConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> Reassembler<C> {
    pub fn with_clock(config: ReassemblerConfig, clock: C) -> Self {
        Self { config, groups: BTreeMap::new(), clock, evicted_overflow: 0, expired: 0 }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn insert(
        &mut self,
        src: IpAddr,
        dst: IpAddr,
        protocol: Protocol,
        ip_id: u16,
        fragment_offset_bytes: u32,
        more_fragments: bool,
        data: Vec<u8>,
        captured_at: SystemTime,
        original_len: u32,
        captured_len: u32,
        ethernet: Option<EthernetHeader>,
    ) -> Option<DecodedPacket> {
        let key = FragKey { src, dst, protocol, ip_id };
        let existing_seq =
            self.groups.keys().find(|k| k.src == src && k.dst == dst && k.protocol_num == protocol.number() && k.ip_id == ip_id).map(|k| k.seq);

        let seq = existing_seq.unwrap_or_else(|| self.groups.len() as u64);
        let ordered_key =
            FragKeyOrdered { seq, src: key.src, dst: key.dst, protocol_num: protocol.number(), ip_id };

        if existing_seq.is_none() {
            self.enforce_capacity();
        }

        let now = self.clock.now();
        let group = self.groups.entry(ordered_key).or_insert_with(|| FragGroup {
            fragments: BTreeMap::new(),
            total_len: None,
            first_seen_at: now,
            first_captured_at: captured_at,
            original_len,
            captured_len,
            ethernet,
            ip: IpHeader { src, dst, protocol, ttl: 0 },
        });

        let end = fragment_offset_bytes + data.len() as u32;
        group.fragments.insert(fragment_offset_bytes, data);
        if !more_fragments {
            group.total_len = Some(end);
        }
        let is_complete = group.is_complete();

        if is_complete {
            if let Some(group) = self.groups.remove(&ordered_key) {
                return Some(DecodedPacket {
                    timestamp: group.first_captured_at,
                    ethernet: group.ethernet,
                    ip: Some(group.ip),
                    transport: None,
                    payload: group.assemble(),
                    original_len: group.original_len,
                    captured_len: group.captured_len,
                });
            }
        }
        None
    }

    /// Evict the oldest group when at capacity (spec §4.2 overflow policy).
    fn enforce_capacity(&mut self) {
        if self.groups.len() < self.config.max_keys {
            return;
        }
        if let Some(oldest_key) = self.groups.keys().next().copied() {
            self.groups.remove(&oldest_key);
            self.evicted_overflow += 1;
            metrics::counter!("otus_reassembly_evicted_overflow_total").increment(1);
        }
    }

    /// Drop any group whose TTL has elapsed (spec §4.2: periodic cleanup).
    pub fn reap_expired(&mut self) {
        let now = self.clock.now();
        let ttl = self.config.ttl;
        let expired_keys: Vec<FragKeyOrdered> = self
            .groups
            .iter()
            .filter(|(_, g)| now.duration_since(g.first_seen_at) >= ttl)
            .map(|(k, _)| *k)
            .collect();
        for key in expired_keys {
            self.groups.remove(&key);
            self.expired += 1;
            metrics::counter!("otus_reassembly_expired_total").increment(1);
        }
    }

    pub fn active_groups(&self) -> usize {
        self.groups.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use otus_core::FakeClock;
    use std::net::Ipv4Addr;

    fn ip(n: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, n))
    }

    #[test]
    fn reassembles_two_fragments_in_order() {
        let mut r = Reassembler::with_clock(ReassemblerConfig::default(), FakeClock::new());
        let now = SystemTime::now();
        let first = r.insert(ip(1), ip(2), Protocol::Udp, 42, 0, true, vec![1, 2, 3, 4], now, 100, 100, None);
        assert!(first.is_none());
        let second = r.insert(ip(1), ip(2), Protocol::Udp, 42, 4, false, vec![5, 6], now, 100, 100, None);
        let packet = second.expect("second fragment completes the datagram");
        assert_eq!(packet.payload, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn reassembles_out_of_order_fragments() {
        let mut r = Reassembler::with_clock(ReassemblerConfig::default(), FakeClock::new());
        let now = SystemTime::now();
        assert!(r.insert(ip(1), ip(2), Protocol::Udp, 7, 4, false, vec![5, 6], now, 100, 100, None).is_none());
        let packet = r
            .insert(ip(1), ip(2), Protocol::Udp, 7, 0, true, vec![1, 2, 3, 4], now, 100, 100, None)
            .expect("first fragment completes once both are present");
        assert_eq!(packet.payload, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn expires_incomplete_group_after_ttl() {
        let clock = FakeClock::new();
        let config = ReassemblerConfig { ttl: Duration::from_secs(30), max_keys: 10_000 };
        let mut r = Reassembler::with_clock(config, clock.clone());
        let now = SystemTime::now();
        r.insert(ip(1), ip(2), Protocol::Udp, 9, 0, true, vec![1, 2], now, 100, 100, None);
        assert_eq!(r.active_groups(), 1);
        clock.advance(Duration::from_secs(31));
        r.reap_expired();
        assert_eq!(r.active_groups(), 0);
        assert_eq!(r.expired, 1);
    }

    #[test]
    fn evicts_oldest_group_past_capacity() {
        let config = ReassemblerConfig { ttl: Duration::from_secs(30), max_keys: 1 };
        let mut r = Reassembler::with_clock(config, FakeClock::new());
        let now = SystemTime::now();
        r.insert(ip(1), ip(2), Protocol::Udp, 1, 0, true, vec![1], now, 10, 10, None);
        r.insert(ip(3), ip(4), Protocol::Udp, 2, 0, true, vec![2], now, 10, 10, None);
        assert_eq!(r.active_groups(), 1);
        assert_eq!(r.evicted_overflow, 1);
    }
}
