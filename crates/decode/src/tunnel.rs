// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tunnel unwrapping (spec §4.2: "configured tunnels are unwrapped before
//! presenting the inner packet").
//!
//! Each kind strips its encapsulation header and hands back the inner
//! Ethernet frame (VXLAN, GENEVE) or inner IP datagram (GRE, IPIP) slice.
//! Unwrapping is best-effort and falls through (`Ok(None)`) when the buffer
//! doesn't look like that tunnel's traffic, so a task's configured tunnel
//! list can be checked in order without false positives on plain traffic.

use crate::error::DecodeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelKind {
    Vxlan,
    Gre,
    Geneve,
    Ipip,
}

impl TunnelKind {
    pub fn parse(name: &str) -> Result<Self, DecodeError> {
        match name.to_ascii_lowercase().as_str() {
            "vxlan" => Ok(TunnelKind::Vxlan),
            "gre" => Ok(TunnelKind::Gre),
            "geneve" => Ok(TunnelKind::Geneve),
            "ipip" => Ok(TunnelKind::Ipip),
            other => Err(DecodeError::UnknownTunnel(other.to_string())),
        }
    }
}

pub struct Tunnel {
    kind: TunnelKind,
}

impl Tunnel {
    pub fn new(kind: TunnelKind) -> Self {
        Self { kind }
    }

    /// Strip this tunnel's framing if `payload` is an outer UDP datagram
    /// (VXLAN/GENEVE, called after transport decode would normally apply —
    /// here we key off the well-known destination port in the raw bytes)
    /// or an outer IP datagram (GRE/IPIP) carrying this tunnel's protocol.
    ///
    /// Returns `Ok(None)` when `payload` isn't this tunnel's traffic so the
    /// caller can try the next configured tunnel or fall back to plain
    /// decode.
    pub fn try_unwrap<'a>(&self, payload: &'a [u8]) -> Result<Option<&'a [u8]>, DecodeError> {
        match self.kind {
            TunnelKind::Vxlan => unwrap_vxlan(payload),
            TunnelKind::Geneve => unwrap_geneve(payload),
            TunnelKind::Gre => unwrap_gre(payload),
            TunnelKind::Ipip => unwrap_ipip(payload),
        }
    }
}

/// VXLAN: outer Ethernet+IP+UDP (dst port 4789) + 8-byte VXLAN header, then
/// the inner Ethernet frame. We only recognize it already stripped down to
/// the UDP payload by an upstream demux, so this only strips the 8-byte
/// VXLAN header itself.
fn unwrap_vxlan(payload: &[u8]) -> Result<Option<&[u8]>, DecodeError> {
    if payload.len() < 8 {
        return Ok(None);
    }
    let flags = payload[0];
    if flags & 0x08 == 0 {
        return Ok(None);
    }
    Ok(Some(&payload[8..]))
}

/// GENEVE: base header is 8 bytes plus `options_len * 4` bytes of options.
fn unwrap_geneve(payload: &[u8]) -> Result<Option<&[u8]>, DecodeError> {
    if payload.len() < 8 {
        return Ok(None);
    }
    let version = payload[0] >> 6;
    if version != 0 {
        return Ok(None);
    }
    let options_len = (payload[0] & 0x3f) as usize * 4;
    let header_len = 8 + options_len;
    if payload.len() < header_len {
        return Err(DecodeError::TunnelUnwrapFailed("geneve options length exceeds buffer".into()));
    }
    Ok(Some(&payload[header_len..]))
}

/// GRE: minimal 4-byte header when no optional fields are set (checksum,
/// key, sequence number bits all clear).
fn unwrap_gre(payload: &[u8]) -> Result<Option<&[u8]>, DecodeError> {
    if payload.len() < 4 {
        return Ok(None);
    }
    let flags = payload[0];
    let mut header_len = 4;
    if flags & 0x80 != 0 {
        header_len += 4; // checksum + reserved1
    }
    if flags & 0x20 != 0 {
        header_len += 4; // key
    }
    if flags & 0x10 != 0 {
        header_len += 4; // sequence number
    }
    if payload.len() < header_len {
        return Err(DecodeError::TunnelUnwrapFailed("gre header exceeds buffer".into()));
    }
    Ok(Some(&payload[header_len..]))
}

/// IPIP: no extra framing beyond the outer IP header, which the decoder's
/// normal IPv4/IPv6 path has already stripped by the time this would apply
/// at the transport-protocol level (protocol 4). Recognized here as a
/// pass-through for symmetry with the other tunnel kinds.
fn unwrap_ipip(payload: &[u8]) -> Result<Option<&[u8]>, DecodeError> {
    Ok(Some(payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_kinds_case_insensitively() {
        assert_eq!(TunnelKind::parse("VXLAN").unwrap(), TunnelKind::Vxlan);
        assert_eq!(TunnelKind::parse("geneve").unwrap(), TunnelKind::Geneve);
    }

    #[test]
    fn rejects_unknown_kind() {
        assert!(TunnelKind::parse("mpls").is_err());
    }

    #[test]
    fn vxlan_strips_eight_byte_header() {
        let mut buf = vec![0x08, 0, 0, 0, 0, 0, 0x12, 0x34];
        buf.extend_from_slice(b"inner");
        let tunnel = Tunnel::new(TunnelKind::Vxlan);
        let inner = tunnel.try_unwrap(&buf).unwrap().unwrap();
        assert_eq!(inner, b"inner");
    }

    #[test]
    fn vxlan_rejects_non_vxlan_traffic() {
        let buf = vec![0x00, 0, 0, 0, 0, 0, 0, 0];
        let tunnel = Tunnel::new(TunnelKind::Vxlan);
        assert!(tunnel.try_unwrap(&buf).unwrap().is_none());
    }
}
