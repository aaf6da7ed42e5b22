// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stateless Ethernet → IP → transport decode (spec §4.2), tunnel
//! unwrapping, and IPv4 fragment reassembly.

use crate::error::DecodeError;
use crate::reassembler::Reassembler;
use crate::tunnel::{Tunnel, TunnelKind};
use etherparse::{NetSlice, SlicedPacket, TransportSlice};
use otus_core::{DecodedPacket, EthernetHeader, IpHeader, Protocol, RawPacket, TransportHeader};
use std::net::IpAddr;

/// Decodes [`RawPacket`]s into [`DecodedPacket`]s, unwrapping configured
/// tunnels and reassembling IPv4 fragments when enabled (spec §4.2).
pub struct Decoder {
    tunnels: Vec<Tunnel>,
    reassembler: Option<Reassembler>,
}

impl Decoder {
    pub fn new(tunnel_names: &[String], reassembler: Option<Reassembler>) -> Result<Self, DecodeError> {
        let tunnels =
            tunnel_names.iter().map(|name| TunnelKind::parse(name).map(Tunnel::new)).collect::<Result<_, _>>()?;
        Ok(Self { tunnels, reassembler })
    }

    /// Decode a single raw capture. Fragmented IPv4 datagrams are buffered
    /// in the reassembler and return `Ok(None)` until complete (spec §4.2:
    /// "re-injected as a single synthetic DecodedPacket").
    pub fn decode(&mut self, raw: &RawPacket) -> Result<Option<DecodedPacket>, DecodeError> {
        let mut payload: &[u8] = &raw.data;

        for tunnel in &self.tunnels {
            if let Some(inner) = tunnel.try_unwrap(payload)? {
                payload = inner;
            }
        }

        let sliced = SlicedPacket::from_ethernet(payload)
            .map_err(|e| DecodeError::Etherparse(e.to_string()))?;

        let ethernet = sliced.link.as_ref().and_then(ethernet_header);

        let Some(net) = sliced.net.as_ref() else {
            return Ok(Some(DecodedPacket {
                timestamp: raw.captured_at,
                ethernet,
                ip: None,
                transport: None,
                payload: packet_payload(&sliced),
                original_len: raw.original_len,
                captured_len: raw.captured_len,
            }));
        };

        match net {
            NetSlice::Ipv4(v4) => {
                let header = v4.header();
                let src: IpAddr = header.source_addr().into();
                let dst: IpAddr = header.destination_addr().into();
                let protocol = Protocol::from_number(header.protocol().0);
                let ip = IpHeader { src, dst, protocol, ttl: header.ttl() };

                if let Some(reassembler) = &mut self.reassembler {
                    if header.is_fragmenting_payload() {
                        return Ok(reassembler.insert(
                            src,
                            dst,
                            protocol,
                            header.identification(),
                            header.fragments_offset().value() as u32 * 8,
                            header.more_fragments(),
                            sliced.ip_payload().map(|p| p.payload.to_vec()).unwrap_or_default(),
                            raw.captured_at,
                            raw.original_len,
                            raw.captured_len,
                            ethernet,
                        ));
                    }
                }

                let transport = sliced.transport.as_ref().and_then(transport_header);
                Ok(Some(DecodedPacket {
                    timestamp: raw.captured_at,
                    ethernet,
                    ip: Some(ip),
                    transport,
                    payload: packet_payload(&sliced),
                    original_len: raw.original_len,
                    captured_len: raw.captured_len,
                }))
            }
            NetSlice::Ipv6(v6) => {
                let header = v6.header();
                let src: IpAddr = header.source_addr().into();
                let dst: IpAddr = header.destination_addr().into();
                let protocol = Protocol::from_number(header.next_header().0);
                let ip = IpHeader { src, dst, protocol, ttl: header.hop_limit() };
                let transport = sliced.transport.as_ref().and_then(transport_header);
                Ok(Some(DecodedPacket {
                    timestamp: raw.captured_at,
                    ethernet,
                    ip: Some(ip),
                    transport,
                    payload: packet_payload(&sliced),
                    original_len: raw.original_len,
                    captured_len: raw.captured_len,
                }))
            }
        }
    }

    /// Drain any fragment groups whose TTL has elapsed (spec §4.2: "a
    /// cleanup routine runs on a ticker"). Called by the daemon's cleanup
    /// task, never on the packet fast path.
    pub fn reap_expired_fragments(&mut self) {
        if let Some(reassembler) = &mut self.reassembler {
            reassembler.reap_expired();
        }
    }
}

fn ethernet_header(link: &etherparse::LinkSlice) -> Option<EthernetHeader> {
    match link {
        etherparse::LinkSlice::Ethernet2(eth) => Some(EthernetHeader {
            src_mac: eth.source(),
            dst_mac: eth.destination(),
            ether_type: eth.ether_type().0,
        }),
        _ => None,
    }
}

fn packet_payload(sliced: &SlicedPacket) -> Vec<u8> {
    if let Some(transport) = sliced.transport.as_ref() {
        transport_payload(transport).to_vec()
    } else if let Some(ip_payload) = sliced.ip_payload() {
        ip_payload.payload.to_vec()
    } else if let Some(ether_payload) = sliced.ether_payload() {
        ether_payload.payload.to_vec()
    } else {
        Vec::new()
    }
}

fn transport_payload<'a>(transport: &TransportSlice<'a>) -> &'a [u8] {
    match transport {
        TransportSlice::Tcp(tcp) => tcp.payload(),
        TransportSlice::Udp(udp) => udp.payload(),
        TransportSlice::Icmpv4(icmp) => icmp.payload(),
        TransportSlice::Icmpv6(icmp) => icmp.payload(),
    }
}

fn transport_header(transport: &TransportSlice) -> Option<TransportHeader> {
    match transport {
        TransportSlice::Tcp(tcp) => {
            Some(TransportHeader { src_port: tcp.source_port(), dst_port: tcp.destination_port() })
        }
        TransportSlice::Udp(udp) => {
            Some(TransportHeader { src_port: udp.source_port(), dst_port: udp.destination_port() })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reassembler::ReassemblerConfig;

    fn ipv4_checksum(header: &[u8]) -> u16 {
        let mut sum: u32 = 0;
        for chunk in header.chunks(2) {
            let word = if chunk.len() == 2 { u16::from_be_bytes([chunk[0], chunk[1]]) } else { u16::from_be_bytes([chunk[0], 0]) };
            sum += word as u32;
        }
        while sum >> 16 != 0 {
            sum = (sum & 0xffff) + (sum >> 16);
        }
        !(sum as u16)
    }

    fn ipv4_header(total_length: u16, identification: u16, flags_and_frag_offset: u16, protocol: u8) -> [u8; 20] {
        let mut h = [0u8; 20];
        h[0] = 0x45;
        h[2..4].copy_from_slice(&total_length.to_be_bytes());
        h[4..6].copy_from_slice(&identification.to_be_bytes());
        h[6..8].copy_from_slice(&flags_and_frag_offset.to_be_bytes());
        h[8] = 64;
        h[9] = protocol;
        h[12..16].copy_from_slice(&[10, 0, 0, 1]);
        h[16..20].copy_from_slice(&[10, 0, 0, 2]);
        let checksum = ipv4_checksum(&h);
        h[10..12].copy_from_slice(&checksum.to_be_bytes());
        h
    }

    fn ethernet_header_bytes() -> [u8; 14] {
        let mut h = [0u8; 14];
        h[0..6].copy_from_slice(&[6, 5, 4, 3, 2, 1]);
        h[6..12].copy_from_slice(&[1, 2, 3, 4, 5, 6]);
        h[12..14].copy_from_slice(&0x0800u16.to_be_bytes());
        h
    }

    fn udp_packet() -> Vec<u8> {
        let builder = etherparse::PacketBuilder::ethernet2([1, 2, 3, 4, 5, 6], [6, 5, 4, 3, 2, 1])
            .ipv4([10, 0, 0, 1], [10, 0, 0, 2], 64)
            .udp(5060, 5060);
        let payload = b"hello".to_vec();
        let mut out = Vec::with_capacity(builder.size(payload.len()));
        builder.write(&mut out, &payload).unwrap();
        out
    }

    #[test]
    fn decodes_udp_five_tuple() {
        let mut decoder = Decoder::new(&[], None).unwrap();
        let raw = RawPacket::new(std::time::SystemTime::now(), udp_packet(), 0);
        let decoded = decoder.decode(&raw).unwrap().unwrap();
        let tuple = decoded.five_tuple().unwrap();
        assert_eq!(tuple.src_port, 5060);
        assert_eq!(tuple.dst_port, 5060);
        assert_eq!(decoded.payload, b"hello");
    }

    #[test]
    fn too_short_buffer_is_decode_failed() {
        let mut decoder = Decoder::new(&[], None).unwrap();
        let raw = RawPacket::new(std::time::SystemTime::now(), vec![0u8; 4], 4);
        assert!(decoder.decode(&raw).is_err());
    }

    #[test]
    fn decoder_reassembles_fragmented_ipv4_datagram_into_one_packet() {
        let payload = b"HelloFragmentedWorld!".to_vec();
        let (first_payload, second_payload) = payload.split_at(8);
        let identification = 0xbeef;

        // first fragment: MF=1, offset=0 -> flags/offset field 0x2000
        let first_header = ipv4_header(20 + first_payload.len() as u16, identification, 0x2000, 17);
        let mut first_frame = ethernet_header_bytes().to_vec();
        first_frame.extend_from_slice(&first_header);
        first_frame.extend_from_slice(first_payload);

        // last fragment: MF=0, offset in 8-octet units
        let frag_offset_units = (first_payload.len() / 8) as u16;
        let second_header = ipv4_header(20 + second_payload.len() as u16, identification, frag_offset_units, 17);
        let mut second_frame = ethernet_header_bytes().to_vec();
        second_frame.extend_from_slice(&second_header);
        second_frame.extend_from_slice(second_payload);

        let reassembler = Reassembler::new(ReassemblerConfig::default());
        let mut decoder = Decoder::new(&[], Some(reassembler)).unwrap();

        let raw1 = RawPacket::new(std::time::SystemTime::now(), first_frame.clone(), first_frame.len() as u32);
        assert!(decoder.decode(&raw1).unwrap().is_none());

        let raw2 = RawPacket::new(std::time::SystemTime::now(), second_frame.clone(), second_frame.len() as u32);
        let decoded = decoder.decode(&raw2).unwrap().expect("second fragment completes the datagram");
        assert_eq!(decoded.payload, payload);
    }
}
