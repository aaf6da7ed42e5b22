// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Minimal SDP parsing: the `c=` connection line, `m=` media streams, and
//! the `a=` attributes the SIP parser needs for RTP/RTCP flow derivation
//! (spec §4.3).

use crate::error::ParseError;
use std::collections::HashMap;
use std::net::IpAddr;

#[derive(Debug, Clone, Default)]
pub struct MediaDescription {
    pub media_type: String,
    pub port: u16,
    pub proto: String,
    pub formats: Vec<u8>,
    /// Media-level `c=` line; falls back to the session-level one when
    /// absent (spec §4.3: "Session-level c= line is used when a media
    /// stream has no media-level c=").
    pub connection_ip: Option<IpAddr>,
    pub rtpmap: HashMap<u8, String>,
    pub rtcp_mux: bool,
    /// Explicit `a=rtcp:<port>` override; `None` means port+1.
    pub rtcp_port: Option<u16>,
}

impl MediaDescription {
    pub fn resolved_rtcp_port(&self) -> u16 {
        self.rtcp_port.unwrap_or(self.port + 1)
    }

    /// The first codec name from `a=rtpmap`, in payload-type order, for the
    /// FlowContext's `codec` field.
    pub fn primary_codec(&self) -> Option<&str> {
        self.formats.iter().find_map(|pt| self.rtpmap.get(pt)).map(String::as_str)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionDescription {
    pub connection_ip: Option<IpAddr>,
    pub media: Vec<MediaDescription>,
}

pub fn parse(body: &str) -> Result<SessionDescription, ParseError> {
    let mut session = SessionDescription::default();
    let mut current: Option<MediaDescription> = None;

    for raw_line in body.lines() {
        let line = raw_line.trim();
        let Some((kind, value)) = line.split_once('=') else { continue };

        match kind {
            "c" => {
                let ip = parse_connection_ip(value)?;
                match &mut current {
                    Some(m) => m.connection_ip = Some(ip),
                    None => session.connection_ip = Some(ip),
                }
            }
            "m" => {
                if let Some(prev) = current.take() {
                    session.media.push(prev);
                }
                current = Some(parse_media_line(value)?);
            }
            "a" => {
                if let Some(m) = &mut current {
                    apply_attribute(m, value);
                }
            }
            _ => {}
        }
    }
    if let Some(last) = current.take() {
        session.media.push(last);
    }
    Ok(session)
}

fn parse_connection_ip(value: &str) -> Result<IpAddr, ParseError> {
    // "IN IP4 203.0.113.5" or "IN IP6 2001:db8::1"
    let addr = value.split_whitespace().nth(2).ok_or_else(|| ParseError::MalformedSdp(format!("c= line: {value}")))?;
    addr.parse().map_err(|_| ParseError::MalformedSdp(format!("invalid connection address: {addr}")))
}

fn parse_media_line(value: &str) -> Result<MediaDescription, ParseError> {
    // "audio 49170 RTP/AVP 0 8"
    let mut parts = value.split_whitespace();
    let media_type = parts.next().ok_or_else(|| ParseError::MalformedSdp(format!("m= line: {value}")))?.to_string();
    let port: u16 = parts
        .next()
        .ok_or_else(|| ParseError::MalformedSdp(format!("m= line missing port: {value}")))?
        .parse()
        .map_err(|_| ParseError::MalformedSdp(format!("m= line invalid port: {value}")))?;
    let proto = parts.next().unwrap_or("RTP/AVP").to_string();
    let formats = parts.filter_map(|f| f.parse().ok()).collect();
    Ok(MediaDescription { media_type, port, proto, formats, connection_ip: None, rtpmap: HashMap::new(), rtcp_mux: false, rtcp_port: None })
}

fn apply_attribute(media: &mut MediaDescription, value: &str) {
    if value == "rtcp-mux" {
        media.rtcp_mux = true;
        return;
    }
    if let Some(rest) = value.strip_prefix("rtcp:") {
        if let Ok(port) = rest.split_whitespace().next().unwrap_or(rest).parse() {
            media.rtcp_port = Some(port);
        }
        return;
    }
    if let Some(rest) = value.strip_prefix("rtpmap:") {
        // "0 PCMU/8000"
        if let Some((pt, codec)) = rest.split_once(' ') {
            if let Ok(pt) = pt.parse() {
                media.rtpmap.insert(pt, codec.to_string());
            }
        }
    }
}
