// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SIP parser: request/status-line and header parsing, SDP offer/answer
//! tracking per Call-ID, and RTP/RTCP flow derivation into the Flow
//! Registry on session confirmation (spec §4.3).

mod headers;
pub mod sdp;
mod session;

use crate::error::ParseError;
use crate::registry::FlowRegistry;
use crate::traits::{FlowRegistryAware, ParseOutcome, Parser};
use headers::{extract_uri, HeaderMap};
use otus_core::{DecodedPacket, FiveTuple, FlowContext, PayloadType, Protocol};
use sdp::SessionDescription;
use serde::Serialize;
use session::{SessionCache, DEFAULT_SESSION_TTL};
use std::collections::BTreeMap;
use std::sync::Arc;

const REQUEST_METHODS: &[&str] =
    &["INVITE", "ACK", "BYE", "CANCEL", "REGISTER", "OPTIONS", "INFO", "PRACK", "UPDATE", "SUBSCRIBE", "NOTIFY", "MESSAGE", "REFER"];

#[derive(Debug, Serialize)]
pub struct SipMessage {
    pub start_line: String,
    pub method: Option<String>,
    pub status_code: Option<u16>,
    pub call_id: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub cseq: Option<String>,
    pub has_sdp: bool,
}

pub struct SipParser {
    sessions: SessionCache,
    registry: Option<Arc<FlowRegistry>>,
}

impl SipParser {
    pub fn new() -> Self {
        Self { sessions: SessionCache::new(DEFAULT_SESSION_TTL), registry: None }
    }

    /// Periodic maintenance: evict stale sessions and their flows (spec
    /// §4.3 cleanup cadence). Called by the Task's cleanup ticker, never
    /// on the packet fast path.
    pub fn reap_expired_sessions(&mut self) {
        let expired = self.sessions.reap_expired();
        if let Some(registry) = &self.registry {
            for call_id in expired {
                registry.remove_by_call_id(&call_id);
            }
        }
    }

    fn register_media_flows(&self, call_id: &str, offer: &SessionDescription, answer: &SessionDescription) {
        let Some(registry) = &self.registry else { return };

        for (offer_media, answer_media) in offer.media.iter().zip(answer.media.iter()) {
            let Some(offer_ip) = offer_media.connection_ip.or(offer.connection_ip) else { continue };
            let Some(answer_ip) = answer_media.connection_ip.or(answer.connection_ip) else { continue };

            let codec = answer_media.primary_codec().or_else(|| offer_media.primary_codec()).unwrap_or("unknown");
            let context = FlowContext::new().with("call_id", call_id).with("codec", codec);

            let rtp_forward = FiveTuple::new(offer_ip, offer_media.port, answer_ip, answer_media.port, Protocol::Udp);
            registry.insert(rtp_forward, context.clone());
            registry.insert(rtp_forward.reversed(), context.clone());

            if !(offer_media.rtcp_mux && answer_media.rtcp_mux) {
                let rtcp_forward = FiveTuple::new(
                    offer_ip,
                    offer_media.resolved_rtcp_port(),
                    answer_ip,
                    answer_media.resolved_rtcp_port(),
                    Protocol::Udp,
                );
                registry.insert(rtcp_forward, context.clone());
                registry.insert(rtcp_forward.reversed(), context);
            }
        }
    }
}

impl Default for SipParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowRegistryAware for SipParser {
    fn bind_registry(&mut self, registry: Arc<FlowRegistry>) {
        self.registry = Some(registry);
    }
}

fn as_text(payload: &[u8]) -> Option<&str> {
    std::str::from_utf8(payload).ok()
}

fn split_start_line(text: &str) -> Option<(&str, &str)> {
    let end = text.find("\r\n").or_else(|| text.find('\n'))?;
    Some((&text[..end], &text[end..]))
}

fn split_headers_and_body(rest: &str) -> (&str, &str) {
    if let Some(idx) = rest.find("\r\n\r\n") {
        (&rest[2..idx], &rest[idx + 4..])
    } else if let Some(idx) = rest.find("\n\n") {
        (&rest[1..idx], &rest[idx + 2..])
    } else {
        (rest.trim_start_matches(['\r', '\n']), "")
    }
}

impl Parser for SipParser {
    fn name(&self) -> &'static str {
        "sip"
    }

    fn can_handle(&self, packet: &DecodedPacket) -> bool {
        let Some(transport) = packet.transport else { return false };
        if transport.src_port != 5060 && transport.dst_port != 5060 {
            // Still allow content sniffing for non-standard ports, since
            // SIP is commonly proxied on alternates; cheap prefix check only.
        }
        let payload = &packet.payload;
        if payload.len() < 8 {
            return false;
        }
        if payload.starts_with(b"SIP/2.0") {
            return true;
        }
        REQUEST_METHODS.iter().any(|m| payload.starts_with(m.as_bytes()) && payload.get(m.len()) == Some(&b' '))
    }

    fn handle(&mut self, packet: &DecodedPacket) -> Result<ParseOutcome, ParseError> {
        let text = as_text(&packet.payload).ok_or(ParseError::NotUtf8)?;
        let (start_line, rest) = split_start_line(text).ok_or_else(|| ParseError::MalformedStartLine(text.chars().take(32).collect()))?;
        let (header_block, body) = split_headers_and_body(rest);
        let headers = HeaderMap::parse(header_block);

        let (method, status_code) = parse_start_line(start_line);
        let call_id = headers.get("call-id").map(str::to_string);
        let from = headers.get("from").map(extract_uri).map(str::to_string);
        let to = headers.get("to").map(extract_uri).map(str::to_string);
        let cseq = headers.get("cseq").map(str::to_string);
        let has_sdp = headers.get("content-type").map(|ct| ct.eq_ignore_ascii_case("application/sdp")).unwrap_or(false);

        if let (Some(call_id), true) = (&call_id, has_sdp) {
            let parsed_sdp = sdp::parse(body).ok();
            if let Some(method) = &method {
                if method == "INVITE" {
                    if let Some(offer) = parsed_sdp {
                        self.sessions.on_invite(call_id, offer);
                    }
                }
            } else if let Some(200) = status_code {
                let cseq_method = cseq.as_deref().and_then(|c| c.split_whitespace().nth(1));
                if cseq_method == Some("INVITE") {
                    if let Some((offer, answer)) = self.sessions.on_200_for_invite(call_id, parsed_sdp) {
                        let offer = offer.clone();
                        let answer = answer.clone();
                        self.register_media_flows(call_id, &offer, &answer);
                    }
                }
            }
        } else if let (Some(call_id), Some(method)) = (&call_id, &method) {
            if method == "BYE" || method == "CANCEL" {
                self.sessions.on_terminate(call_id);
                if let Some(registry) = &self.registry {
                    registry.remove_by_call_id(call_id);
                }
            }
        }

        let mut labels = BTreeMap::new();
        if let Some(call_id) = &call_id {
            labels.insert("sip.call-id".to_string(), call_id.clone());
        }
        if let Some(method) = &method {
            labels.insert("sip.method".to_string(), method.clone());
        }
        if let Some(status) = status_code {
            labels.insert("sip.status".to_string(), status.to_string());
        }
        if let Some(from) = &from {
            labels.insert("sip.from".to_string(), from.clone());
        }
        if let Some(to) = &to {
            labels.insert("sip.to".to_string(), to.clone());
        }

        let message = SipMessage {
            start_line: start_line.to_string(),
            method,
            status_code,
            call_id,
            from,
            to,
            cseq,
            has_sdp,
        };

        Ok(ParseOutcome {
            payload_type: PayloadType::Sip,
            labels,
            structured: Some(serde_json::to_value(message).map_err(|e| ParseError::MalformedSdp(e.to_string()))?),
        })
    }
}

fn parse_start_line(start_line: &str) -> (Option<String>, Option<u16>) {
    if let Some(rest) = start_line.strip_prefix("SIP/2.0 ") {
        let code = rest.split_whitespace().next().and_then(|c| c.parse().ok());
        (None, code)
    } else {
        let method = start_line.split_whitespace().next().map(str::to_string);
        (method, None)
    }
}
