// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Parser and Processor plugin contracts (spec §4.3, §4.4).

use crate::error::ParseError;
use crate::registry::FlowRegistry;
use otus_core::{DecodedPacket, OutputPacket, PayloadType};
use std::collections::BTreeMap;
use std::sync::Arc;

/// What a parser produced for a packet it claimed (spec §3 `OutputPacket`
/// fields populated by the parser stage).
pub struct ParseOutcome {
    pub payload_type: PayloadType,
    pub labels: BTreeMap<String, String>,
    pub structured: Option<serde_json::Value>,
}

/// A protocol parser plugin (spec §4.3).
///
/// Parsers are tried in declared order; the first whose `can_handle`
/// returns `true` owns the packet. `can_handle` must be cheap — prefix or
/// port checks only, never allocating — since it runs on every packet that
/// reaches the parse stage regardless of protocol.
pub trait Parser: Send {
    fn name(&self) -> &'static str;

    fn can_handle(&self, packet: &DecodedPacket) -> bool;

    fn handle(&mut self, packet: &DecodedPacket) -> Result<ParseOutcome, ParseError>;
}

/// Implemented by parsers that need the per-Task Flow Registry (spec §4.3:
/// "Parsers may implement a FlowRegistryAware capability"). The Pipeline
/// calls `bind_registry` once at Task start, before any packet reaches the
/// parser.
pub trait FlowRegistryAware {
    fn bind_registry(&mut self, registry: Arc<FlowRegistry>);
}

/// A label/drop processor plugin (spec §4.4).
///
/// Processors are chained; the first to return `false` (drop) short-circuits
/// the chain. Mutating `packet.labels` is allowed and is how enrichment
/// processors (e.g. geo-ip tagging) would work, though none ship today.
pub trait Processor: Send {
    fn name(&self) -> &'static str;

    fn process(&mut self, packet: &mut OutputPacket) -> bool;
}

/// Runs a packet through an ordered parser list, falling back to `raw`
/// payload-type when none claim it (spec §4.3).
pub fn parse_with_fallback(
    parsers: &mut [Box<dyn Parser>],
    packet: &DecodedPacket,
) -> ParseOutcome {
    for parser in parsers.iter_mut() {
        if parser.can_handle(packet) {
            match parser.handle(packet) {
                Ok(outcome) => return outcome,
                Err(err) => {
                    tracing::debug!(parser = parser.name(), error = %err, "parser failed, downgrading to raw");
                    metrics::counter!("otus_parse_failed_total", "parser" => parser.name()).increment(1);
                    return ParseOutcome { payload_type: PayloadType::Raw, labels: BTreeMap::new(), structured: None };
                }
            }
        }
    }
    ParseOutcome { payload_type: PayloadType::Raw, labels: BTreeMap::new(), structured: None }
}

/// Runs a packet through an ordered processor chain (spec §4.4).
/// Returns `false` as soon as any processor drops it.
pub fn process_chain(processors: &mut [Box<dyn Processor>], packet: &mut OutputPacket) -> bool {
    for processor in processors.iter_mut() {
        if !processor.process(packet) {
            metrics::counter!("otus_dropped_by_processor_total", "processor" => processor.name()).increment(1);
            return false;
        }
    }
    true
}
