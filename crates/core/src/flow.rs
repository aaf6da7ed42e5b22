// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Flow Registry key/value types (spec §3 `FlowKey`/`FlowContext`).
//!
//! The registry itself (`FlowRegistry`, the readers-writer-locked map) lives
//! in `otus-parsers` next to the SIP parser that is its only writer today;
//! the key and context types live here so any crate can reference them
//! without depending on the parser crate.

use crate::packet::FiveTuple;
use std::collections::HashMap;

/// A flow identity: the five-tuple. A flow and its reverse are distinct
/// keys (spec §3 invariant) because `FiveTuple` itself is directional.
pub type FlowKey = FiveTuple;

/// Free-form per-parser context attached to a registered flow (spec §3:
/// "opaque map (e.g. call_id, codec)"). The SIP parser stores `call_id` and
/// `codec`; RTP correlation reads `call_id` back out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowContext {
    fields: HashMap<String, String>,
}

impl FlowContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn call_id(&self) -> Option<&str> {
        self.get("call_id")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flow_context_stores_and_reads_call_id() {
        let ctx = FlowContext::new().with("call_id", "abc-123").with("codec", "PCMU/8000");
        assert_eq!(ctx.call_id(), Some("abc-123"));
        assert_eq!(ctx.get("codec"), Some("PCMU/8000"));
        assert_eq!(ctx.get("missing"), None);
    }
}
