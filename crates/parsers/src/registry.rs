// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-Task Flow Registry (spec §3 `FlowKey`/`FlowContext`, §5: "read-heavy;
//! readers-writer lock. Iteration for cleanup holds the read lock and
//! batches delete keys to a slice, then reacquires the write lock once").

use otus_core::{FlowContext, FlowKey};
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Default)]
pub struct FlowRegistry {
    flows: RwLock<HashMap<FlowKey, FlowContext>>,
}

impl FlowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: FlowKey, context: FlowContext) {
        self.flows.write().insert(key, context);
    }

    pub fn get(&self, key: &FlowKey) -> Option<FlowContext> {
        self.flows.read().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.flows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.read().is_empty()
    }

    /// Remove every flow whose context carries `call_id` (spec §4.3: "On
    /// BYE/CANCEL, all FlowKeys with matching call_id are deleted by
    /// iterating the registry under its read lock and issuing point
    /// deletes").
    pub fn remove_by_call_id(&self, call_id: &str) {
        let matching: Vec<FlowKey> = {
            let flows = self.flows.read();
            flows.iter().filter(|(_, ctx)| ctx.call_id() == Some(call_id)).map(|(k, _)| *k).collect()
        };
        if matching.is_empty() {
            return;
        }
        let mut flows = self.flows.write();
        for key in matching {
            flows.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use otus_core::{FiveTuple, Protocol};
    use std::net::{IpAddr, Ipv4Addr};

    fn tuple(port: u16) -> FlowKey {
        FiveTuple::new(
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            port,
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
            port + 1,
            Protocol::Udp,
        )
    }

    #[test]
    fn remove_by_call_id_only_removes_matching_flows() {
        let registry = FlowRegistry::new();
        registry.insert(tuple(10000), FlowContext::new().with("call_id", "call-a"));
        registry.insert(tuple(20000), FlowContext::new().with("call_id", "call-b"));
        assert_eq!(registry.len(), 2);

        registry.remove_by_call_id("call-a");
        assert_eq!(registry.len(), 1);
        assert!(registry.get(&tuple(20000)).is_some());
        assert!(registry.get(&tuple(10000)).is_none());
    }
}
