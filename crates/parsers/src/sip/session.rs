// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Call-ID-keyed SIP session cache and its `none → Offered → Confirmed →
//! evicted` state machine (spec §4.3).

use crate::sip::sdp::SessionDescription;
use otus_core::{Clock, SystemClock};
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Offered,
    Confirmed,
}

pub struct SipSession {
    pub state: SessionState,
    pub offer: SessionDescription,
    pub answer: Option<SessionDescription>,
    last_touched_at: Instant,
}

/// Default session TTL and cleanup interval (spec §4.3: "held in a TTL
/// cache, default 24 h, periodic cleanup 1 h").
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(24 * 3600);
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

pub struct SessionCache<C: Clock = SystemClock> {
    sessions: HashMap<String, SipSession>,
    ttl: Duration,
    clock: C,
}

impl SessionCache<SystemClock> {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, SystemClock)
    }
}

impl<C: Clock> SessionCache<C> {
    pub fn with_clock(ttl: Duration, clock: C) -> Self {
        Self { sessions: HashMap::new(), ttl, clock }
    }

    /// INVITE with an offer SDP: `(none) → Offered` or re-offer within an
    /// existing dialog, which restarts the TTL.
    pub fn on_invite(&mut self, call_id: &str, offer: SessionDescription) {
        self.sessions.insert(
            call_id.to_string(),
            SipSession { state: SessionState::Offered, offer, answer: None, last_touched_at: self.clock.now() },
        );
    }

    /// 200 OK for INVITE: `Offered → Confirmed`. Spec §4.3: "Missing SDP on
    /// 200 OK is not fatal — no flows are registered, session evicted later
    /// by TTL" — this returns `None` in that case rather than transitioning,
    /// since there is no offer/answer pair to act on.
    pub fn on_200_for_invite(
        &mut self,
        call_id: &str,
        answer: Option<SessionDescription>,
    ) -> Option<(&SessionDescription, &SessionDescription)> {
        let answer = answer?;
        let session = self.sessions.get_mut(call_id)?;
        session.answer = Some(answer);
        session.state = SessionState::Confirmed;
        session.last_touched_at = self.clock.now();
        let SipSession { offer, answer, .. } = session;
        answer.as_ref().map(|answer| (&*offer, answer))
    }

    /// BYE/CANCEL: evicts the session regardless of state. Returns whether
    /// a session existed (the caller still issues Flow Registry deletes
    /// keyed by `call_id` either way, since a dialog can be torn down after
    /// its offer/answer round-trip already registered flows).
    pub fn on_terminate(&mut self, call_id: &str) -> bool {
        self.sessions.remove(call_id).is_some()
    }

    pub fn get(&self, call_id: &str) -> Option<&SipSession> {
        self.sessions.get(call_id)
    }

    /// TTL sweep (spec: "periodic cleanup 1 h"). Returns the call-ids
    /// evicted so the caller can also purge their Flow Registry entries.
    pub fn reap_expired(&mut self) -> Vec<String> {
        let now = self.clock.now();
        let ttl = self.ttl;
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|(_, s)| now.duration_since(s.last_touched_at) >= ttl)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            self.sessions.remove(id);
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use otus_core::FakeClock;

    fn sdp() -> SessionDescription {
        SessionDescription::default()
    }

    #[test]
    fn invite_then_200_transitions_to_confirmed() {
        let mut cache = SessionCache::with_clock(DEFAULT_SESSION_TTL, FakeClock::new());
        cache.on_invite("call-1", sdp());
        assert_eq!(cache.get("call-1").unwrap().state, SessionState::Offered);

        let pair = cache.on_200_for_invite("call-1", Some(sdp()));
        assert!(pair.is_some());
        assert_eq!(cache.get("call-1").unwrap().state, SessionState::Confirmed);
    }

    #[test]
    fn missing_sdp_on_200_does_not_transition() {
        let mut cache = SessionCache::with_clock(DEFAULT_SESSION_TTL, FakeClock::new());
        cache.on_invite("call-1", sdp());
        let pair = cache.on_200_for_invite("call-1", None);
        assert!(pair.is_none());
        assert_eq!(cache.get("call-1").unwrap().state, SessionState::Offered);
    }

    #[test]
    fn bye_evicts_session() {
        let mut cache = SessionCache::with_clock(DEFAULT_SESSION_TTL, FakeClock::new());
        cache.on_invite("call-1", sdp());
        assert!(cache.on_terminate("call-1"));
        assert!(cache.get("call-1").is_none());
    }

    #[test]
    fn ttl_sweep_evicts_stale_sessions_only() {
        let clock = FakeClock::new();
        let mut cache = SessionCache::with_clock(Duration::from_secs(10), clock.clone());
        cache.on_invite("stale", sdp());
        clock.advance(Duration::from_secs(11));
        cache.on_invite("fresh", sdp());

        let evicted = cache.reap_expired();
        assert_eq!(evicted, vec!["stale".to_string()]);
        assert!(cache.get("fresh").is_some());
    }
}
