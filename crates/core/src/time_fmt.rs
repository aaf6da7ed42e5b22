// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Timestamp formatting helpers for the wire formats in spec §6.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Render an elapsed duration as `{minutes}m{seconds}s` style text, used in
/// human-facing status output (daemon_status, task_status).
pub fn format_elapsed(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}

/// Serde module (de)serializing `SystemTime` as milliseconds since the Unix
/// epoch — the Kafka data envelope's `timestamp (ms epoch int64)` field
/// (spec §6).
pub mod epoch_millis {
    use super::*;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(t: &SystemTime, s: S) -> Result<S::Ok, S::Error> {
        let ms = t.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as i64;
        ms.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<SystemTime, D::Error> {
        let ms = i64::deserialize(d)?;
        Ok(UNIX_EPOCH + Duration::from_millis(ms.max(0) as u64))
    }
}

/// RFC3339 formatting for the Kafka command/response envelopes (spec §6),
/// which use `timestamp:<RFC3339>` rather than epoch millis.
pub fn to_rfc3339(t: SystemTime) -> String {
    chrono::DateTime::<chrono::Utc>::from(t).to_rfc3339()
}

pub fn from_rfc3339(s: &str) -> Result<SystemTime, chrono::ParseError> {
    Ok(chrono::DateTime::parse_from_rfc3339(s)?.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_elapsed_picks_largest_unit() {
        assert_eq!(format_elapsed(Duration::from_secs(5)), "5s");
        assert_eq!(format_elapsed(Duration::from_secs(65)), "1m5s");
        assert_eq!(format_elapsed(Duration::from_secs(3665)), "1h1m5s");
    }

    #[test]
    fn rfc3339_roundtrips() {
        let t = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let s = to_rfc3339(t);
        let back = from_rfc3339(&s).unwrap();
        assert_eq!(back.duration_since(UNIX_EPOCH).unwrap().as_secs(), 1_700_000_000);
    }
}
