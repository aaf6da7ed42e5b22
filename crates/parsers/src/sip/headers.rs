// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SIP header folding, compact-form normalization, and a case-insensitive
//! header map (spec §4.3 edge cases).

use std::collections::HashMap;

/// Long-form header names for the compact forms SIP allows (spec §4.3:
/// "`i` = Call-ID, `f` = From, `t` = To, `v` = Via").
fn expand_compact(name: &str) -> &str {
    match name {
        "i" => "call-id",
        "f" => "from",
        "t" => "to",
        "v" => "via",
        "m" => "contact",
        "s" => "subject",
        "l" => "content-length",
        "c" => "content-type",
        "k" => "supported",
        other => other,
    }
}

/// A parsed SIP message's headers, keyed by lowercase long-form name.
/// Multi-valued headers (e.g. repeated Via) keep insertion order.
#[derive(Debug, Clone, Default)]
pub struct HeaderMap {
    values: HashMap<String, Vec<String>>,
}

impl HeaderMap {
    /// Unfold continuation lines (spec: "Header folding — continuation
    /// lines starting with whitespace assembled before lookup") and parse
    /// `Name: value` pairs, normalizing compact forms and header-name case.
    pub fn parse(header_block: &str) -> Self {
        let mut unfolded: Vec<String> = Vec::new();
        for line in header_block.lines() {
            if (line.starts_with(' ') || line.starts_with('\t')) && !unfolded.is_empty() {
                if let Some(last) = unfolded.last_mut() {
                    last.push(' ');
                    last.push_str(line.trim_start());
                }
            } else if !line.is_empty() {
                unfolded.push(line.to_string());
            }
        }

        let mut values: HashMap<String, Vec<String>> = HashMap::new();
        for line in unfolded {
            let Some((name, value)) = line.split_once(':') else { continue };
            let key = expand_compact(name.trim().to_ascii_lowercase().as_str()).to_string();
            values.entry(key).or_default().push(value.trim().to_string());
        }
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(&name.to_ascii_lowercase()).and_then(|v| v.first()).map(String::as_str)
    }

    pub fn get_all(&self, name: &str) -> &[String] {
        self.values.get(&name.to_ascii_lowercase()).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Strip a display name and `<>` angle brackets, then a trailing
/// `;param=...` list, from a SIP URI-bearing header value (spec §4.3: "URI
/// extraction").
pub fn extract_uri(header_value: &str) -> &str {
    let value = header_value.trim();
    let value = if let Some(start) = value.find('<') {
        let end = value[start..].find('>').map(|e| start + e).unwrap_or(value.len());
        &value[start + 1..end]
    } else {
        value
    };
    value.split(';').next().unwrap_or(value).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unfolds_continuation_lines() {
        let block = "Subject: hello\n world\r\nTo: sip:bob@example.com";
        let headers = HeaderMap::parse(block);
        assert_eq!(headers.get("subject"), Some("hello world"));
    }

    #[test]
    fn recognizes_compact_forms_case_insensitively() {
        let block = "I: abc123\r\nF: <sip:alice@example.com>;tag=xyz";
        let headers = HeaderMap::parse(block);
        assert_eq!(headers.get("call-id"), Some("abc123"));
        assert!(headers.get("from").is_some());
    }

    #[test]
    fn extract_uri_strips_display_name_brackets_and_params() {
        assert_eq!(extract_uri("\"Alice\" <sip:alice@example.com>;tag=abc"), "sip:alice@example.com");
        assert_eq!(extract_uri("sip:bob@example.com;transport=tcp"), "sip:bob@example.com");
    }
}
