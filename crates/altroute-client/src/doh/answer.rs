//! JSON DoH answer model shared by every provider.

use altroute_core::{ResolvedRecord, TXT_RECORD_TYPE};
use serde::Deserialize;
use url::Url;

/// Top-level JSON body returned by a DoH provider
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DohResponse {
    /// Answer section; absent when the name has no records
    #[serde(rename = "Answer", default)]
    pub answer: Vec<DohAnswer>,
}

/// One answer record
#[derive(Debug, Clone, Deserialize)]
pub struct DohAnswer {
    /// Numeric record type
    #[serde(rename = "type")]
    pub record_type: u16,

    /// Record payload, quoted for TXT records
    pub data: String,

    /// Advertised time-to-live in seconds
    #[serde(rename = "TTL", default)]
    pub ttl: u32,
}

impl DohResponse {
    /// TXT answers only
    pub fn txt_answers(&self) -> impl Iterator<Item = &DohAnswer> {
        self.answer
            .iter()
            .filter(|a| a.record_type == TXT_RECORD_TYPE)
    }

    /// Valid proxy hostnames carried by TXT answers, each with its own TTL
    #[must_use]
    pub fn txt_candidates(&self) -> Vec<ResolvedRecord> {
        self.txt_answers()
            .filter_map(|answer| {
                let host = proxy_host(&answer.data)?;
                Some(ResolvedRecord::new(host, answer.ttl))
            })
            .collect()
    }
}

/// Extract the hostname carried by a TXT payload, if it names one
#[must_use]
pub fn proxy_host(data: &str) -> Option<String> {
    let unquoted = data.trim().trim_matches('"');
    if unquoted.is_empty() {
        return None;
    }

    let url = Url::parse(&format!("https://{unquoted}")).ok()?;
    let host = url.host_str()?;

    // Anything beyond a bare hostname (path, port, credentials) is rejected.
    if host != unquoted.to_ascii_lowercase() {
        return None;
    }

    Some(host.to_string())
}
