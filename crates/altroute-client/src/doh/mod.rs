//! DNS-over-HTTPS provider clients.
//!
//! Each provider turns a lookup token into zero or more proxy hostnames.
//! Failures of any kind (transport, timeout, status, JSON) collapse into
//! "no result"; they are logged but never surface as errors.

mod answer;
mod google;
mod quad9;

use altroute_core::ResolvedRecord;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use reqwest::Client as HttpClient;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub use answer::{proxy_host, DohAnswer, DohResponse};
pub use google::GoogleProvider;
pub use quad9::Quad9Provider;

/// A TXT lookup to run against a provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DohQuery {
    /// Fully built DNS name
    pub name: String,

    /// Timeout for the provider request
    pub timeout: Duration,
}

impl DohQuery {
    /// Build the query name `"{session_id}.{token}"`, or just `token`
    #[must_use]
    pub fn new(token: &str, session_id: Option<&str>, timeout: Duration) -> Self {
        let name = match session_id {
            Some(session) if !session.is_empty() => format!("{session}.{token}"),
            _ => token.to_string(),
        };
        Self { name, timeout }
    }
}

/// A DoH provider able to answer TXT lookups
#[async_trait]
pub trait DohProvider: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Run the lookup; `None` when the provider contributed nothing
    async fn lookup(&self, query: &DohQuery) -> Option<Vec<ResolvedRecord>>;
}

/// Both built-in providers sharing one HTTP client
#[must_use]
pub fn default_providers(http: &HttpClient) -> Vec<Arc<dyn DohProvider>> {
    vec![
        Arc::new(GoogleProvider::new(http.clone())),
        Arc::new(Quad9Provider::new(http.clone())),
    ]
}

/// GET a provider endpoint and decode its JSON answer.
///
/// Caching is bypassed; any failure is logged and yields `None`.
pub(crate) async fn fetch_answers(
    http: &HttpClient,
    provider: &'static str,
    endpoint: &str,
    params: &[(&str, &str)],
    timeout: Duration,
) -> Option<DohResponse> {
    debug!(provider, endpoint, "DoH query");

    let response = match http
        .get(endpoint)
        .query(params)
        .header(ACCEPT, "application/dns-json")
        .header(CACHE_CONTROL, "no-cache")
        .timeout(timeout)
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            debug!(provider, error = %e, timeout = e.is_timeout(), "DoH request failed");
            return None;
        }
    };

    let status = response.status();
    if !status.is_success() {
        debug!(provider, status = status.as_u16(), "DoH provider returned error status");
        return None;
    }

    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => {
            debug!(provider, error = %e, "DoH body read failed");
            return None;
        }
    };

    match serde_json::from_str(&body) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            debug!(provider, error = %e, "DoH answer is not valid JSON");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_name_prefixes_session() {
        let timeout = Duration::from_secs(1);
        assert_eq!(DohQuery::new("dTOKEN", Some("abc"), timeout).name, "abc.dTOKEN");
        assert_eq!(DohQuery::new("dTOKEN", None, timeout).name, "dTOKEN");
        assert_eq!(DohQuery::new("dTOKEN", Some(""), timeout).name, "dTOKEN");
    }
}
