use altroute_core::ResolvedRecord;
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use tracing::debug;

use super::{fetch_answers, DohProvider, DohQuery, DohResponse};

/// Google public DoH JSON endpoint
pub const GOOGLE_ENDPOINT: &str = "https://dns.google/resolve";

/// Google DoH provider.
///
/// Strict: a batch is only accepted when every TXT answer carries the same
/// non-zero TTL.
#[derive(Debug, Clone)]
pub struct GoogleProvider {
    http: HttpClient,
    endpoint: String,
}

impl GoogleProvider {
    /// Provider using the public endpoint
    #[must_use]
    pub fn new(http: HttpClient) -> Self {
        Self::with_endpoint(http, GOOGLE_ENDPOINT)
    }

    /// Provider using a custom endpoint (useful for testing)
    #[must_use]
    pub fn with_endpoint(http: HttpClient, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl DohProvider for GoogleProvider {
    fn name(&self) -> &'static str {
        "google"
    }

    async fn lookup(&self, query: &DohQuery) -> Option<Vec<ResolvedRecord>> {
        let params = [("type", "TXT"), ("name", query.name.as_str())];
        let response = fetch_answers(
            &self.http,
            self.name(),
            &self.endpoint,
            &params,
            query.timeout,
        )
        .await?;

        strict_candidates(&response)
    }
}

fn strict_candidates(response: &DohResponse) -> Option<Vec<ResolvedRecord>> {
    let mut ttls = response.txt_answers().map(|a| a.ttl);
    let ttl = ttls.next()?;
    if ttl == 0 || ttls.any(|other| other != ttl) {
        debug!(provider = "google", "rejecting batch with inconsistent TTLs");
        return None;
    }

    let candidates = response.txt_candidates();
    if candidates.is_empty() {
        return None;
    }
    Some(candidates)
}
