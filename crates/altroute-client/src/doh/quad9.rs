use altroute_core::{ResolvedRecord, TXT_RECORD_TYPE};
use async_trait::async_trait;
use reqwest::Client as HttpClient;

use super::{fetch_answers, DohProvider, DohQuery};

/// Quad9 DoH JSON endpoint
pub const QUAD9_ENDPOINT: &str = "https://dns11.quad9.net:5053/dns-query";

/// Quad9 DoH provider. Each TXT answer keeps its own TTL.
#[derive(Debug, Clone)]
pub struct Quad9Provider {
    http: HttpClient,
    endpoint: String,
}

impl Quad9Provider {
    /// Provider using the public endpoint
    #[must_use]
    pub fn new(http: HttpClient) -> Self {
        Self::with_endpoint(http, QUAD9_ENDPOINT)
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
impl DohProvider for Quad9Provider {
    fn name(&self) -> &'static str {
        "quad9"
    }

    async fn lookup(&self, query: &DohQuery) -> Option<Vec<ResolvedRecord>> {
        let record_type = TXT_RECORD_TYPE.to_string();
        let params = [
            ("name", query.name.as_str()),
            ("type", record_type.as_str()),
        ];
        let response = fetch_answers(
            &self.http,
            self.name(),
            &self.endpoint,
            &params,
            query.timeout,
        )
        .await?;

        let candidates = response.txt_candidates();
        if candidates.is_empty() {
            return None;
        }
        Some(candidates)
    }
}
