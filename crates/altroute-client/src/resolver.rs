//! Failover resolver: picks the URL to use and decides whether a failed
//! request is worth retrying through a proxy domain.

use crate::cache::ProxyCache;
use crate::config::DohConfig;
use crate::doh::{default_providers, DohProvider, DohQuery};
use altroute_core::{
    FailureCode, KnownHost, LogicalEndpoint, ResolvedRecord, RoutingStatus, ServerConfig,
    DOH_HOST_HEADER,
};
use chrono::Utc;
use futures_util::future::join_all;
use rand::seq::SliceRandom;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client as HttpClient;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

/// Alternative routing resolver
#[derive(Clone)]
pub struct FailoverResolver {
    inner: Arc<ResolverInner>,
}

struct ResolverInner {
    config: ServerConfig,
    doh: DohConfig,
    providers: Vec<Arc<dyn DohProvider>>,
    cache: ProxyCache,
    status: AtomicU8,
    session_id: RwLock<Option<String>>,
}

impl FailoverResolver {
    /// Create a resolver querying both built-in DoH providers
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        FailoverResolverBuilder::new(config).build()
    }

    /// Create a builder for custom configuration
    #[must_use]
    pub fn builder(config: ServerConfig) -> FailoverResolverBuilder {
        FailoverResolverBuilder::new(config)
    }

    /// Deployment configuration
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Domain offered at signup
    #[must_use]
    pub fn signup_domain(&self) -> &str {
        &self.inner.config.signup_domain
    }

    /// Current routing status
    #[must_use]
    pub fn status(&self) -> RoutingStatus {
        RoutingStatus::from_u8(self.inner.status.load(Ordering::Relaxed))
    }

    /// Change the routing status; takes effect on the next decision
    pub fn set_status(&self, status: RoutingStatus) {
        info!(status = %status, "routing status changed");
        self.inner.status.store(status.as_u8(), Ordering::Relaxed);
    }

    /// Set the session identifier prefixed to DoH query names
    pub fn set_session_id(&self, session_id: Option<String>) {
        *self
            .inner
            .session_id
            .write()
            .unwrap_or_else(PoisonError::into_inner) = session_id;
    }

    fn session_id(&self) -> Option<String> {
        self.inner
            .session_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn is_active(&self) -> bool {
        self.inner.config.enable_doh && self.status() != RoutingStatus::Off
    }

    /// The URL to use right now for `endpoint`.
    ///
    /// The canonical default unless routing is active and the endpoint's
    /// known host has a usable proxy domain cached.
    pub fn current_url(&self, endpoint: LogicalEndpoint) -> String {
        let default_url = self.inner.config.default_url(endpoint);
        if !self.is_active() {
            return default_url;
        }

        match self.proxy_for(&default_url) {
            Some((known, proxy)) => {
                let url = replace_host(&default_url, known.host(), &proxy);
                debug!(endpoint = ?endpoint, url = %url, "using proxy domain");
                url
            }
            None => default_url,
        }
    }

    /// Headers to attach to requests for `endpoint`.
    ///
    /// Empty unless the endpoint is currently proxied, in which case the
    /// canonical host is named in [`DOH_HOST_HEADER`].
    pub fn current_headers(&self, endpoint: LogicalEndpoint) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if !self.is_active() {
            return headers;
        }

        let default_url = self.inner.config.default_url(endpoint);
        if let Some((known, _)) = self.proxy_for(&default_url) {
            headers.insert(
                HeaderName::from_static(DOH_HOST_HEADER),
                HeaderValue::from_static(known.host()),
            );
        }
        headers
    }

    fn proxy_for(&self, url: &str) -> Option<(KnownHost, String)> {
        let known = KnownHost::from_url(url)?;
        let entry = self.inner.cache.first_usable(known, Utc::now())?;
        Some((known, entry.record.host))
    }

    /// Decide whether a failed request should be retried.
    ///
    /// A failure on a canonical host may trigger a resolution round; a
    /// failure on a proxy domain evicts that domain. Never errors: the
    /// answer is only ever retry or not.
    pub async fn handle_failure(
        &self,
        url: &str,
        request_headers: &HeaderMap,
        code: FailureCode,
    ) -> bool {
        if !self.is_active() {
            return false;
        }

        let Some(host) = host_of(url) else {
            debug!(url, "cannot determine failing host, not retrying");
            return false;
        };

        let canonical = KnownHost::from_host(&host);
        let forced = self.status() == RoutingStatus::ForceAlternativeRouting && canonical.is_some();
        if !forced && !code.is_doh_solvable() {
            debug!(host = %host, code = %code, "failure not solvable by alternative routing");
            return false;
        }

        match canonical {
            Some(known) => self.handle_primary_failure(known).await,
            None => self.handle_proxy_failure(&host, request_headers),
        }
    }

    /// Run [`Self::handle_failure`] on `runtime` and hand the decision to
    /// `completion`.
    pub fn handle_failure_on<F>(
        &self,
        runtime: &Handle,
        url: String,
        request_headers: HeaderMap,
        code: FailureCode,
        completion: F,
    ) -> JoinHandle<()>
    where
        F: FnOnce(bool) + Send + 'static,
    {
        let resolver = self.clone();
        runtime.spawn(async move {
            let retry = resolver.handle_failure(&url, &request_headers, code).await;
            completion(retry);
        })
    }

    async fn handle_primary_failure(&self, known: KnownHost) -> bool {
        if self.inner.cache.has_usable(known, Utc::now()) {
            debug!(host = %known, "proxy domain already cached, retrying");
            return true;
        }

        // The round runs on its own task so an abandoned caller cannot cut
        // it short; later callers still benefit from its result.
        let resolver = self.clone();
        let round = tokio::spawn(async move { resolver.resolve(known).await });
        match round.await {
            Ok(found) => found,
            Err(e) => {
                warn!(host = %known, error = %e, "resolution round task failed");
                false
            }
        }
    }

    fn handle_proxy_failure(&self, host: &str, request_headers: &HeaderMap) -> bool {
        let now = Utc::now();
        let hinted = request_headers
            .get(DOH_HOST_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(KnownHost::from_host);

        // Without a hint the proxy is dropped from every list that holds it.
        let owners = hinted.map_or_else(|| self.inner.cache.owners_of(host, now), |owner| vec![owner]);
        if owners.is_empty() {
            debug!(host, "failing host is neither canonical nor a cached proxy");
            return false;
        }

        let mut retry = false;
        for owner in owners {
            let remaining = self.inner.cache.evict(owner, host, now);
            info!(proxy = host, owner = %owner, remaining, "evicted failing proxy domain");
            retry |= remaining > 0;
        }
        retry
    }

    /// Run a resolution round for `host` with the configured timeout.
    pub async fn resolve(&self, host: KnownHost) -> bool {
        self.resolve_with_timeout(host, self.inner.doh.provider_timeout)
            .await
    }

    /// Run a resolution round for `host`.
    ///
    /// Every provider is queried concurrently and the round waits for all
    /// of them, so a slow provider delays the answer but never hides what
    /// the others found. Returns whether `host` now has a usable entry.
    pub async fn resolve_with_timeout(&self, host: KnownHost, timeout: Duration) -> bool {
        if self.inner.cache.has_usable(host, Utc::now()) {
            return true;
        }

        let name = self.inner.config.lookup_name(host);
        let query = DohQuery::new(&name, self.session_id().as_deref(), timeout);
        let deadline = self.inner.doh.round_deadline(timeout);
        info!(
            host = %host,
            providers = self.inner.providers.len(),
            "starting resolution round"
        );

        let tasks = self.inner.providers.iter().map(|provider| {
            let provider = Arc::clone(provider);
            let query = query.clone();
            tokio::spawn(async move {
                let name = provider.name();
                let result = tokio::time::timeout(deadline, provider.lookup(&query))
                    .await
                    .unwrap_or_else(|_| {
                        debug!(provider = name, "provider missed the round deadline");
                        None
                    });
                debug!(
                    provider = name,
                    found = result.as_ref().map_or(0, Vec::len),
                    "provider finished"
                );
                result
            })
        });

        let mut contributions: Vec<Vec<ResolvedRecord>> = join_all(tasks)
            .await
            .into_iter()
            .filter_map(|outcome| match outcome {
                Ok(Some(records)) if !records.is_empty() => Some(records),
                Ok(_) => None,
                Err(e) => {
                    warn!(error = %e, "provider task failed");
                    None
                }
            })
            .collect();
        shuffle_contributions(&mut contributions);

        let now = Utc::now();
        for records in contributions {
            self.inner.cache.merge(host, records, now);
        }

        let found = self.inner.cache.has_usable(host, now);
        info!(host = %host, found, "resolution round finished");
        found
    }

    /// Every cached proxy hostname across all known hosts
    pub fn proxy_hosts(&self) -> Vec<String> {
        self.inner.cache.proxy_hosts(Utc::now())
    }

    /// Cached proxy records for `host`, in preference order
    pub fn cached_records(&self, host: KnownHost) -> Vec<ResolvedRecord> {
        self.inner
            .cache
            .entries(host, Utc::now())
            .into_iter()
            .map(|entry| entry.record)
            .collect()
    }

    /// Forget every proxy domain (e.g. on sign-out)
    pub fn clear_cache(&self) {
        info!("clearing proxy domain cache");
        self.inner.cache.clear();
    }

    #[cfg(test)]
    pub(crate) fn cache(&self) -> &ProxyCache {
        &self.inner.cache
    }
}

/// Builder for configuring a [`FailoverResolver`]
pub struct FailoverResolverBuilder {
    config: ServerConfig,
    doh: Option<DohConfig>,
    providers: Option<Vec<Arc<dyn DohProvider>>>,
    http: Option<HttpClient>,
    status: Option<RoutingStatus>,
    session_id: Option<String>,
}

impl FailoverResolverBuilder {
    /// Create a new builder with the given deployment configuration
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            doh: None,
            providers: None,
            http: None,
            status: None,
            session_id: None,
        }
    }

    /// Set round timings (defaults to the config's DoH timeout)
    #[must_use]
    pub fn doh_config(mut self, doh: DohConfig) -> Self {
        self.doh = Some(doh);
        self
    }

    /// Replace the provider set
    #[must_use]
    pub fn providers(mut self, providers: Vec<Arc<dyn DohProvider>>) -> Self {
        self.providers = Some(providers);
        self
    }

    /// HTTP client used by the built-in providers
    #[must_use]
    pub fn http_client(mut self, http: HttpClient) -> Self {
        self.http = Some(http);
        self
    }

    /// Override the initial routing status from the config
    #[must_use]
    pub fn status(mut self, status: RoutingStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Set the session identifier prefixed to DoH query names
    #[must_use]
    pub fn session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Build the resolver
    #[must_use]
    pub fn build(self) -> FailoverResolver {
        let doh = self
            .doh
            .unwrap_or_else(|| DohConfig::new().provider_timeout(self.config.doh_timeout()));
        let providers = self
            .providers
            .unwrap_or_else(|| default_providers(&self.http.unwrap_or_default()));
        let status = self.status.unwrap_or(self.config.routing_status);

        FailoverResolver {
            inner: Arc::new(ResolverInner {
                config: self.config,
                doh,
                providers,
                cache: ProxyCache::new(),
                status: AtomicU8::new(status.as_u8()),
                session_id: RwLock::new(self.session_id),
            }),
        }
    }
}

fn host_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed
        .host_str()
        .filter(|host| !host.is_empty())
        .map(str::to_ascii_lowercase)
}

/// Substitute `proxy` for the first case-insensitive occurrence of `host`.
fn replace_host(url: &str, host: &str, proxy: &str) -> String {
    let Some(start) = url.to_ascii_lowercase().find(host) else {
        return url.to_string();
    };
    let mut replaced = String::with_capacity(url.len() + proxy.len());
    replaced.push_str(&url[..start]);
    replaced.push_str(proxy);
    replaced.push_str(&url[start + host.len()..]);
    replaced
}

fn shuffle_contributions(contributions: &mut [Vec<ResolvedRecord>]) {
    let mut rng = rand::rng();
    for records in contributions.iter_mut() {
        records.shuffle(&mut rng);
    }
    contributions.shuffle(&mut rng);
}

#[cfg(test)]
mod tests {
    use super::*;
    use altroute_core::CacheEntry;
    use chrono::TimeDelta;

    fn resolver() -> FailoverResolver {
        FailoverResolver::builder(ServerConfig {
            api_path: "/core/v4".into(),
            ..ServerConfig::default()
        })
        .providers(Vec::new())
        .build()
    }

    #[test]
    fn replace_host_keeps_path_and_query() {
        assert_eq!(
            replace_host(
                "https://MAIL-API.proton.me/core/v4?x=1",
                "mail-api.proton.me",
                "p.example.net"
            ),
            "https://p.example.net/core/v4?x=1"
        );
        assert_eq!(
            replace_host("https://other.net", "mail-api.proton.me", "p.example.net"),
            "https://other.net"
        );
    }

    #[test]
    fn host_of_requires_a_host() {
        assert_eq!(host_of("https://A.example.net/x"), Some("a.example.net".into()));
        assert_eq!(host_of("mailto:someone"), None);
        assert_eq!(host_of("::nonsense"), None);
    }

    #[test]
    fn stale_entry_is_not_used_for_url() {
        let resolver = resolver();
        resolver.cache().insert_raw(
            KnownHost::MailApi,
            CacheEntry::new(
                ResolvedRecord::new("old.example.net", 60),
                Utc::now() - TimeDelta::hours(30),
            ),
        );

        assert_eq!(
            resolver.current_url(LogicalEndpoint::Api),
            "https://mail-api.proton.me/core/v4"
        );
        assert!(resolver.current_headers(LogicalEndpoint::Api).is_empty());
        assert!(resolver.proxy_hosts().is_empty());
    }

    #[tokio::test]
    async fn empty_provider_set_means_no_retry() {
        let resolver = resolver();
        let retry = resolver
            .handle_failure(
                "https://mail-api.proton.me/core/v4/users",
                &HeaderMap::new(),
                FailureCode::TimedOut,
            )
            .await;
        assert!(!retry);
    }

    #[tokio::test]
    async fn unhinted_proxy_failure_evicts_every_owner() {
        let resolver = resolver();
        let now = Utc::now();
        let shared = || vec![ResolvedRecord::new("a.example.net", 60)];
        resolver.cache().merge(KnownHost::MailApi, shared(), now);
        resolver.cache().merge(KnownHost::Verify, shared(), now);
        resolver.cache().merge(
            KnownHost::Account,
            vec![ResolvedRecord::new("b.example.net", 60)],
            now,
        );

        let retry = resolver
            .handle_failure("https://a.example.net/x", &HeaderMap::new(), FailureCode::TimedOut)
            .await;

        assert!(!retry);
        assert!(resolver.cached_records(KnownHost::MailApi).is_empty());
        assert!(resolver.cached_records(KnownHost::Verify).is_empty());
        assert_eq!(resolver.cached_records(KnownHost::Account).len(), 1);
    }

    #[tokio::test]
    async fn hinted_proxy_failure_evicts_only_named_owner() {
        let resolver = resolver();
        let now = Utc::now();
        let shared = || vec![ResolvedRecord::new("a.example.net", 60)];
        resolver.cache().merge(KnownHost::MailApi, shared(), now);
        resolver.cache().merge(KnownHost::Verify, shared(), now);

        let mut headers = HeaderMap::new();
        headers.insert(DOH_HOST_HEADER, HeaderValue::from_static("verify.proton.me"));
        let retry = resolver
            .handle_failure("https://a.example.net/x", &headers, FailureCode::TimedOut)
            .await;

        assert!(!retry);
        assert!(resolver.cached_records(KnownHost::Verify).is_empty());
        assert_eq!(resolver.cached_records(KnownHost::MailApi).len(), 1);
    }

    #[test]
    fn status_is_shared_between_clones() {
        let resolver = resolver();
        let other = resolver.clone();
        other.set_status(RoutingStatus::Off);
        assert_eq!(resolver.status(), RoutingStatus::Off);
    }
}
