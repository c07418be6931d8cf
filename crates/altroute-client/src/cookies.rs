//! Cookie replication onto proxy domains.
//!
//! Servers only ever set cookies for the canonical API host. Once requests
//! go through a proxy domain, the same session cookies must exist for that
//! domain too, so every cookie is cloned onto each cached proxy host.

use crate::resolver::FailoverResolver;
use altroute_core::{FailureCode, KnownHost, LogicalEndpoint};
use cookie::Cookie;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{HeaderMap, SET_COOKIE};
use std::sync::Arc;
use tracing::{debug, trace};
use url::Url;

/// Clones canonical-host cookies onto every cached proxy domain.
///
/// Owns its resolver handle and cookie jar, so it can never observe either
/// after they are gone.
#[derive(Clone)]
pub struct CookieReplicator {
    resolver: FailoverResolver,
    jar: Arc<Jar>,
}

impl CookieReplicator {
    /// Pair a resolver with the cookie jar used for intercepted traffic
    #[must_use]
    pub const fn new(resolver: FailoverResolver, jar: Arc<Jar>) -> Self {
        Self { resolver, jar }
    }

    /// The shared cookie jar
    #[must_use]
    pub fn jar(&self) -> Arc<Jar> {
        Arc::clone(&self.jar)
    }

    /// The resolver whose cache names the proxy domains
    #[must_use]
    pub const fn resolver(&self) -> &FailoverResolver {
        &self.resolver
    }

    fn canonical_host(&self) -> Option<KnownHost> {
        let api = self.resolver.config().default_url(LogicalEndpoint::Api);
        KnownHost::from_url(&api)
    }

    /// Replicate the `Set-Cookie` headers of a canonical-host response.
    ///
    /// Returns how many cookies were written; zero when the response is not
    /// from the canonical API host or no proxy domain is cached.
    pub fn sync_response(&self, url: &Url, headers: &HeaderMap) -> usize {
        let Some(canonical) = self.canonical_host() else {
            return 0;
        };
        let from_canonical = url
            .host_str()
            .is_some_and(|host| host.eq_ignore_ascii_case(canonical.host()));
        if !from_canonical {
            return 0;
        }

        let proxies = self.resolver.proxy_hosts();
        if proxies.is_empty() {
            return 0;
        }

        let cookies: Vec<Cookie<'static>> = headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(|line| match Cookie::parse(line.to_owned()) {
                Ok(mut cookie) => {
                    cookie.set_domain(canonical.host());
                    Some(cookie)
                }
                Err(e) => {
                    debug!(error = %e, "skipping unparsable Set-Cookie");
                    None
                }
            })
            .collect();

        self.replicate(&cookies, &proxies)
    }

    /// Copy the cookies already stored for the canonical API host onto
    /// every proxy domain.
    pub fn replicate_existing(&self) -> usize {
        let Some(canonical) = self.canonical_host() else {
            return 0;
        };
        let proxies = self.resolver.proxy_hosts();
        if proxies.is_empty() {
            return 0;
        }

        let Ok(canonical_url) = Url::parse(&format!("{}/", canonical.canonical_url())) else {
            return 0;
        };
        let Some(header) = self.jar.cookies(&canonical_url) else {
            return 0;
        };
        let Ok(header) = header.to_str() else {
            return 0;
        };

        // The jar only hands back name=value pairs, attributes are lost.
        let cookies: Vec<Cookie<'static>> = header
            .split(';')
            .filter_map(|pair| Cookie::parse(pair.trim().to_owned()).ok())
            .map(|mut cookie| {
                cookie.set_path("/");
                cookie.set_secure(true);
                cookie
            })
            .collect();

        self.replicate(&cookies, &proxies)
    }

    /// Ask the resolver about a failure and, when it found a route for the
    /// canonical API host, carry the session cookies over to it.
    pub async fn handle_failure(&self, url: &str, headers: &HeaderMap, code: FailureCode) -> bool {
        let retry = self.resolver.handle_failure(url, headers, code).await;
        let canonical = self.canonical_host();
        if retry && canonical.is_some() && KnownHost::from_url(url) == canonical {
            let copied = self.replicate_existing();
            debug!(copied, "synchronized cookies after alternative routing");
        }
        retry
    }

    fn replicate(&self, cookies: &[Cookie<'static>], proxies: &[String]) -> usize {
        let mut written = 0;
        for proxy in proxies {
            let Ok(proxy_url) = Url::parse(&format!("https://{proxy}/")) else {
                continue;
            };
            for cookie in cookies {
                let mut clone = cookie.clone();
                clone.set_domain(proxy.clone());
                self.jar.add_cookie_str(&clone.to_string(), &proxy_url);
                written += 1;
            }
        }

        trace!(cookies = cookies.len(), proxies = proxies.len(), written, "replicated cookies");
        written
    }
}
