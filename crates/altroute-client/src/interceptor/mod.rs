//! Webview request interception over synthetic URL schemes.
//!
//! The embedded human-verification page is loaded as
//! `coreioss://verify.proton.me/...`. Every request on a synthetic scheme
//! is rewritten onto its real scheme, sent with the routing headers and the
//! shared cookie jar, and the response is rewritten back so the page keeps
//! talking to the synthetic scheme.

mod rewrite;

use crate::cookies::CookieReplicator;
use crate::failure::transport_error;
use crate::resolver::FailoverResolver;
use altroute_core::{AltRouteError, LogicalEndpoint, Result, DOH_HOST_HEADER};
use bytes::Bytes;
use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, HeaderValue, ORIGIN};
use reqwest::{Client as HttpClient, Method, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

pub use rewrite::{
    api_variant, reinsert_api_suffix, rewrite_csp, rewrite_response_headers, strip_api_suffix,
    SchemeMapping, API_SUFFIX, PLAIN_SCHEME, SECURE_SCHEME,
};

const CAPTCHA_MARKER: &str = "/captcha?";

/// Default timeout for intercepted requests
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A request issued by the webview
#[derive(Debug, Clone)]
pub struct InterceptedRequest {
    /// HTTP method
    pub method: Method,
    /// Full URL, synthetic scheme included
    pub url: String,
    /// Request headers
    pub headers: HeaderMap,
    /// Optional request body
    pub body: Option<Vec<u8>>,
}

impl InterceptedRequest {
    /// A bodiless request with no headers
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Shorthand for a `GET` request
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    /// Add a header
    #[must_use]
    pub fn header(mut self, name: &'static str, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set the request body
    #[must_use]
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// Response head handed back to the webview
#[derive(Debug, Clone)]
pub struct InterceptedResponse {
    /// HTTP status
    pub status: StatusCode,
    /// Response URL on the synthetic scheme
    pub url: String,
    /// Rewritten response headers
    pub headers: HeaderMap,
}

/// A request rewritten onto its real scheme
#[derive(Debug, Clone)]
pub struct RewrittenRequest {
    /// The outgoing request
    pub request: InterceptedRequest,
    /// Where `-api` was removed from the URL, if it was
    pub api_offset: Option<usize>,
}

/// Receiver of an intercepted request's outcome.
///
/// Either `did_receive_response`, any number of `did_receive_data` and
/// `did_finish` are called in that order, or `did_fail` is called once.
pub trait SchemeTask: Send + Sync {
    /// Response head is available
    fn did_receive_response(&self, response: InterceptedResponse);

    /// A chunk of the body arrived
    fn did_receive_data(&self, data: Bytes);

    /// The body is complete
    fn did_finish(&self);

    /// The request failed
    fn did_fail(&self, error: AltRouteError);
}

/// Serves synthetic-scheme requests for the webview.
#[derive(Clone)]
pub struct RequestInterceptor {
    resolver: FailoverResolver,
    replicator: CookieReplicator,
    schemes: SchemeMapping,
    timeout: Duration,
}

impl RequestInterceptor {
    /// Interceptor sending its traffic through `jar`
    #[must_use]
    pub fn new(resolver: FailoverResolver, jar: Arc<Jar>) -> Self {
        let replicator = CookieReplicator::new(resolver.clone(), jar);
        Self {
            resolver,
            replicator,
            schemes: SchemeMapping::default(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Use a different scheme mapping
    #[must_use]
    pub fn with_schemes(mut self, schemes: SchemeMapping) -> Self {
        self.schemes = schemes;
        self
    }

    /// Set the per-request timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The scheme mapping in use
    #[must_use]
    pub const fn schemes(&self) -> &SchemeMapping {
        &self.schemes
    }

    /// The cookie replicator fed by intercepted responses
    #[must_use]
    pub const fn replicator(&self) -> &CookieReplicator {
        &self.replicator
    }

    /// Rewrite a webview request onto its real scheme.
    ///
    /// Captcha requests go out without routing headers, everything else
    /// carries the human-verification headers of the resolver.
    pub fn rewrite_request(&self, request: InterceptedRequest) -> Result<RewrittenRequest> {
        let InterceptedRequest {
            method,
            url,
            mut headers,
            body,
        } = request;

        if url.is_empty() {
            return Err(AltRouteError::MissingUrl);
        }

        let real = self.schemes.to_real(&url).unwrap_or(url);
        let (real, api_offset) = strip_api_suffix(&real);

        if real.contains(CAPTCHA_MARKER) {
            headers.remove(DOH_HOST_HEADER);
        } else {
            let routing = self.resolver.current_headers(LogicalEndpoint::HumanVerification);
            for (name, value) in &routing {
                headers.insert(name.clone(), value.clone());
            }
        }

        let origin = headers
            .get(ORIGIN)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| self.schemes.to_real(value));
        if let Some(origin) = origin {
            let value = HeaderValue::from_str(&origin)
                .map_err(|_| AltRouteError::InvalidUrl(origin.clone()))?;
            headers.insert(ORIGIN, value);
        }

        let parsed = Url::parse(&real).map_err(|e| AltRouteError::InvalidUrl(format!("{real}: {e}")))?;
        if parsed.host_str().is_none() {
            return Err(AltRouteError::MissingHost(real));
        }

        Ok(RewrittenRequest {
            request: InterceptedRequest {
                method,
                url: real,
                headers,
                body,
            },
            api_offset,
        })
    }

    /// Rewrite a real response head back onto the synthetic scheme.
    pub fn rewrite_response(
        &self,
        url: &str,
        status: StatusCode,
        headers: &HeaderMap,
        api_offset: Option<usize>,
    ) -> Result<InterceptedResponse> {
        let host = Url::parse(url)
            .ok()
            .and_then(|parsed| parsed.host_str().map(str::to_owned));
        let headers = rewrite_response_headers(headers, &self.schemes, host.as_deref());

        let restored = api_offset.map_or_else(|| url.to_string(), |offset| reinsert_api_suffix(url, offset));
        let synthetic = self
            .schemes
            .to_synthetic(&restored)
            .ok_or_else(|| AltRouteError::InvalidUrl(restored.clone()))?;
        Url::parse(&synthetic).map_err(|e| AltRouteError::InvalidUrl(format!("{synthetic}: {e}")))?;

        Ok(InterceptedResponse {
            status,
            url: synthetic,
            headers,
        })
    }

    /// Serve `request`, reporting the outcome to `task`.
    pub async fn start(&self, request: InterceptedRequest, task: Arc<dyn SchemeTask>) {
        if let Err(e) = self.serve(request, task.as_ref()).await {
            warn!(error = %e, "intercepted request failed");
            task.did_fail(e);
        }
    }

    /// Serve `request` on a background task
    pub fn spawn(&self, request: InterceptedRequest, task: Arc<dyn SchemeTask>) -> JoinHandle<()> {
        let interceptor = self.clone();
        tokio::spawn(async move { interceptor.start(request, task).await })
    }

    /// The webview stopped a request. In-flight work is not cancelled.
    pub fn stop(&self, request: &InterceptedRequest) {
        debug!(
            url = %request.url,
            doh_host = ?request.headers.get(DOH_HOST_HEADER),
            "webview stopped intercepted request"
        );
    }

    async fn serve(&self, request: InterceptedRequest, task: &dyn SchemeTask) -> Result<()> {
        let RewrittenRequest { request, api_offset } = self.rewrite_request(request)?;
        debug!(
            method = %request.method,
            url = %request.url,
            doh_host = ?request.headers.get(DOH_HOST_HEADER),
            "forwarding intercepted request"
        );

        let session = self.session()?;
        let mut outgoing = session
            .request(request.method, &request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            outgoing = outgoing.body(body);
        }

        let mut response = outgoing
            .send()
            .await
            .map_err(|e| transport_error(&e, self.timeout))?;

        let copied = self.replicator.sync_response(response.url(), response.headers());
        if copied > 0 {
            debug!(copied, "replicated response cookies onto proxy domains");
        }

        let head = self.rewrite_response(
            response.url().as_str(),
            response.status(),
            response.headers(),
            api_offset,
        )?;
        task.did_receive_response(head);

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| transport_error(&e, self.timeout))?
        {
            task.did_receive_data(chunk);
        }
        task.did_finish();
        Ok(())
    }

    // A fresh session per request; only the cookie jar is shared.
    fn session(&self) -> Result<HttpClient> {
        HttpClient::builder()
            .cookie_provider(self.replicator.jar())
            .timeout(self.timeout)
            .build()
            .map_err(|e| AltRouteError::Http(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use altroute_core::{KnownHost, ResolvedRecord, ServerConfig};
    use chrono::Utc;

    fn interceptor() -> RequestInterceptor {
        let resolver = FailoverResolver::builder(ServerConfig::default())
            .providers(Vec::new())
            .build();
        RequestInterceptor::new(resolver, Arc::new(Jar::default()))
    }

    #[test]
    fn empty_url_is_rejected() {
        let err = interceptor()
            .rewrite_request(InterceptedRequest::get(""))
            .unwrap_err();
        assert!(matches!(err, AltRouteError::MissingUrl));
    }

    #[test]
    fn hostless_url_is_rejected() {
        let err = interceptor()
            .rewrite_request(InterceptedRequest::get("coreioss://"))
            .unwrap_err();
        assert!(matches!(err, AltRouteError::InvalidUrl(_)));
    }

    #[test]
    fn request_goes_to_real_scheme_without_api_suffix() {
        let rewritten = interceptor()
            .rewrite_request(
                InterceptedRequest::get("coreioss://verify-api.proton.me/core/v4/captcha?Token=t")
                    .header("origin", HeaderValue::from_static("coreioss://verify.proton.me")),
            )
            .unwrap();

        assert_eq!(
            rewritten.request.url,
            "https://verify.proton.me/core/v4/captcha?Token=t"
        );
        assert_eq!(rewritten.api_offset, Some(14));
        assert_eq!(rewritten.request.headers[ORIGIN], "https://verify.proton.me");
    }

    #[test]
    fn captcha_requests_drop_routing_header() {
        let interceptor = interceptor();
        let rewritten = interceptor
            .rewrite_request(
                InterceptedRequest::get("coreioss://verify.proton.me/captcha?v=1")
                    .header(DOH_HOST_HEADER, HeaderValue::from_static("verify.proton.me")),
            )
            .unwrap();
        assert!(rewritten.request.headers.get(DOH_HOST_HEADER).is_none());
    }

    #[test]
    fn proxied_requests_gain_routing_header() {
        let interceptor = interceptor();
        interceptor.resolver.cache().merge(
            KnownHost::Verify,
            vec![ResolvedRecord::new("v1.example.net", 60)],
            Utc::now(),
        );

        let rewritten = interceptor
            .rewrite_request(InterceptedRequest::get("coreioss://verify.proton.me/index.html"))
            .unwrap();
        assert_eq!(rewritten.request.headers[DOH_HOST_HEADER], "verify.proton.me");
    }

    #[test]
    fn response_url_returns_to_synthetic_scheme() {
        let interceptor = interceptor();
        let head = interceptor
            .rewrite_response(
                "https://verify.proton.me/core/v4/captcha?Token=t",
                StatusCode::OK,
                &HeaderMap::new(),
                Some(14),
            )
            .unwrap();
        assert_eq!(head.url, "coreioss://verify-api.proton.me/core/v4/captcha?Token=t");
        assert_eq!(head.status, StatusCode::OK);
    }

    #[test]
    fn response_on_unknown_scheme_fails() {
        let err = interceptor()
            .rewrite_response("ftp://verify.proton.me/", StatusCode::OK, &HeaderMap::new(), None)
            .unwrap_err();
        assert!(matches!(err, AltRouteError::InvalidUrl(_)));
    }
}
