//! Alternative routing for blocked API hosts.
//!
//! When the canonical hosts cannot be reached, proxy domains are looked up
//! over DNS-over-HTTPS (Google and Quad9) and substituted into request URLs.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use altroute::reqwest::header::HeaderMap;
//! use altroute::{FailoverResolver, FailureCode, LogicalEndpoint, ServerConfig};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> altroute::Result<()> {
//!     let config = ServerConfig::load(Path::new("altroute.toml"))?;
//!     let resolver = FailoverResolver::new(config);
//!
//!     let url = resolver.current_url(LogicalEndpoint::Api);
//!     // ... the request to `url` timed out
//!     let retry = resolver
//!         .handle_failure(&url, &HeaderMap::new(), FailureCode::TimedOut)
//!         .await;
//!
//!     if retry {
//!         println!("retry via {}", resolver.current_url(LogicalEndpoint::Api));
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - `default` - Uses rustls for TLS
//! - `rustls` - Use rustls for TLS (recommended)
//! - `native-tls` - Use system native TLS

#![doc(html_root_url = "https://docs.rs/altroute/0.1.0")]

// Re-export core types
pub use altroute_core::*;

// Re-export client
pub use altroute_client::{
    doh, failure_code, interceptor, response_failure, transport_error, CookieReplicator,
    DohConfig, FailoverResolver, FailoverResolverBuilder, InterceptedRequest,
    InterceptedResponse, ProxyCache, RequestInterceptor, RewrittenRequest, SchemeMapping,
    SchemeTask,
};
pub use altroute_client::reqwest;

// Re-export runtime for convenience
pub use serde;
pub use serde_json;
pub use tokio;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolver_without_providers_stays_on_canonical_host() {
        let resolver = FailoverResolver::builder(ServerConfig::default())
            .providers(Vec::new())
            .build();
        assert_eq!(
            resolver.current_url(LogicalEndpoint::Api),
            "https://mail-api.proton.me"
        );

        let retry = tokio_test::block_on(resolver.handle_failure(
            "https://mail-api.proton.me/core/v4/tests/ping",
            &reqwest::header::HeaderMap::new(),
            FailureCode::TimedOut,
        ));
        assert!(!retry);
        assert!(resolver.proxy_hosts().is_empty());
    }
}
