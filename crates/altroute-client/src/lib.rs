//! Alternative routing client.
//!
//! When the canonical API hosts are unreachable, [`FailoverResolver`] looks
//! up proxy domains over DNS-over-HTTPS and swaps them into request URLs.
//! [`RequestInterceptor`] serves the embedded verification webview through
//! the same routes, and [`CookieReplicator`] keeps session cookies valid on
//! every proxy domain.

#![doc(html_root_url = "https://docs.rs/altroute-client/0.1.0")]

mod cache;
mod config;
mod cookies;
pub mod doh;
mod failure;
pub mod interceptor;
mod resolver;

pub use cache::ProxyCache;
pub use config::*;
pub use cookies::CookieReplicator;
pub use failure::{failure_code, response_failure, transport_error};
pub use interceptor::{
    InterceptedRequest, InterceptedResponse, RequestInterceptor, RewrittenRequest,
    SchemeMapping, SchemeTask,
};
pub use resolver::{FailoverResolver, FailoverResolverBuilder};
pub use altroute_core::{AltRouteError, Result};
pub use reqwest;
