//! Mapping HTTP client errors onto routing failure codes.

use altroute_core::{AltRouteError, FailureCode};
use std::error::Error as StdError;
use std::time::Duration;

/// Classify a `reqwest` error the way the failover resolver expects.
#[must_use]
pub fn failure_code(err: &reqwest::Error) -> FailureCode {
    if err.is_timeout() {
        return FailureCode::TimedOut;
    }

    if let Some(status) = err.status() {
        return FailureCode::from_code(i64::from(status.as_u16()));
    }

    if err.is_redirect() {
        return FailureCode::TooManyRedirects;
    }

    if err.is_connect() {
        let chain = source_chain(err);
        if chain.contains("dns error") || chain.contains("failed to lookup address") {
            return FailureCode::CannotFindHost;
        }
        if chain.contains("certificate") || chain.contains("tls") || chain.contains("handshake") {
            return FailureCode::SecureConnectionFailed;
        }
        return FailureCode::CannotConnectToHost;
    }

    FailureCode::Other(-1)
}

/// Classify a response that completed but should still count as a failure
#[must_use]
pub fn response_failure(status: reqwest::StatusCode, body_len: usize) -> Option<FailureCode> {
    if status.is_success() && body_len == 0 {
        return Some(FailureCode::ZeroByteResource);
    }
    if status.is_success() {
        return None;
    }
    Some(FailureCode::from_code(i64::from(status.as_u16())))
}

/// Turn a transport error into the crate error delivered to scheme tasks
#[must_use]
pub fn transport_error(err: &reqwest::Error, timeout: Duration) -> AltRouteError {
    if err.is_timeout() {
        AltRouteError::Timeout(timeout.as_secs())
    } else if err.is_connect() {
        AltRouteError::Connection(err.to_string())
    } else {
        AltRouteError::Http(err.to_string())
    }
}

fn source_chain(err: &reqwest::Error) -> String {
    let mut chain = err.to_string().to_ascii_lowercase();
    let mut source = err.source();
    while let Some(inner) = source {
        chain.push_str(" | ");
        chain.push_str(&inner.to_string().to_ascii_lowercase());
        source = inner.source();
    }
    chain
}
