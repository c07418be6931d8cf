//! Core types for DNS-over-HTTPS alternative routing.
//!
//! This crate provides the foundational types shared by the resolver,
//! the DoH provider clients and the webview interceptor:
//!
//! - **Types**: known canonical hosts, resolved proxy records, routing status
//!   and network failure codes
//! - **Config**: per-deployment [`ServerConfig`]
//! - **Errors**: the workspace-wide [`AltRouteError`]
//!
//! # Example
//!
//! ```rust,ignore
//! use altroute_core::{FailureCode, KnownHost};
//!
//! let host = KnownHost::from_url("https://mail-api.proton.me/core/v4").unwrap();
//! assert_eq!(host, KnownHost::MailApi);
//! assert!(FailureCode::from_code(-1001).is_doh_solvable());
//! ```

#![doc(html_root_url = "https://docs.rs/altroute-core/0.1.0")]

mod config;
mod error;
pub mod types;

pub use config::{LogicalEndpoint, ServerConfig};
pub use error::{AltRouteError, Result};
pub use types::*;

/// Header carrying the canonical hostname a proxied request is meant for.
pub const DOH_HOST_HEADER: &str = "x-pm-doh-host";

/// DNS record type code for TXT records.
pub const TXT_RECORD_TYPE: u16 = 16;

/// How long a resolved proxy domain stays usable after it was fetched.
pub const CACHE_FRESHNESS_HOURS: i64 = 24;
