//! Per-deployment server configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::{AltRouteError, KnownHost, Result, RoutingStatus};

/// Logical endpoints a caller can ask a URL for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalEndpoint {
    /// The main API (default host plus API path)
    Api,
    /// Captcha served to the human verification flow
    Captcha,
    /// Account web app
    Account,
    /// Human verification web app
    HumanVerification,
}

/// Static deployment constants, supplied once when the resolver is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Canonical API base URL
    #[serde(default = "default_host")]
    pub default_host: String,

    /// Path appended to `default_host` for API calls
    #[serde(default)]
    pub api_path: String,

    /// Base URL used for captcha requests
    #[serde(default = "default_captcha_host")]
    pub captcha_host: String,

    /// Account web app base URL
    #[serde(default = "default_account_host")]
    pub account_host: String,

    /// Human verification web app base URL
    #[serde(default = "default_human_verification_host")]
    pub human_verification_host: String,

    /// Domain offered to new users at signup
    #[serde(default = "default_signup_domain")]
    pub signup_domain: String,

    /// Per-provider DoH query timeout in seconds
    #[serde(default = "default_doh_timeout_secs")]
    pub doh_timeout_secs: u64,

    /// Master switch for DoH-based alternative routing
    #[serde(default = "default_enable_doh")]
    pub enable_doh: bool,

    /// DNS zone appended to lookup tokens (`{token}.{zone}`); empty sends
    /// the bare token
    #[serde(default)]
    pub doh_zone: String,

    /// Routing status applied when the resolver is built
    #[serde(default)]
    pub routing_status: RoutingStatus,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            default_host: default_host(),
            api_path: String::new(),
            captcha_host: default_captcha_host(),
            account_host: default_account_host(),
            human_verification_host: default_human_verification_host(),
            signup_domain: default_signup_domain(),
            doh_timeout_secs: default_doh_timeout_secs(),
            enable_doh: default_enable_doh(),
            doh_zone: String::new(),
            routing_status: RoutingStatus::default(),
        }
    }
}

impl ServerConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::from_toml_str(&content)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse config from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| AltRouteError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every base URL parses and the timeout is non-zero
    pub fn validate(&self) -> Result<()> {
        for url in [
            &self.default_host,
            &self.captcha_host,
            &self.account_host,
            &self.human_verification_host,
        ] {
            url::Url::parse(url)
                .map_err(|e| AltRouteError::Config(format!("invalid host URL {url}: {e}")))?;
        }

        if self.doh_timeout_secs == 0 {
            return Err(AltRouteError::Config(
                "doh_timeout_secs must be positive".into(),
            ));
        }

        Ok(())
    }

    /// The canonical default URL of an endpoint
    #[must_use]
    pub fn default_url(&self, endpoint: LogicalEndpoint) -> String {
        match endpoint {
            LogicalEndpoint::Api => format!("{}{}", self.default_host, self.api_path),
            LogicalEndpoint::Captcha => self.captcha_host.clone(),
            LogicalEndpoint::Account => self.account_host.clone(),
            LogicalEndpoint::HumanVerification => self.human_verification_host.clone(),
        }
    }

    /// DNS name queried over DoH for `host`
    #[must_use]
    pub fn lookup_name(&self, host: KnownHost) -> String {
        let zone = self.doh_zone.trim_matches('.');
        if zone.is_empty() {
            host.lookup_token().to_string()
        } else {
            format!("{}.{zone}", host.lookup_token())
        }
    }

    /// Per-provider DoH query timeout
    #[must_use]
    pub const fn doh_timeout(&self) -> Duration {
        Duration::from_secs(self.doh_timeout_secs)
    }
}

// Default value functions for serde.
fn default_host() -> String {
    String::from("https://mail-api.proton.me")
}

fn default_captcha_host() -> String {
    String::from("https://mail-api.proton.me")
}

fn default_account_host() -> String {
    String::from("https://account.proton.me")
}

fn default_human_verification_host() -> String {
    String::from("https://verify.proton.me")
}

fn default_signup_domain() -> String {
    String::from("proton.me")
}

const fn default_doh_timeout_secs() -> u64 {
    10
}

const fn default_enable_doh() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ServerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.doh_timeout(), Duration::from_secs(10));
        assert!(config.enable_doh);
    }

    #[test]
    fn api_url_appends_path() {
        let config = ServerConfig {
            api_path: "/core/v4".into(),
            ..ServerConfig::default()
        };
        assert_eq!(
            config.default_url(LogicalEndpoint::Api),
            "https://mail-api.proton.me/core/v4"
        );
        assert_eq!(
            config.default_url(LogicalEndpoint::HumanVerification),
            "https://verify.proton.me"
        );
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = ServerConfig::from_toml_str(
            r#"
            api_path = "/api"
            doh_timeout_secs = 3
            routing_status = "force"
            "#,
        )
        .unwrap();

        assert_eq!(config.api_path, "/api");
        assert_eq!(config.doh_timeout(), Duration::from_secs(3));
        assert_eq!(config.routing_status, RoutingStatus::ForceAlternativeRouting);
        assert_eq!(config.signup_domain, "proton.me");
    }

    #[test]
    fn rejects_zero_timeout_and_bad_urls() {
        assert!(ServerConfig::from_toml_str("doh_timeout_secs = 0").is_err());
        assert!(ServerConfig::from_toml_str(r#"default_host = "nope""#).is_err());
    }

    #[test]
    fn lookup_name_appends_zone() {
        let bare = ServerConfig::default();
        assert_eq!(
            bare.lookup_name(KnownHost::MailApi),
            KnownHost::MailApi.lookup_token()
        );

        let zoned = ServerConfig::from_toml_str(r#"doh_zone = ".example.com.""#).unwrap();
        assert_eq!(
            zoned.lookup_name(KnownHost::Verify),
            format!("{}.example.com", KnownHost::Verify.lookup_token())
        );
    }

    #[test]
    fn load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("altroute.toml");
        std::fs::write(&path, "enable_doh = false\n").unwrap();

        let config = ServerConfig::load(&path).unwrap();
        assert!(!config.enable_doh);
    }
}
