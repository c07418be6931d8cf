use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Canonical production hosts that may be reached through a proxy domain.
///
/// The set is closed: only these hosts are ever looked up over DoH, and
/// only failures on these hosts can trigger a resolution round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KnownHost {
    /// Mail API
    MailApi,
    /// Calendar API
    CalendarApi,
    /// Drive API
    DriveApi,
    /// Account web app
    Account,
    /// Account API
    AccountApi,
    /// Human verification web app
    Verify,
    /// Human verification API
    VerifyApi,
}

impl KnownHost {
    /// Every known host, in declaration order
    pub const ALL: [Self; 7] = [
        Self::MailApi,
        Self::CalendarApi,
        Self::DriveApi,
        Self::Account,
        Self::AccountApi,
        Self::Verify,
        Self::VerifyApi,
    ];

    /// The canonical hostname
    #[must_use]
    pub const fn host(self) -> &'static str {
        match self {
            Self::MailApi => "mail-api.proton.me",
            Self::CalendarApi => "calendar-api.proton.me",
            Self::DriveApi => "drive-api.proton.me",
            Self::Account => "account.proton.me",
            Self::AccountApi => "account-api.proton.me",
            Self::Verify => "verify.proton.me",
            Self::VerifyApi => "verify-api.proton.me",
        }
    }

    /// The canonical base URL (`https://{host}`)
    #[must_use]
    pub fn canonical_url(self) -> String {
        format!("https://{}", self.host())
    }

    /// Obfuscated label queried over DoH to discover proxy domains.
    ///
    /// Only the first label; the zone it lives under comes from
    /// `ServerConfig::doh_zone`.
    #[must_use]
    pub const fn lookup_token(self) -> &'static str {
        match self {
            Self::MailApi => "dNVQWS3BNMFYGSLTQOJXXI33OFZWWK",
            Self::CalendarApi => "dMNQWYZLOMRQXELLBOBUS44DSN52G63RONVSQ",
            Self::DriveApi => "dMRZGS5TFFVQXA2JOOBZG65DPNYXG2ZI",
            Self::Account => "dMFRWG33VNZ2C44DSN52G63RONVSQ",
            Self::AccountApi => "dMFRWG33VNZ2C2YLQNEXHA4TPORXW4LTNMU",
            Self::Verify => "dOZSXE2LGPEXHA4TPORXW4LTNMU",
            Self::VerifyApi => "dOZSXE2LGPEWWC4DJFZYHE33UN5XC43LF",
        }
    }

    /// Look up a known host by hostname (case-insensitive, exact match)
    #[must_use]
    pub fn from_host(host: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|known| known.host().eq_ignore_ascii_case(host))
    }

    /// Look up the known host a URL points at
    #[must_use]
    pub fn from_url(url: &str) -> Option<Self> {
        let parsed = Url::parse(url).ok()?;
        Self::from_host(parsed.host_str()?)
    }
}

impl fmt::Display for KnownHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.host())
    }
}
