use serde::{Deserialize, Serialize};
use std::fmt;

/// Classified network failure reported by a caller after a request failed.
///
/// Negative codes follow the platform URL-loading error numbering; positive
/// codes are HTTP statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureCode {
    /// Request timed out (-1001)
    TimedOut,
    /// Hostname could not be found (-1003)
    CannotFindHost,
    /// TCP connection could not be established (-1004)
    CannotConnectToHost,
    /// DNS lookup failed (-1006)
    DnsLookupFailed,
    /// TLS handshake failed (-1200)
    SecureConnectionFailed,
    /// A proxy answered with an empty body (-1014)
    ZeroByteResource,
    /// HTTP 451, blocked for legal reasons
    UnavailableForLegalReasons,
    /// HTTP 310, redirect loop injected by a middlebox
    TooManyRedirects,
    /// Any other HTTP status
    HttpStatus(u16),
    /// Any other platform error code
    Other(i64),
}

impl FailureCode {
    /// Classify a raw numeric code
    #[must_use]
    pub const fn from_code(code: i64) -> Self {
        match code {
            -1001 => Self::TimedOut,
            -1003 => Self::CannotFindHost,
            -1004 => Self::CannotConnectToHost,
            -1006 => Self::DnsLookupFailed,
            -1200 => Self::SecureConnectionFailed,
            -1014 => Self::ZeroByteResource,
            451 => Self::UnavailableForLegalReasons,
            310 => Self::TooManyRedirects,
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            100..=599 => Self::HttpStatus(code as u16),
            other => Self::Other(other),
        }
    }

    /// The numeric code
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::TimedOut => -1001,
            Self::CannotFindHost => -1003,
            Self::CannotConnectToHost => -1004,
            Self::DnsLookupFailed => -1006,
            Self::SecureConnectionFailed => -1200,
            Self::ZeroByteResource => -1014,
            Self::UnavailableForLegalReasons => 451,
            Self::TooManyRedirects => 310,
            Self::HttpStatus(status) => status as i64,
            Self::Other(code) => code,
        }
    }

    /// Returns true if rerouting through a proxy domain can fix this failure.
    ///
    /// Censorship and flaky networks look the same from here, so legal
    /// blocks are treated exactly like transport errors.
    #[must_use]
    pub const fn is_doh_solvable(self) -> bool {
        matches!(
            self,
            Self::TimedOut
                | Self::CannotFindHost
                | Self::CannotConnectToHost
                | Self::DnsLookupFailed
                | Self::SecureConnectionFailed
                | Self::ZeroByteResource
                | Self::UnavailableForLegalReasons
                | Self::TooManyRedirects
                | Self::HttpStatus(451 | 310)
        )
    }
}

impl From<i64> for FailureCode {
    fn from(code: i64) -> Self {
        Self::from_code(code)
    }
}

impl fmt::Display for FailureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?} ({})", self.code())
    }
}
