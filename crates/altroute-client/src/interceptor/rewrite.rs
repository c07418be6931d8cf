//! Textual URL and header rewriting between synthetic and real schemes.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

/// Synthetic scheme standing in for `https`
pub const SECURE_SCHEME: &str = "coreioss";

/// Synthetic scheme standing in for `http`
pub const PLAIN_SCHEME: &str = "coreios";

/// Suffix appended to the first host label by the embedded captcha script
pub const API_SUFFIX: &str = "-api";

const FRAME_ANCESTOR_PHRASE: &str = "frame-src 'self' blob: ";

const SOURCE_DIRECTIVES: [&str; 7] = [
    "script-src",
    "style-src",
    "img-src",
    "frame-src",
    "connect-src",
    "font-src",
    "media-src",
];

const CSP_HEADERS: [&str; 4] = [
    "content-security-policy",
    "content-security-policy-report-only",
    "x-content-security-policy",
    "x-webkit-csp",
];

/// Pairs of synthetic and real URL schemes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemeMapping {
    pairs: Vec<(String, String)>,
}

impl Default for SchemeMapping {
    fn default() -> Self {
        Self::new(SECURE_SCHEME, PLAIN_SCHEME)
    }
}

impl SchemeMapping {
    /// Map `secure` to `https` and `plain` to `http`
    #[must_use]
    pub fn new(secure: impl Into<String>, plain: impl Into<String>) -> Self {
        Self {
            pairs: vec![
                (secure.into(), "https".to_string()),
                (plain.into(), "http".to_string()),
            ],
        }
    }

    /// `(synthetic, real)` scheme pairs
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(s, r)| (s.as_str(), r.as_str()))
    }

    /// Returns true if `scheme` is one of the synthetic schemes
    #[must_use]
    pub fn is_synthetic(&self, scheme: &str) -> bool {
        self.pairs
            .iter()
            .any(|(synthetic, _)| synthetic.eq_ignore_ascii_case(scheme))
    }

    /// Swap a synthetic scheme for its real one; `None` if `url` is not synthetic
    #[must_use]
    pub fn to_real(&self, url: &str) -> Option<String> {
        let (scheme, rest) = split_scheme(url)?;
        self.pairs
            .iter()
            .find(|(synthetic, _)| synthetic.eq_ignore_ascii_case(scheme))
            .map(|(_, real)| format!("{real}:{rest}"))
    }

    /// Swap a real scheme for its synthetic one; `None` if `url` is not http(s)
    #[must_use]
    pub fn to_synthetic(&self, url: &str) -> Option<String> {
        let (scheme, rest) = split_scheme(url)?;
        self.pairs
            .iter()
            .find(|(_, real)| real.eq_ignore_ascii_case(scheme))
            .map(|(synthetic, _)| format!("{synthetic}:{rest}"))
    }
}

fn split_scheme(url: &str) -> Option<(&str, &str)> {
    let (scheme, rest) = url.split_once(':')?;
    let valid = !scheme.is_empty()
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then_some((scheme, rest))
}

/// Remove an `-api` suffix from the first host label.
///
/// Returns the rewritten URL and the byte offset the suffix was removed
/// from, so it can be put back into the response URL.
#[must_use]
pub fn strip_api_suffix(url: &str) -> (String, Option<usize>) {
    let Some(authority_start) = url.find("://").map(|i| i + 3) else {
        return (url.to_string(), None);
    };

    let rest = &url[authority_start..];
    let authority_end = rest
        .find(|c: char| matches!(c, '/' | '?' | '#'))
        .unwrap_or(rest.len());
    let authority = &rest[..authority_end];
    let host_start = authority.rfind('@').map_or(0, |i| i + 1);
    let host = &authority[host_start..];
    let label_end = host.find(|c: char| matches!(c, '.' | ':')).unwrap_or(host.len());
    let label = &host[..label_end];

    if label.len() <= API_SUFFIX.len() || !label.to_ascii_lowercase().ends_with(API_SUFFIX) {
        return (url.to_string(), None);
    }

    let offset = authority_start + host_start + label_end - API_SUFFIX.len();
    let mut stripped = url.to_string();
    stripped.replace_range(offset..offset + API_SUFFIX.len(), "");
    (stripped, Some(offset))
}

/// Put `-api` back at `offset`; out-of-range offsets leave the URL alone
#[must_use]
pub fn reinsert_api_suffix(url: &str, offset: usize) -> String {
    if offset > url.len() || !url.is_char_boundary(offset) {
        return url.to_string();
    }
    let mut restored = url.to_string();
    restored.insert_str(offset, API_SUFFIX);
    restored
}

/// The `-api` variant of a host (`a.b.c` -> `a-api.b.c`)
#[must_use]
pub fn api_variant(host: &str) -> Option<String> {
    let dot = host.find('.')?;
    Some(format!("{}{API_SUFFIX}{}", &host[..dot], &host[dot..]))
}

/// Extend a Content-Security-Policy value so documents served over the
/// synthetic schemes keep working. Only ever adds sources.
#[must_use]
pub fn rewrite_csp(value: &str, mapping: &SchemeMapping, host: Option<&str>) -> String {
    let mut policy = value.to_string();

    if let Some(host) = host {
        for (synthetic, _) in mapping.pairs() {
            let Some(at) = policy
                .find(FRAME_ANCESTOR_PHRASE)
                .map(|i| i + FRAME_ANCESTOR_PHRASE.len())
            else {
                break;
            };
            policy.insert_str(at, &format!("{synthetic}://{host} "));
            if let Some(api_host) = api_variant(host) {
                policy.insert_str(at, &format!("{synthetic}://{api_host} "));
            }
        }
    }

    for (synthetic, _) in mapping.pairs() {
        for directive in SOURCE_DIRECTIVES {
            if let Some(i) = policy.find(directive) {
                policy.insert_str(i + directive.len(), &format!(" {synthetic}:"));
            }
        }
    }

    policy
}

/// Rewrite every response header: real scheme URLs become synthetic, and
/// CSP headers are extended via [`rewrite_csp`].
#[must_use]
pub fn rewrite_response_headers(
    headers: &HeaderMap,
    mapping: &SchemeMapping,
    host: Option<&str>,
) -> HeaderMap {
    let mut rewritten = HeaderMap::with_capacity(headers.len());

    for (name, value) in headers {
        let Ok(text) = value.to_str() else {
            rewritten.append(name.clone(), value.clone());
            continue;
        };

        let mut text = text.to_string();
        for (synthetic, real) in mapping.pairs() {
            text = text.replace(&format!("{real}://"), &format!("{synthetic}://"));
        }
        if is_csp_header(name) {
            text = rewrite_csp(&text, mapping, host);
        }

        let value = HeaderValue::from_str(&text).unwrap_or_else(|_| value.clone());
        rewritten.append(name.clone(), value);
    }

    rewritten
}

fn is_csp_header(name: &HeaderName) -> bool {
    CSP_HEADERS.contains(&name.as_str())
}
