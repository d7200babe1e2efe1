//! Log Redaction Layer
//!
//! Scrubs credentials out of script source URLs before they are logged.

use regex::Regex;
use std::sync::LazyLock;

static USERINFO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?P<scheme>[a-zA-Z][a-zA-Z0-9+.\-]*://)[^/@\s]+@").unwrap());
static SECRET_PARAM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?P<key>[?&](?:token|access_token|key|api_key|secret|sig|signature)=)[^&#\s]+")
        .unwrap()
});

/// Redacts userinfo and secret-looking query parameters in a URL.
pub fn redact_url(input: &str) -> String {
    let redacted = USERINFO_RE.replace_all(input, "${scheme}[REDACTED]@");
    SECRET_PARAM_RE
        .replace_all(&redacted, "${key}[REDACTED]")
        .to_string()
}
