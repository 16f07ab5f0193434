//! URL and filename validation for remote material downloads.
//!
//! Material URLs come from remote profile payloads and must never cause a
//! request to an internal address. Filenames come from the same payloads
//! and must never escape the upload root.

use std::net::IpAddr;

use crate::error::FederationError;

/// Maximum sanitized filename length (bytes).
const MAX_FILENAME_LEN: usize = 120;

/// Validate a material download URL.
///
/// Checks:
/// 1. URL is parseable
/// 2. Scheme is HTTPS (or HTTP if `allow_http` is true for dev/test)
/// 3. Host is not a private/internal address (SSRF protection)
pub fn validate_material_url(url: &str, allow_http: bool) -> Result<url::Url, FederationError> {
    let parsed = url::Url::parse(url)
        .map_err(|e| FederationError::RejectedUrl(format!("Invalid URL format: {e}")))?;

    match parsed.scheme() {
        "https" => {}
        "http" if allow_http => {}
        "http" => {
            return Err(FederationError::RejectedUrl(
                "Material URLs must use HTTPS".to_string(),
            ));
        }
        scheme => {
            return Err(FederationError::RejectedUrl(format!(
                "Unsupported URL scheme: {scheme}"
            )));
        }
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| FederationError::RejectedUrl("URL must have a host".to_string()))?;

    validate_host_not_internal(host)?;

    Ok(parsed)
}

/// Validate that a host is not a private/internal address.
///
/// Blocks:
/// - Loopback addresses (127.0.0.0/8)
/// - Private networks (10.0.0.0/8, 172.16.0.0/12, 192.168.0.0/16)
/// - Link-local (169.254.0.0/16, the cloud metadata endpoint)
/// - CGNAT (100.64.0.0/10)
/// - IPv6 loopback and unspecified
/// - Internal hostnames (localhost, *.internal, *.local)
pub fn validate_host_not_internal(host: &str) -> Result<(), FederationError> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        if is_internal_ip(&ip) {
            return Err(FederationError::RejectedUrl(format!(
                "Host {host} is a private/internal address"
            )));
        }
    }

    let lower = host.to_ascii_lowercase();
    if lower == "localhost"
        || lower == "metadata.google.internal"
        || lower.ends_with(".internal")
        || lower.ends_with(".local")
    {
        return Err(FederationError::RejectedUrl(format!(
            "Host {host} is a restricted internal hostname"
        )));
    }

    Ok(())
}

fn is_internal_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64) // 100.64.0.0/10 (CGNAT)
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}

/// Sanitize a remote-supplied filename for local storage.
///
/// Strips path separators, traversal sequences (including URL-encoded
/// forms), null bytes, and characters outside a conservative safe set;
/// caps the length while preserving the extension. Never returns an empty
/// string, `.`, or `..`.
#[must_use]
pub fn sanitize_file_name(name: &str) -> String {
    // Decode the URL-encoded traversal forms first so "%2e%2e%2f" cannot
    // survive as a literal sequence.
    let decoded = name
        .replace("%2e", ".")
        .replace("%2E", ".")
        .replace("%2f", "/")
        .replace("%2F", "/")
        .replace("%5c", "\\")
        .replace("%5C", "\\");

    let cleaned: String = decoded
        .chars()
        .filter(|c| *c != '\0')
        .map(|c| match c {
            '/' | '\\' => '_',
            c if c.is_ascii_alphanumeric() => c,
            '.' | '-' | '_' => c,
            _ => '_',
        })
        .collect();

    // Collapse traversal sequences left after separator replacement.
    let mut collapsed = cleaned;
    while collapsed.contains("..") {
        collapsed = collapsed.replace("..", "_");
    }

    let trimmed = collapsed.trim_matches(|c| c == '.' || c == '_');

    let mut result = if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed.to_string()
    };

    if result.len() > MAX_FILENAME_LEN {
        // Keep the extension when truncating.
        let ext = result
            .rsplit_once('.')
            .map(|(_, e)| e.to_string())
            .filter(|e| !e.is_empty() && e.len() <= 10);
        match ext {
            Some(ext) => {
                let stem_len = MAX_FILENAME_LEN - ext.len() - 1;
                let stem: String = result.chars().take(stem_len).collect();
                result = format!("{stem}.{ext}");
            }
            None => {
                result = result.chars().take(MAX_FILENAME_LEN).collect();
            }
        }
    }

    result
}

/// Heuristic check for signed storage URLs.
///
/// Signed URLs expire and must be downloaded and rehosted; plain URLs can
/// be referenced directly. Matches common signature/token query parameters
/// and known signed-storage hostnames. Best-effort: a signed URL using an
/// unrecognized parameter name is treated as directly referenceable.
#[must_use]
pub fn is_signed_url(url: &str) -> bool {
    let Ok(parsed) = url::Url::parse(url) else {
        return false;
    };

    const SIGNED_PARAMS: &[&str] = &[
        "signature",
        "sig",
        "token",
        "x-amz-signature",
        "x-amz-credential",
        "x-goog-signature",
        "se", // Azure SAS expiry
        "expires",
    ];

    for (key, _) in parsed.query_pairs() {
        let key = key.to_ascii_lowercase();
        if SIGNED_PARAMS.contains(&key.as_str()) {
            return true;
        }
    }

    if let Some(host) = parsed.host_str() {
        let lower = host.to_ascii_lowercase();
        if lower.ends_with(".amazonaws.com")
            || lower.ends_with(".blob.core.windows.net")
            || lower.ends_with(".storage.googleapis.com")
            || lower == "storage.googleapis.com"
        {
            return true;
        }
    }

    false
}
