//! Shared Key Lite request signing for the Azure Storage REST services.
//!
//! Table requests sign `date \n canonical_resource`; Blob requests sign the
//! verb, content headers, the `x-ms-*` headers and the canonical resource.

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

pub const SCHEME: &str = "SharedKeyLite";

/// Format a timestamp the way `x-ms-date` expects it (RFC 1123, GMT).
pub fn format_ms_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

pub fn sign(account_key: &str, string_to_sign: &str) -> Result<String, String> {
    let key = STANDARD
        .decode(account_key)
        .map_err(|e| format!("Invalid account key encoding: {}", e))?;

    let mut mac = match HmacSha256::new_from_slice(&key) {
        Ok(m) => m,
        Err(_) => return Err("Failed to create HMAC".to_string()),
    };
    mac.update(string_to_sign.as_bytes());

    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// `Authorization` header value for a Table service request.
pub fn table_authorization(
    account: &str,
    account_key: &str,
    ms_date: &str,
    canonical_resource: &str,
) -> Result<String, String> {
    let string_to_sign = format!("{}\n{}", ms_date, canonical_resource);
    debug!("Signing table request for {}", canonical_resource);
    let signature = sign(account_key, &string_to_sign)?;
    Ok(format!("{} {}:{}", SCHEME, account, signature))
}

/// `Authorization` header value for a Blob service request.
///
/// `ms_headers` must contain every `x-ms-*` header sent with the request.
pub fn blob_authorization(
    account: &str,
    account_key: &str,
    verb: &str,
    content_type: &str,
    ms_headers: &[(&str, &str)],
    canonical_resource: &str,
) -> Result<String, String> {
    let string_to_sign = format!(
        "{}\n\n{}\n\n{}{}",
        verb,
        content_type,
        canonicalized_headers(ms_headers),
        canonical_resource
    );
    debug!("Signing blob request for {}", canonical_resource);
    let signature = sign(account_key, &string_to_sign)?;
    Ok(format!("{} {}:{}", SCHEME, account, signature))
}

fn canonicalized_headers(headers: &[(&str, &str)]) -> String {
    let mut normalized: Vec<(String, &str)> = headers
        .iter()
        .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim()))
        .filter(|(name, _)| name.starts_with("x-ms-"))
        .collect();
    normalized.sort_by(|a, b| a.0.cmp(&b.0));

    normalized
        .into_iter()
        .map(|(name, value)| format!("{}:{}\n", name, value))
        .collect()
}
