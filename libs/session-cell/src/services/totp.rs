//! RFC 6238 time-based one-time passwords (HMAC-SHA1, 30 second step).

use chrono::Utc;
use data_encoding::BASE32_NOPAD;
use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::error::SessionError;

type HmacSha1 = Hmac<Sha1>;

pub const TIME_STEP_SECS: u64 = 30;
pub const DIGITS: u32 = 6;

fn decode_secret(secret: &str) -> Result<Vec<u8>, SessionError> {
    let normalized: String = secret
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '=')
        .map(|c| c.to_ascii_uppercase())
        .collect();

    BASE32_NOPAD
        .decode(normalized.as_bytes())
        .map_err(|e| SessionError::InvalidSecret(e.to_string()))
}

/// Code for `unix_time` (seconds) from a base32 secret.
pub fn generate(secret: &str, unix_time: u64) -> Result<String, SessionError> {
    let key = decode_secret(secret)?;
    let counter = unix_time / TIME_STEP_SECS;

    let mut mac = HmacSha1::new_from_slice(&key)
        .map_err(|e| SessionError::InvalidSecret(e.to_string()))?;
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let binary = (u32::from(digest[offset] & 0x7f) << 24)
        | (u32::from(digest[offset + 1]) << 16)
        | (u32::from(digest[offset + 2]) << 8)
        | u32::from(digest[offset + 3]);

    let code = binary % 10u32.pow(DIGITS);
    Ok(format!("{:0width$}", code, width = DIGITS as usize))
}

pub fn current(secret: &str) -> Result<String, SessionError> {
    let now = Utc::now().timestamp().max(0) as u64;
    generate(secret, now)
}
