// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! User-facing API tokens: HMAC-signed bearer tokens with an expiry.
//!
//! Token format is `user:expiry_epoch:mac` where the MAC covers the first two
//! fields. The signing secret lives in the secrets file; runtimes use shared
//! callback secrets instead (see the ingestor).

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn unhex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len()).step_by(2).map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok()).collect()
}

pub struct UserTokens {
    secret: Vec<u8>,
}

impl UserTokens {
    pub fn new(secret: impl Into<String>) -> Self {
        Self { secret: secret.into().into_bytes() }
    }

    fn mac(&self, user: &str, expires: i64) -> Option<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.secret).ok()?;
        mac.update(user.as_bytes());
        mac.update(b":");
        mac.update(expires.to_string().as_bytes());
        Some(mac)
    }

    /// Issue a token for `user` valid until `expires`.
    pub fn issue(&self, user: &str, expires: DateTime<Utc>) -> String {
        let ts = expires.timestamp();
        let digest = match self.mac(user, ts) {
            Some(mac) => hex(&mac.finalize().into_bytes()),
            None => String::new(),
        };
        format!("{user}:{ts}:{digest}")
    }

    /// Verify a presented token; returns the user name while the token is
    /// valid and untampered.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Option<String> {
        let (rest, digest) = token.rsplit_once(':')?;
        let (user, ts) = rest.rsplit_once(':')?;
        let expires: i64 = ts.parse().ok()?;
        if now.timestamp() > expires {
            return None;
        }
        let mac = self.mac(user, expires)?;
        mac.verify_slice(&unhex(digest)?).ok()?;
        Some(user.to_string())
    }
}

/// Strip an auth scheme prefix from an `Authorization` header value.
pub fn strip_scheme(value: &str) -> &str {
    for scheme in ["Bearer ", "Token "] {
        if let Some(rest) = value.strip_prefix(scheme) {
            return rest.trim();
        }
    }
    value.trim()
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
