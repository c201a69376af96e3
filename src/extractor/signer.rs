//! HMAC-SHA1 signed manifest URLs with an expiration window.
//!
//! The token layout is `flags ∥ expiration ∥ digest ∥ hex(secret)`:
//! - `flags`: `10` when the query string is declared covered, else `00`
//! - `expiration`: lower-case hex Unix timestamp
//! - `digest`: hex HMAC-SHA1 keyed by the signing key over
//!   `unhex(flags ∥ expiration ∥ hex(relative_path))`

use std::time::{SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use thiserror::Error;

type HmacSha1 = Hmac<Sha1>;

/// Default prefix under which signed paths are computed.
pub const DEFAULT_SIGNING_PREFIX: &str = "http://link.theplatform.com/s/";

/// Default token lifetime in seconds.
pub const DEFAULT_LIFETIME_SECS: u64 = 600;

/// Credentials used to sign manifest URLs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningKey {
    /// HMAC key.
    pub key: String,
    /// Secret appended (hex-encoded) to the token.
    pub secret: String,
}

impl SigningKey {
    /// Creates a signing key pair.
    #[must_use]
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            secret: secret.into(),
        }
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("key", &"<redacted>")
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Errors that can occur while signing.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignError {
    /// The URL does not live under the signer's prefix.
    #[error("cannot sign '{url}': not under '{prefix}'")]
    OutsidePrefix {
        /// URL that was passed in.
        url: String,
        /// Expected prefix.
        prefix: String,
    },

    /// The assembled clear text was not valid hex.
    #[error("cannot sign '{url}': {reason}")]
    ClearText {
        /// URL that was passed in.
        url: String,
        /// Decoder message.
        reason: String,
    },
}

/// Deterministic signed-URL construction.
#[derive(Debug, Clone)]
pub struct UrlSigner {
    prefix: String,
}

impl Default for UrlSigner {
    fn default() -> Self {
        Self::new(DEFAULT_SIGNING_PREFIX)
    }
}

impl UrlSigner {
    /// Creates a signer for URLs under `prefix` (e.g. `http://link.example.com/s/`).
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Signs `url` with an expiration of now + `lifetime_secs`.
    ///
    /// # Errors
    ///
    /// See [`UrlSigner::sign_at`].
    pub fn sign(
        &self,
        url: &str,
        key: &SigningKey,
        lifetime_secs: u64,
        include_query_string: bool,
    ) -> Result<String, SignError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs());
        self.sign_at(url, key, lifetime_secs, include_query_string, now)
    }

    /// Signs `url` as of the Unix time `now`. Pure and bit-reproducible.
    ///
    /// The relative path excludes the query string even when
    /// `include_query_string` is set; the flag only changes the token's flags
    /// field.
    ///
    /// # Errors
    ///
    /// Returns [`SignError::OutsidePrefix`] when `url` does not start with the
    /// prefix, or [`SignError::ClearText`] when the expiration renders to an
    /// odd number of hex digits.
    pub fn sign_at(
        &self,
        url: &str,
        key: &SigningKey,
        lifetime_secs: u64,
        include_query_string: bool,
        now: u64,
    ) -> Result<String, SignError> {
        let relative_path = url
            .strip_prefix(self.prefix.as_str())
            .map(|rest| rest.split('?').next().unwrap_or_default())
            .ok_or_else(|| SignError::OutsidePrefix {
                url: url.to_string(),
                prefix: self.prefix.clone(),
            })?;

        let flags = if include_query_string { "10" } else { "00" };
        let expiration = format!("{:x}", now.saturating_add(lifetime_secs));

        let clear_text = hex::decode(format!(
            "{flags}{expiration}{}",
            hex::encode(relative_path.as_bytes())
        ))
        .map_err(|e| SignError::ClearText {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let mut mac = HmacSha1::new_from_slice(key.key.as_bytes()).map_err(|e| {
            SignError::ClearText {
                url: url.to_string(),
                reason: e.to_string(),
            }
        })?;
        mac.update(&clear_text);
        let checksum = hex::encode(mac.finalize().into_bytes());

        let token = format!(
            "{flags}{expiration}{checksum}{}",
            hex::encode(key.secret.as_bytes())
        );
        Ok(format!("{url}&sig={token}"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const URL: &str =
        "http://link.theplatform.com/s/dJ5BDC/e9I_cZgTgIPd/meta.smil?format=smil&mbr=true";
    const NOW: u64 = 1_700_000_000;

    fn key(secret: &str) -> SigningKey {
        SigningKey::new("sig-key", secret)
    }

    #[test]
    fn test_sign_is_deterministic() {
        let signer = UrlSigner::default();
        let a = signer.sign_at(URL, &key("s3cret"), 600, false, NOW).unwrap();
        let b = signer.sign_at(URL, &key("s3cret"), 600, false, NOW).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_token_layout() {
        let signed = UrlSigner::default()
            .sign_at(URL, &key("ab"), 600, false, NOW)
            .unwrap();
        let token = signed.strip_prefix(&format!("{URL}&sig=")).unwrap();
        let expiration = format!("{:x}", NOW + 600);
        assert!(token.starts_with(&format!("00{expiration}")));
        // flags(2) + expiration(8) + sha1 digest(40) + hex("ab")(4)
        assert_eq!(token.len(), 2 + 8 + 40 + 4);
        assert!(token.ends_with("6162"));
    }

    #[test]
    fn test_digest_matches_reference_hmac() {
        let signed = UrlSigner::default()
            .sign_at(URL, &key("x"), 0, false, NOW)
            .unwrap();
        let relative = "dJ5BDC/e9I_cZgTgIPd/meta.smil";
        let mut clear = hex::decode(format!("00{NOW:x}")).unwrap();
        clear.extend_from_slice(relative.as_bytes());
        let mut mac = HmacSha1::new_from_slice(b"sig-key").unwrap();
        mac.update(&clear);
        let digest = hex::encode(mac.finalize().into_bytes());
        assert!(signed.contains(&digest));
    }

    #[test]
    fn test_secret_changes_only_trailing_segment() {
        let signer = UrlSigner::default();
        let a = signer.sign_at(URL, &key("one"), 600, false, NOW).unwrap();
        let b = signer.sign_at(URL, &key("two"), 600, false, NOW).unwrap();
        assert_ne!(a, b);
        let prefix_len = a.len() - hex::encode("one").len();
        assert_eq!(a[..prefix_len], b[..prefix_len]);
    }

    #[test]
    fn test_include_query_string_sets_flags() {
        let signed = UrlSigner::default()
            .sign_at(URL, &key("s"), 600, true, NOW)
            .unwrap();
        assert!(signed.contains("&sig=10"));
    }

    #[test]
    fn test_outside_prefix_is_rejected() {
        let err = UrlSigner::default()
            .sign_at("http://elsewhere.example.com/s/a", &key("s"), 600, false, NOW)
            .unwrap_err();
        assert!(matches!(err, SignError::OutsidePrefix { .. }));
    }

    #[test]
    fn test_signing_key_debug_is_redacted() {
        let text = format!("{:?}", key("topsecret"));
        assert!(!text.contains("topsecret"));
    }
}
