use std::fmt::Debug;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{TryRngCore, rngs::OsRng};

use crate::OAuthError;

const NONCE_BYTES: usize = 24;
const SESSION_TOKEN_BYTES: usize = 32;

/// Source of per-request nonces and timestamps.
///
/// [`SystemNonce`] is used in production; [`FixedNonce`] makes signatures
/// reproducible.
pub trait NonceSource: Send + Sync + Debug {
    fn nonce(&self) -> Result<String, OAuthError>;
    fn timestamp(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemNonce;

impl NonceSource for SystemNonce {
    fn nonce(&self) -> Result<String, OAuthError> {
        generate_nonce()
    }

    fn timestamp(&self) -> u64 {
        unix_now()
    }
}

#[derive(Debug, Clone)]
pub struct FixedNonce {
    nonce: String,
    timestamp: u64,
}

impl FixedNonce {
    pub fn new(nonce: impl Into<String>, timestamp: u64) -> Self {
        Self {
            nonce: nonce.into(),
            timestamp,
        }
    }
}

impl NonceSource for FixedNonce {
    fn nonce(&self) -> Result<String, OAuthError> {
        Ok(self.nonce.clone())
    }

    fn timestamp(&self) -> u64 {
        self.timestamp
    }
}

/// Fresh URL-safe random value, used for `oauth_nonce` and OAuth2 `state`.
pub fn generate_nonce() -> Result<String, OAuthError> {
    random_token(NONCE_BYTES)
}

pub(crate) fn generate_session_token() -> Result<String, OAuthError> {
    random_token(SESSION_TOKEN_BYTES)
}

fn random_token(len: usize) -> Result<String, OAuthError> {
    let mut bytes = vec![0u8; len];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|err| OAuthError::OsRng {
            message: err.to_string(),
        })?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::{NonceSource, SystemNonce, generate_nonce};

    #[test]
    fn nonces_are_url_safe_and_fresh() {
        let first = generate_nonce().unwrap();
        let second = generate_nonce().unwrap();
        assert_ne!(first, second);
        for value in [&first, &second] {
            assert!(!value.contains('='), "nonce should be unpadded");
            assert!(!value.contains('+'), "nonce should be url safe");
            assert!(!value.contains('/'), "nonce should be url safe");
        }
    }

    #[test]
    fn system_timestamp_is_wall_clock_seconds() {
        // 2020-01-01T00:00:00Z
        assert!(SystemNonce.timestamp() > 1_577_836_800);
    }
}
