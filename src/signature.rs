//! OAuth 1.0 HMAC-SHA1 request signing.
//!
//! The base string is `METHOD&enc(url)&enc(k1=v1&k2=v2...)` where every key
//! and value is percent-encoded with the RFC 3986 unreserved set (`-._~`
//! pass through) before sorting. The signing key is
//! `enc(consumer_secret)&enc(token_secret)`, with an empty second segment
//! during the request-token phase.

use std::collections::BTreeMap;
use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::nonce::{NonceSource, SystemNonce};
use crate::{Method, OAuthError};

type HmacSha1 = Hmac<Sha1>;

pub const SIGNATURE_METHOD: &str = "HMAC-SHA1";
pub const OAUTH_VERSION: &str = "1.0";

/// RFC 3986 percent-encoding as required by OAuth 1.0.
pub fn percent_encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Assembles the signature base string from already-encoded parameters.
pub fn base_string(method: Method, url: &str, encoded: &BTreeMap<String, String>) -> String {
    let params = encoded
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&");
    format!(
        "{}&{}&{}",
        method.as_str(),
        percent_encode(url),
        percent_encode(&params)
    )
}

pub fn signing_key(consumer_secret: &str, token_secret: Option<&str>) -> String {
    format!(
        "{}&{}",
        percent_encode(consumer_secret),
        percent_encode(token_secret.unwrap_or_default())
    )
}

/// `base64(HMAC-SHA1(key, base))`, not yet percent-encoded.
pub fn hmac_sha1_base64(key: &str, base: &str) -> Result<String, OAuthError> {
    let mut mac = HmacSha1::new_from_slice(key.as_bytes())
        .map_err(|err| OAuthError::Signing(err.to_string()))?;
    mac.update(base.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Output of [`Signer::sign`]. Keys and values are percent-encoded and the
/// map includes `oauth_signature`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedParams {
    pub params: BTreeMap<String, String>,
    pub signature: String,
    pub base_string: String,
}

#[derive(Debug, Clone)]
pub struct Signer {
    consumer_key: String,
    consumer_secret: String,
    nonce: Arc<dyn NonceSource>,
}

impl Signer {
    pub fn new(consumer_key: impl Into<String>, consumer_secret: impl Into<String>) -> Self {
        Self::with_nonce_source(consumer_key, consumer_secret, Arc::new(SystemNonce))
    }

    pub fn with_nonce_source(
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
        nonce: Arc<dyn NonceSource>,
    ) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
            nonce,
        }
    }

    pub fn consumer_key(&self) -> &str {
        &self.consumer_key
    }

    /// Signs `params` on top of the default protocol parameters. Caller
    /// parameters override the defaults on key collision.
    pub fn sign(
        &self,
        method: Method,
        url: &str,
        params: &[(String, String)],
        token_secret: Option<&str>,
    ) -> Result<SignedParams, OAuthError> {
        let mut raw: BTreeMap<String, String> = BTreeMap::new();
        raw.insert("oauth_version".into(), OAUTH_VERSION.into());
        raw.insert("oauth_nonce".into(), self.nonce.nonce()?);
        raw.insert(
            "oauth_timestamp".into(),
            self.nonce.timestamp().to_string(),
        );
        raw.insert("oauth_consumer_key".into(), self.consumer_key.clone());
        raw.insert("oauth_signature_method".into(), SIGNATURE_METHOD.into());
        for (key, value) in params {
            raw.insert(key.clone(), value.clone());
        }

        let mut encoded: BTreeMap<String, String> = raw
            .iter()
            .map(|(key, value)| (percent_encode(key), percent_encode(value)))
            .collect();

        let base_string = base_string(method, url, &encoded);
        let key = signing_key(&self.consumer_secret, token_secret);
        let signature = percent_encode(&hmac_sha1_base64(&key, &base_string)?);
        encoded.insert("oauth_signature".into(), signature.clone());

        Ok(SignedParams {
            params: encoded,
            signature,
            base_string,
        })
    }

    /// Renders an `Authorization: OAuth ...` header value.
    ///
    /// `protocol` parameters end up in the header; `request` parameters
    /// (query string or form body) are signed but left out of it.
    pub fn authorization_header(
        &self,
        method: Method,
        url: &str,
        protocol: &[(String, String)],
        request: &[(String, String)],
        token_secret: Option<&str>,
    ) -> Result<String, OAuthError> {
        let mut params = request.to_vec();
        params.extend(protocol.iter().cloned());
        let signed = self.sign(method, url, &params, token_secret)?;

        let header = signed
            .params
            .iter()
            .filter(|(key, _)| {
                key.starts_with("oauth_")
                    && (!request.iter().any(|(name, _)| &percent_encode(name) == *key)
                        || protocol.iter().any(|(name, _)| &percent_encode(name) == *key))
            })
            .map(|(key, value)| format!("{key}=\"{value}\""))
            .collect::<Vec<_>>()
            .join(", ");
        Ok(format!("OAuth {header}"))
    }
}
