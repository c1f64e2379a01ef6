use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::OAuthError;

/// Protocol version of a registered service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ServiceType {
    OAuth10,
    OAuth20,
}

impl ServiceType {
    /// Path segment form, `"10"` or `"20"`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OAuth10 => "10",
            Self::OAuth20 => "20",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceType {
    type Err = OAuthError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "10" | "1.0" => Ok(Self::OAuth10),
            "20" | "2.0" => Ok(Self::OAuth20),
            other => Err(OAuthError::InvalidServiceType(other.to_string())),
        }
    }
}

impl TryFrom<String> for ServiceType {
    type Error = OAuthError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ServiceType> for String {
    fn from(value: ServiceType) -> Self {
        value.as_str().to_string()
    }
}

/// Registry key of a service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceKey {
    pub service_type: ServiceType,
    pub service_name: String,
}

impl ServiceKey {
    pub fn new(service_type: ServiceType, service_name: impl Into<String>) -> Self {
        Self {
            service_type,
            service_name: service_name.into(),
        }
    }

    /// The `oauth<type>[<name>]` form used to tag provisioned accounts.
    pub fn uservice(&self) -> String {
        format!("oauth{}[{}]", self.service_type, self.service_name)
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.service_type, self.service_name)
    }
}

/// Query parameters a provider appends to the callback URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pairs: Vec<(String, String)>,
}

impl CallbackParams {
    pub fn new(pairs: Vec<(String, String)>) -> Self {
        Self { pairs }
    }

    /// Parses a raw query string, without the leading `?`.
    pub fn from_query(query: &str) -> Self {
        let pairs = url::form_urlencoded::parse(query.trim_start_matches('?').as_bytes())
            .into_owned()
            .collect();
        Self { pairs }
    }

    pub fn from_url(callback_url: &str) -> Result<Self, OAuthError> {
        let url = Url::parse(callback_url)?;
        Ok(Self {
            pairs: url.query_pairs().into_owned().collect(),
        })
    }

    /// First non-empty value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(name, value)| name == key && !value.is_empty())
            .map(|(_, value)| value.as_str())
    }

    pub(crate) fn require(&self, key: &str) -> Result<&str, OAuthError> {
        self.get(key).ok_or_else(|| OAuthError::incomplete(key))
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }
}

/// Credentials obtained from a successful handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBundle {
    pub service_type: ServiceType,
    pub service_name: String,
    pub access_token: String,
    /// OAuth 1.0 only.
    pub access_token_secret: Option<String>,
    /// OAuth 2.0 only, and not issued by every provider.
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl TokenBundle {
    pub fn key(&self) -> ServiceKey {
        ServiceKey::new(self.service_type, self.service_name.clone())
    }
}

/// User profile returned by a [`ProfileFetcher`](crate::ProfileFetcher).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub uname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
}

impl Profile {
    pub fn new(uname: impl Into<String>) -> Self {
        Self {
            uname: uname.into(),
            ..Self::default()
        }
    }

    /// Builds a profile from a provider JSON object, reading `uname_key` as
    /// the username and `(provider_key, field)` pairs for the optional bio
    /// fields. Non-string and empty values are skipped.
    pub fn from_json(
        data: &serde_json::Value,
        uname_key: &str,
        fields: &[(&str, &str)],
    ) -> Option<Self> {
        let uname = json_string(data, uname_key)?;
        let mut profile = Self::new(uname);
        for (provider_key, field) in fields {
            let Some(value) = json_string(data, provider_key) else {
                continue;
            };
            match *field {
                "fname" => profile.fname = Some(value),
                "email" => profile.email = Some(value),
                "site" => profile.site = Some(value),
                _ => {}
            }
        }
        Some(profile)
    }
}

/// Reads a string or number field as text.
pub(crate) fn json_string(data: &serde_json::Value, key: &str) -> Option<String> {
    match data.get(key)? {
        serde_json::Value::String(value) if !value.is_empty() => Some(value.clone()),
        serde_json::Value::Number(value) => Some(value.to_string()),
        _ => None,
    }
}
