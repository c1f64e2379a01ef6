//! TOML configuration.
//!
//! ```toml
//! [route]
//! ok_redirect = "/welcome"
//! fail_redirect = "/login?failed"
//!
//! [server]
//! bind = "127.0.0.1:8080"
//! public_url = "http://localhost:8080"
//!
//! [[service]]
//! type = "20"
//! name = "github"
//! consumer_key = "client-id"
//! consumer_secret = "client-secret"
//! ```
//!
//! URLs and scope may be omitted for built-in providers. A service without
//! `callback_url` gets `<public_url>/byway/oauth/<type>/<name>/callback`.

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::http::HttpClient;
use crate::providers::ProviderSet;
use crate::registry::{ServiceConfig, ServiceRegistry};
use crate::route::RouteConfig;
use crate::{OAuthError, ServiceType};

const DEFAULT_BIND: &str = "127.0.0.1:8080";

/// Path prefix of the auth and callback endpoints.
pub const ROUTE_PREFIX: &str = "/byway/oauth";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub route: RouteConfig,
    pub server: ServerConfig,
    #[serde(rename = "service")]
    pub services: Vec<ServiceEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Externally visible origin, used to derive callback URLs.
    pub public_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            public_url: None,
        }
    }
}

/// One `[[service]]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServiceEntry {
    #[serde(rename = "type")]
    pub service_type: ServiceType,
    pub name: String,
    pub consumer_key: String,
    pub consumer_secret: String,
    #[serde(default)]
    pub request_token_url: Option<String>,
    #[serde(default)]
    pub authorize_url: Option<String>,
    #[serde(default)]
    pub access_token_url: Option<String>,
    #[serde(default)]
    pub callback_url: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl ServiceEntry {
    /// Resolves the entry against the preset of the same name, if any.
    pub fn service_config(&self, providers: &ProviderSet, public_url: Option<&str>) -> ServiceConfig {
        let mut config = match providers.get(self.service_type, &self.name) {
            Some(provider) => provider.service_config(&self.consumer_key, &self.consumer_secret),
            None => ServiceConfig {
                service_type: self.service_type,
                service_name: self.name.clone(),
                consumer_key: self.consumer_key.clone(),
                consumer_secret: self.consumer_secret.clone(),
                request_token_url: None,
                authorize_url: String::new(),
                access_token_url: String::new(),
                callback_url: None,
                scope: None,
            },
        };
        if let Some(url) = &self.request_token_url {
            config.request_token_url = Some(url.clone());
        }
        if let Some(url) = &self.authorize_url {
            config.authorize_url = url.clone();
        }
        if let Some(url) = &self.access_token_url {
            config.access_token_url = url.clone();
        }
        if let Some(scope) = &self.scope {
            config.scope = Some(scope.clone());
        }
        config.callback_url = self.callback_url.clone().or_else(|| {
            public_url.map(|origin| {
                format!(
                    "{}{ROUTE_PREFIX}/{}/{}/callback",
                    origin.trim_end_matches('/'),
                    self.service_type,
                    self.name
                )
            })
        });
        config
    }
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, OAuthError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        tracing::debug!(path = %path.display(), "loading configuration");
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, OAuthError> {
        toml::from_str(contents).map_err(|err| OAuthError::Config(err.to_string()))
    }

    /// Registers every `[[service]]`. Presets from `providers` fill in
    /// missing endpoints and also become the registry's finetune hook.
    pub fn build_registry(
        &self,
        http: Arc<dyn HttpClient>,
        providers: &ProviderSet,
    ) -> Result<ServiceRegistry, OAuthError> {
        let mut registry = ServiceRegistry::new(http).with_finetune(Arc::new(providers.clone()));
        let public_url = self.server.public_url.as_deref();
        for entry in &self.services {
            let config = entry.service_config(providers, public_url);
            if !registry.add_service(config)? {
                tracing::warn!(
                    service_type = %entry.service_type,
                    service_name = %entry.name,
                    "duplicate service ignored"
                );
            }
        }
        Ok(registry)
    }
}
