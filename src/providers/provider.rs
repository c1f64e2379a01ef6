use async_trait::async_trait;

use crate::permission::{Action, Permission};
use crate::registry::ServiceConfig;
use crate::{OAuthError, Profile, ServiceType};

/// Endpoints and quirks of a well-known provider.
#[async_trait]
pub trait Provider: Send + Sync {
    fn id(&self) -> &'static str;
    fn service_type(&self) -> ServiceType;
    fn authorize_url(&self) -> &'static str;
    fn access_token_url(&self) -> &'static str;

    /// OAuth 1.0 only.
    fn request_token_url(&self) -> Option<&'static str> {
        None
    }

    fn default_scope(&self) -> Option<&'static str> {
        None
    }

    /// Extra authorize URL parameters (OAuth 2.0).
    fn authorize_params(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Whether the code exchange needs HTTP Basic client credentials.
    fn basic_auth(&self) -> bool {
        false
    }

    async fn fetch_profile(&self, action: &Action) -> Result<Option<Profile>, OAuthError>;

    /// Registration with the preset endpoints and scope filled in.
    fn service_config(&self, consumer_key: &str, consumer_secret: &str) -> ServiceConfig {
        let config = match self.service_type() {
            ServiceType::OAuth10 => ServiceConfig::oauth10(
                self.id(),
                consumer_key,
                consumer_secret,
                self.request_token_url().unwrap_or_default(),
                self.authorize_url(),
                self.access_token_url(),
            ),
            ServiceType::OAuth20 => ServiceConfig::oauth20(
                self.id(),
                consumer_key,
                consumer_secret,
                self.authorize_url(),
                self.access_token_url(),
            ),
        };
        match self.default_scope() {
            Some(scope) => config.with_scope(scope),
            None => config,
        }
    }

    fn finetune(&self, permission: &mut Permission) {
        let Some(oauth20) = permission.as_oauth20_mut() else {
            return;
        };
        if self.basic_auth() {
            oauth20.basic_auth = true;
        }
        for (key, value) in self.authorize_params() {
            oauth20.set_authorize_param(key, value);
        }
    }
}
