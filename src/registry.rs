//! Service registry.
//!
//! Populated once at startup, then only read. Each lookup builds a fresh
//! [`Permission`] or [`Action`] bound to the registry's transport.

use std::collections::HashMap;
use std::sync::Arc;

use crate::http::HttpClient;
use crate::nonce::{NonceSource, SystemNonce};
use crate::oauth10::{OAuth10Action, OAuth10Permission};
use crate::oauth20::{OAuth20Action, OAuth20Permission};
use crate::permission::{Action, Permission};
use crate::signature::Signer;
use crate::{OAuthError, ServiceKey, ServiceType, TokenBundle};

/// Static configuration of one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub service_type: ServiceType,
    pub service_name: String,
    /// Consumer key for 1.0, client id for 2.0.
    pub consumer_key: String,
    pub consumer_secret: String,
    pub request_token_url: Option<String>,
    pub authorize_url: String,
    pub access_token_url: String,
    pub callback_url: Option<String>,
    pub scope: Option<String>,
}

impl ServiceConfig {
    /// Generic constructor. `service_type` accepts `"10"`, `"1.0"`, `"20"`
    /// and `"2.0"`.
    pub fn new(
        service_type: &str,
        service_name: impl Into<String>,
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
    ) -> Result<Self, OAuthError> {
        let service_type = service_type.parse()?;
        Ok(Self {
            service_type,
            service_name: service_name.into(),
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
            request_token_url: None,
            authorize_url: String::new(),
            access_token_url: String::new(),
            callback_url: None,
            scope: None,
        })
    }

    pub fn oauth10(
        service_name: impl Into<String>,
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
        request_token_url: impl Into<String>,
        authorize_url: impl Into<String>,
        access_token_url: impl Into<String>,
    ) -> Self {
        Self {
            service_type: ServiceType::OAuth10,
            service_name: service_name.into(),
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
            request_token_url: Some(request_token_url.into()),
            authorize_url: authorize_url.into(),
            access_token_url: access_token_url.into(),
            callback_url: None,
            scope: None,
        }
    }

    pub fn oauth20(
        service_name: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        authorize_url: impl Into<String>,
        access_token_url: impl Into<String>,
    ) -> Self {
        Self {
            service_type: ServiceType::OAuth20,
            service_name: service_name.into(),
            consumer_key: client_id.into(),
            consumer_secret: client_secret.into(),
            request_token_url: None,
            authorize_url: authorize_url.into(),
            access_token_url: access_token_url.into(),
            callback_url: None,
            scope: None,
        }
    }

    pub fn with_request_token_url(mut self, url: impl Into<String>) -> Self {
        self.request_token_url = Some(url.into());
        self
    }

    pub fn with_authorize_url(mut self, url: impl Into<String>) -> Self {
        self.authorize_url = url.into();
        self
    }

    pub fn with_access_token_url(mut self, url: impl Into<String>) -> Self {
        self.access_token_url = url.into();
        self
    }

    pub fn with_callback_url(mut self, url: impl Into<String>) -> Self {
        self.callback_url = Some(url.into());
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn key(&self) -> ServiceKey {
        ServiceKey::new(self.service_type, self.service_name.clone())
    }

    fn validate(&self) -> Result<(), OAuthError> {
        if self.service_name.is_empty() {
            return Err(OAuthError::Config("service name is empty".to_string()));
        }
        if self.authorize_url.is_empty() || self.access_token_url.is_empty() {
            return Err(OAuthError::Config(format!(
                "{}: authorize and access token urls are required",
                self.key()
            )));
        }
        if self.service_type == ServiceType::OAuth10
            && self.request_token_url.as_deref().is_none_or(str::is_empty)
        {
            return Err(OAuthError::Config(format!(
                "{}: request token url is required for oauth 1.0",
                self.key()
            )));
        }
        Ok(())
    }
}

/// Per-request view handed to [`Finetune`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub key: ServiceKey,
    /// Query parameters of the incoming request.
    pub query: Vec<(String, String)>,
}

impl RequestContext {
    pub fn new(key: ServiceKey) -> Self {
        Self {
            key,
            query: Vec::new(),
        }
    }

    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }
}

/// Hook for adjusting a freshly built permission before use, e.g. enabling
/// Basic auth or adding authorize URL parameters for one provider.
pub trait Finetune: Send + Sync {
    fn finetune(&self, context: &RequestContext, permission: &mut Permission);
}

pub struct ServiceRegistry {
    services: HashMap<ServiceKey, ServiceConfig>,
    http: Arc<dyn HttpClient>,
    nonce: Arc<dyn NonceSource>,
    finetune: Option<Arc<dyn Finetune>>,
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.services.keys().collect::<Vec<_>>())
            .field("nonce", &self.nonce)
            .field("finetune", &self.finetune.is_some())
            .finish_non_exhaustive()
    }
}

impl ServiceRegistry {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self {
            services: HashMap::new(),
            http,
            nonce: Arc::new(SystemNonce),
            finetune: None,
        }
    }

    pub fn with_nonce_source(mut self, nonce: Arc<dyn NonceSource>) -> Self {
        self.nonce = nonce;
        self
    }

    pub fn with_finetune(mut self, finetune: Arc<dyn Finetune>) -> Self {
        self.finetune = Some(finetune);
        self
    }

    /// Registers a service. Returns `Ok(false)` without overwriting when
    /// the `(type, name)` key is already taken.
    pub fn add_service(&mut self, config: ServiceConfig) -> Result<bool, OAuthError> {
        config.validate()?;
        let key = config.key();
        if self.services.contains_key(&key) {
            tracing::debug!(service = %key, "service already registered");
            return Ok(false);
        }
        tracing::debug!(service = %key, "service registered");
        self.services.insert(key, config);
        Ok(true)
    }

    pub fn service(&self, service_type: ServiceType, service_name: &str) -> Option<&ServiceConfig> {
        self.services
            .get(&ServiceKey::new(service_type, service_name))
    }

    pub fn services(&self) -> impl Iterator<Item = &ServiceConfig> {
        self.services.values()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn http_client(&self) -> Arc<dyn HttpClient> {
        self.http.clone()
    }

    fn signer(&self, config: &ServiceConfig) -> Signer {
        Signer::with_nonce_source(
            config.consumer_key.clone(),
            config.consumer_secret.clone(),
            self.nonce.clone(),
        )
    }

    pub fn permission(&self, service_type: ServiceType, service_name: &str) -> Option<Permission> {
        let config = self.service(service_type, service_name)?;
        let permission = match config.service_type {
            ServiceType::OAuth10 => Permission::OAuth10(OAuth10Permission::new(
                config.service_name.clone(),
                self.signer(config),
                config.request_token_url.clone().unwrap_or_default(),
                config.authorize_url.clone(),
                config.access_token_url.clone(),
                config.callback_url.clone(),
                self.http.clone(),
            )),
            ServiceType::OAuth20 => Permission::OAuth20(OAuth20Permission::new(
                config.service_name.clone(),
                config.consumer_key.clone(),
                config.consumer_secret.clone(),
                config.authorize_url.clone(),
                config.access_token_url.clone(),
                config.callback_url.clone(),
                config.scope.clone(),
                self.http.clone(),
            )),
        };
        Some(permission)
    }

    /// Builds an action from stored tokens. A missing OAuth 1.0 secret is
    /// treated as empty.
    pub fn action(
        &self,
        service_type: ServiceType,
        service_name: &str,
        access_token: &str,
        access_token_secret: Option<&str>,
        refresh_token: Option<&str>,
    ) -> Option<Action> {
        let config = self.service(service_type, service_name)?;
        let action = match config.service_type {
            ServiceType::OAuth10 => Action::OAuth10(OAuth10Action::new(
                self.signer(config),
                access_token,
                access_token_secret.unwrap_or_default(),
                self.http.clone(),
            )),
            ServiceType::OAuth20 => Action::OAuth20(OAuth20Action::new(
                config.service_name.clone(),
                config.consumer_key.clone(),
                config.consumer_secret.clone(),
                access_token,
                refresh_token.map(str::to_string),
                Some(config.access_token_url.clone()),
                self.http.clone(),
            )),
        };
        Some(action)
    }

    pub fn action_for_bundle(&self, bundle: &TokenBundle) -> Option<Action> {
        self.action(
            bundle.service_type,
            &bundle.service_name,
            &bundle.access_token,
            bundle.access_token_secret.as_deref(),
            bundle.refresh_token.as_deref(),
        )
    }

    /// Runs the configured [`Finetune`] hook, if any.
    pub fn finetune_permission(
        &self,
        context: &RequestContext,
        mut permission: Permission,
    ) -> Permission {
        if let Some(finetune) = &self.finetune {
            finetune.finetune(context, &mut permission);
        }
        permission
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::fixture::StubProvider;

    fn registry() -> ServiceRegistry {
        ServiceRegistry::new(Arc::new(StubProvider::default()))
    }

    fn reddit() -> ServiceConfig {
        ServiceConfig::oauth20(
            "reddit",
            "id",
            "secret",
            "http://reddit.example.org/20/auth",
            "http://reddit.example.org/20/access",
        )
        .with_scope("identity")
    }

    struct BasicAuthFor(&'static str);

    impl Finetune for BasicAuthFor {
        fn finetune(&self, context: &RequestContext, permission: &mut Permission) {
            if context.key.service_name != self.0 {
                return;
            }
            if let Some(oauth20) = permission.as_oauth20_mut() {
                oauth20.basic_auth = true;
            }
        }
    }

    #[test]
    fn duplicate_keys_are_rejected_without_overwrite() {
        let mut registry = registry();
        assert!(registry.add_service(reddit()).unwrap());
        let changed = reddit().with_scope("other");
        assert!(!registry.add_service(changed).unwrap());
        assert_eq!(
            registry.service(ServiceType::OAuth20, "reddit").unwrap().scope.as_deref(),
            Some("identity")
        );

        // same name, other protocol is a distinct key
        let oauth10 = ServiceConfig::oauth10(
            "reddit",
            "ck",
            "cs",
            "http://reddit.example.org/10/auth_request",
            "http://reddit.example.org/10/auth",
            "http://reddit.example.org/10/access",
        );
        assert!(registry.add_service(oauth10).unwrap());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn invalid_configuration_is_an_error() {
        assert!(matches!(
            ServiceConfig::new("3.0", "x", "k", "s"),
            Err(OAuthError::InvalidServiceType(_))
        ));

        let missing_request_url = ServiceConfig::new("1.0", "twitter", "k", "s")
            .unwrap()
            .with_authorize_url("http://twitter.example.org/10/auth")
            .with_access_token_url("http://twitter.example.org/10/access");
        assert!(matches!(
            registry().add_service(missing_request_url),
            Err(OAuthError::Config(_))
        ));
    }

    #[test]
    fn unknown_keys_yield_none() {
        let mut registry = registry();
        registry.add_service(reddit()).unwrap();
        assert!(registry.permission(ServiceType::OAuth10, "reddit").is_none());
        assert!(registry.permission(ServiceType::OAuth20, "github").is_none());
        assert!(
            registry
                .action(ServiceType::OAuth20, "github", "at", None, None)
                .is_none()
        );
        assert!(registry.permission(ServiceType::OAuth20, "reddit").is_some());
    }

    #[test]
    fn actions_match_the_protocol() {
        let mut registry = registry();
        registry.add_service(reddit()).unwrap();
        let action = registry
            .action(ServiceType::OAuth20, "reddit", "at", None, Some("rt"))
            .unwrap();
        assert_eq!(action.service_type(), ServiceType::OAuth20);
        assert_eq!(action.access_token(), "at");
    }

    #[test]
    fn finetune_applies_only_to_its_service() {
        let mut registry = registry().with_finetune(Arc::new(BasicAuthFor("reddit")));
        registry.add_service(reddit()).unwrap();

        let permission = registry.permission(ServiceType::OAuth20, "reddit").unwrap();
        let context = RequestContext::new(permission.key().clone());
        let mut tuned = registry.finetune_permission(&context, permission);
        assert!(tuned.as_oauth20_mut().unwrap().basic_auth);

        let permission = registry.permission(ServiceType::OAuth20, "reddit").unwrap();
        let context = RequestContext::new(ServiceKey::new(ServiceType::OAuth20, "github"));
        let mut untouched = registry.finetune_permission(&context, permission);
        assert!(!untouched.as_oauth20_mut().unwrap().basic_auth);
    }
}
