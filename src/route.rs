//! Auth and callback orchestration.
//!
//! [`OAuthRoute`] is framework agnostic: it takes path and query values and
//! returns a [`RouteResponse`] that an HTTP adapter renders.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::nonce::generate_nonce;
use crate::permission::Action;
use crate::profile::ProfileFetcher;
use crate::registry::{RequestContext, ServiceRegistry};
use crate::signature::percent_encode;
use crate::store::{Bio, Provision, SessionStore};
use crate::{CallbackParams, ErrorCode, OAuthError, Profile, ServiceKey, ServiceType, TokenBundle};

const DEFAULT_TOKEN_NAME: &str = "byway";
const DEFAULT_SESSION_TTL: u64 = 2 * 60 * 60;
const FAKE_LOGIN_TTL: u64 = 6 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RouteConfig {
    /// Where a successful callback lands. Falls back to `home`.
    pub ok_redirect: Option<String>,
    /// Where a failed callback lands. Without it the callback aborts 503.
    pub fail_redirect: Option<String>,
    pub home: String,
    /// Session cookie name.
    pub token_name: String,
    /// Session lifetime in seconds.
    pub session_ttl: u64,
    /// Enables [`OAuthRoute::fake_login`].
    pub dev_mode: bool,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            ok_redirect: None,
            fail_redirect: None,
            home: "/".to_string(),
            token_name: DEFAULT_TOKEN_NAME.to_string(),
            session_ttl: DEFAULT_SESSION_TTL,
            dev_mode: false,
        }
    }
}

impl RouteConfig {
    pub fn with_ok_redirect(mut self, url: impl Into<String>) -> Self {
        self.ok_redirect = Some(url.into());
        self
    }

    pub fn with_fail_redirect(mut self, url: impl Into<String>) -> Self {
        self.fail_redirect = Some(url.into());
        self
    }

    pub fn with_home(mut self, home: impl Into<String>) -> Self {
        self.home = home.into();
        self
    }

    pub fn with_token_name(mut self, token_name: impl Into<String>) -> Self {
        self.token_name = token_name.into();
        self
    }

    pub fn with_session_ttl(mut self, seconds: u64) -> Self {
        self.session_ttl = seconds;
        self
    }

    pub fn with_dev_mode(mut self, dev_mode: bool) -> Self {
        self.dev_mode = dev_mode;
        self
    }

    fn ok_location(&self) -> String {
        self.ok_redirect.clone().unwrap_or_else(|| self.home.clone())
    }
}

/// `{errno, data?}` body of the auth endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JsonReply {
    pub errno: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl JsonReply {
    pub fn ok(data: impl Into<String>) -> Self {
        Self {
            errno: 0,
            data: Some(data.into()),
        }
    }

    pub fn error(code: ErrorCode) -> Self {
        Self {
            errno: code.as_u16(),
            data: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub max_age: u64,
}

impl SessionCookie {
    pub fn header_value(&self) -> String {
        format!(
            "{}={}; Max-Age={}; Path=/; HttpOnly; SameSite=Lax",
            self.name, self.value, self.max_age
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteResponse {
    Json { status: u16, body: JsonReply },
    Redirect {
        location: String,
        cookie: Option<SessionCookie>,
    },
    Abort { status: u16 },
}

impl RouteResponse {
    fn json(status: u16, body: JsonReply) -> Self {
        Self::Json { status, body }
    }

    fn redirect(location: impl Into<String>) -> Self {
        Self::Redirect {
            location: location.into(),
            cookie: None,
        }
    }

    /// HTTP status the adapter should send.
    pub fn status(&self) -> u16 {
        match self {
            Self::Json { status, .. } | Self::Abort { status } => *status,
            Self::Redirect { .. } => 302,
        }
    }
}

pub struct OAuthRoute {
    registry: Arc<ServiceRegistry>,
    store: Arc<dyn SessionStore>,
    profiles: Arc<dyn ProfileFetcher>,
    config: RouteConfig,
}

impl std::fmt::Debug for OAuthRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthRoute")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl OAuthRoute {
    pub fn new(
        registry: Arc<ServiceRegistry>,
        store: Arc<dyn SessionStore>,
        profiles: Arc<dyn ProfileFetcher>,
    ) -> Self {
        Self {
            registry,
            store,
            profiles,
            config: RouteConfig::default(),
        }
    }

    pub fn with_config(mut self, config: RouteConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &RouteConfig {
        &self.config
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// Issues the provider authorization URL.
    pub async fn auth(&self, service_type: &str, service_name: &str) -> RouteResponse {
        if service_type.is_empty() || service_name.is_empty() {
            return RouteResponse::json(404, JsonReply::error(ErrorCode::IncompleteData));
        }
        let Ok(service_type) = service_type.parse::<ServiceType>() else {
            return RouteResponse::json(404, JsonReply::error(ErrorCode::ServiceUnknown));
        };
        let Some(permission) = self.registry.permission(service_type, service_name) else {
            tracing::info!(service_type = %service_type, service_name, "auth for unknown service");
            return RouteResponse::json(404, JsonReply::error(ErrorCode::ServiceUnknown));
        };
        let context = RequestContext::new(permission.key().clone());
        let permission = self.registry.finetune_permission(&context, permission);

        match permission.authorization_url().await {
            Ok(url) => RouteResponse::json(200, JsonReply::ok(url)),
            Err(err) => {
                tracing::info!(
                    service = %context.key,
                    error = %err,
                    "authorization url not obtained"
                );
                RouteResponse::json(503, JsonReply::error(ErrorCode::AccessUrlMissing))
            }
        }
    }

    /// Completes the handshake the provider redirected back to.
    ///
    /// `session_token` is the browser's current session cookie. A valid one
    /// short-circuits to the success redirect without provisioning again.
    pub async fn callback(
        &self,
        service_type: &str,
        service_name: &str,
        params: &CallbackParams,
        session_token: Option<&str>,
    ) -> RouteResponse {
        if self.has_valid_session(session_token).await {
            tracing::debug!(code = %ErrorCode::UserAlreadyLoggedIn, "callback with live session");
            return RouteResponse::redirect(self.config.ok_location());
        }
        if service_type.is_empty() || service_name.is_empty() {
            return RouteResponse::Abort { status: 404 };
        }
        let permission = service_type
            .parse::<ServiceType>()
            .ok()
            .and_then(|service_type| self.registry.permission(service_type, service_name));
        let Some(permission) = permission else {
            tracing::info!(service_type, service_name, "callback for unknown service");
            return RouteResponse::Abort { status: 404 };
        };
        let context =
            RequestContext::new(permission.key().clone()).with_query(params.pairs().to_vec());
        let permission = self.registry.finetune_permission(&context, permission);
        let key = context.key;

        let bundle = match permission.site_callback(params).await {
            Ok(bundle) => bundle,
            Err(err) => {
                tracing::info!(
                    service = %key,
                    code = %err.code(),
                    error = %err,
                    "access token not obtained from callback"
                );
                return self.failed();
            }
        };

        match self.login(&key, bundle).await {
            Ok(response) => response,
            Err(err) => {
                tracing::error!(service = %key, error = %err, "login after callback failed");
                self.failed()
            }
        }
    }

    async fn login(&self, key: &ServiceKey, bundle: TokenBundle) -> Result<RouteResponse, OAuthError> {
        let action = self
            .registry
            .action_for_bundle(&bundle)
            .ok_or_else(|| OAuthError::ServiceUnknown {
                service_type: key.service_type.to_string(),
                service_name: key.service_name.clone(),
            })?;

        let profile = self
            .profiles
            .fetch_profile(&action, key.service_type, &key.service_name)
            .await?
            .filter(|profile| !profile.uname.is_empty())
            .ok_or_else(|| OAuthError::ProfileUnavailable {
                service: key.to_string(),
            })?;
        tracing::debug!(service = %key, uname = %profile.uname, "profile fetched");

        let cookie = self.provision(key, profile, bundle, self.config.session_ttl).await?;
        Ok(RouteResponse::Redirect {
            location: self.config.ok_location(),
            cookie: Some(cookie),
        })
    }

    async fn provision(
        &self,
        key: &ServiceKey,
        profile: Profile,
        tokens: TokenBundle,
        session_ttl: u64,
    ) -> Result<SessionCookie, OAuthError> {
        let uservice = key.uservice();
        let bio = Bio {
            email_verified: profile.email.is_some(),
            fname: profile.fname,
            email: profile.email,
            site: profile.site,
        };
        let grant = self
            .store
            .provision(Provision {
                uname: format!("{}:{}", percent_encode(&profile.uname), uservice),
                uservice,
                bio,
                tokens,
                session_ttl,
            })
            .await?;

        let cookie = SessionCookie {
            name: self.config.token_name.clone(),
            value: grant.token,
            max_age: session_ttl,
        };
        tracing::debug!(cookie = %cookie.name, uid = grant.uid, "session cookie issued");
        Ok(cookie)
    }

    fn failed(&self) -> RouteResponse {
        match &self.config.fail_redirect {
            Some(location) => RouteResponse::redirect(location.clone()),
            None => RouteResponse::Abort { status: 503 },
        }
    }

    async fn has_valid_session(&self, session_token: Option<&str>) -> bool {
        let Some(token) = session_token.filter(|token| !token.is_empty()) else {
            return false;
        };
        match self.store.session_is_valid(token).await {
            Ok(valid) => valid,
            Err(err) => {
                tracing::error!(error = %err, "session lookup failed");
                false
            }
        }
    }

    /// Rebuilds an [`Action`] from the most recent tokens of a live session.
    pub async fn action_from_session(&self, session_token: &str) -> Result<Option<Action>, OAuthError> {
        let Some(row) = self.store.tokens_for_session(session_token).await? else {
            return Ok(None);
        };
        Ok(self.registry.action_for_bundle(&row.tokens))
    }

    /// Development-only login that trusts an e-mail address and skips the
    /// provider. The address must mention the service name, so
    /// `you@github.example` is accepted for `github`.
    pub async fn fake_login(
        &self,
        service_type: &str,
        service_name: &str,
        email: Option<&str>,
        session_token: Option<&str>,
    ) -> RouteResponse {
        if !self.config.dev_mode {
            return RouteResponse::Abort { status: 404 };
        }
        let fail = |status: u16, code: ErrorCode| {
            let base = self
                .config
                .fail_redirect
                .clone()
                .unwrap_or_else(|| self.config.home.clone());
            RouteResponse::redirect(format!("{base}?code={status}&errno={}", code.as_u16()))
        };

        if service_type.is_empty() || service_name.is_empty() {
            return fail(404, ErrorCode::ServiceUnknown);
        }
        if self.has_valid_session(session_token).await {
            return RouteResponse::json(401, JsonReply::error(ErrorCode::UserAlreadyLoggedIn));
        }
        let Some(email) = email.filter(|email| is_email(email)) else {
            return fail(403, ErrorCode::IncompleteData);
        };
        if !email.contains(service_name) {
            return fail(404, ErrorCode::ServiceUnknown);
        }
        let Some(key) = service_type
            .parse::<ServiceType>()
            .ok()
            .filter(|service_type| self.registry.service(*service_type, service_name).is_some())
            .map(|service_type| ServiceKey::new(service_type, service_name))
        else {
            return fail(404, ErrorCode::ServiceUnknown);
        };

        let uname: String = email
            .chars()
            .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
            .collect();
        let result = self.fake_provision(&key, uname, email).await;

        match result {
            Ok(cookie) => RouteResponse::Redirect {
                location: self.config.ok_location(),
                cookie: Some(cookie),
            },
            Err(err) => {
                tracing::error!(service = %key, error = %err, "fake login failed");
                fail(503, ErrorCode::ServiceError)
            }
        }
    }

    async fn fake_provision(
        &self,
        key: &ServiceKey,
        uname: String,
        email: &str,
    ) -> Result<SessionCookie, OAuthError> {
        let access_token = generate_nonce()?;
        let tokens = TokenBundle {
            service_type: key.service_type,
            service_name: key.service_name.clone(),
            access_token_secret: (key.service_type == ServiceType::OAuth10)
                .then(|| format!("xxx-{access_token}")),
            access_token,
            refresh_token: None,
            expires_in: None,
            token_type: None,
            scope: None,
        };
        let profile = Profile {
            fname: Some(format!("{} Sample", capitalize(&uname))),
            email: Some(email.to_string()),
            site: None,
            uname,
        };
        self.provision(key, profile, tokens, FAKE_LOGIN_TTL).await
    }
}

fn is_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !value.chars().any(char::is_whitespace)
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
