//! OAuth 2.0 authorization-code flow.
//!
//! The `state` value is generated fresh for every authorize URL and only
//! checked for presence on the callback. It is never compared against the
//! value that was issued.

use std::collections::HashMap;
use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::http::{HttpClient, HttpRequest, HttpResponse};
use crate::nonce::generate_nonce;
use crate::{CallbackParams, OAuthError, ServiceKey, ServiceType, TokenBundle};

/// Token endpoint body. Only `access_token` is required; the other fields
/// are read leniently and dropped when they have an unexpected shape.
#[derive(Debug, Clone, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<Value>,
    #[serde(default)]
    token_type: Option<Value>,
    #[serde(default)]
    scope: Option<Value>,
    #[serde(default)]
    expires_in: Option<Value>,
    #[serde(flatten)]
    extra: HashMap<String, Value>,
}

impl TokenResponse {
    fn parse(response: HttpResponse) -> Result<Self, OAuthError> {
        let response = response.ensure_ok()?;
        // form-encoded error bodies, arrays and null all land here
        let token: Self = match serde_json::from_str(&response.body) {
            Ok(token) => token,
            Err(err) => {
                tracing::debug!(
                    error = %err,
                    body = %response.body,
                    "token response without access_token"
                );
                return Err(OAuthError::token_missing("access_token"));
            }
        };
        if token.access_token.is_empty() {
            return Err(OAuthError::token_missing("access_token"));
        }
        tracing::trace!(extra = ?token.extra.keys().collect::<Vec<_>>(), "token response");
        Ok(token)
    }

    fn into_bundle(self, service_name: &str) -> TokenBundle {
        TokenBundle {
            service_type: ServiceType::OAuth20,
            service_name: service_name.to_string(),
            access_token: self.access_token,
            access_token_secret: None,
            refresh_token: self.refresh_token.and_then(text),
            // some providers send the lifetime as a string
            expires_in: self.expires_in.and_then(|value| match value {
                Value::Number(n) => n.as_u64(),
                Value::String(s) => s.parse().ok(),
                _ => None,
            }),
            token_type: self.token_type.and_then(text),
            scope: self.scope.and_then(|value| match value {
                Value::Array(items) => {
                    let scopes: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
                    (!scopes.is_empty()).then(|| scopes.join(" "))
                }
                other => text(other),
            }),
        }
    }
}

fn text(value: Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s),
        _ => None,
    }
}

#[derive(Clone)]
pub struct OAuth20Permission {
    key: ServiceKey,
    client_id: String,
    client_secret: String,
    authorize_url: String,
    access_token_url: String,
    callback_url: Option<String>,
    scope: Option<String>,
    /// Send `Authorization: Basic base64(id:secret)` on the code exchange.
    pub basic_auth: bool,
    /// Added to the authorize URL, overriding defaults on collision.
    pub authorize_params: Vec<(String, String)>,
    http: Arc<dyn HttpClient>,
}

impl std::fmt::Debug for OAuth20Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth20Permission")
            .field("key", &self.key)
            .field("client_id", &self.client_id)
            .field("authorize_url", &self.authorize_url)
            .field("access_token_url", &self.access_token_url)
            .field("callback_url", &self.callback_url)
            .field("scope", &self.scope)
            .field("basic_auth", &self.basic_auth)
            .field("authorize_params", &self.authorize_params)
            .finish_non_exhaustive()
    }
}

impl OAuth20Permission {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        service_name: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        authorize_url: impl Into<String>,
        access_token_url: impl Into<String>,
        callback_url: Option<String>,
        scope: Option<String>,
        http: Arc<dyn HttpClient>,
    ) -> Self {
        Self {
            key: ServiceKey::new(ServiceType::OAuth20, service_name),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            authorize_url: authorize_url.into(),
            access_token_url: access_token_url.into(),
            callback_url,
            scope,
            basic_auth: false,
            authorize_params: Vec::new(),
            http,
        }
    }

    pub fn key(&self) -> &ServiceKey {
        &self.key
    }

    pub fn with_basic_auth(mut self, basic_auth: bool) -> Self {
        self.basic_auth = basic_auth;
        self
    }

    pub fn with_authorize_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_authorize_param(key, value);
        self
    }

    /// Adds or replaces one extra authorize URL parameter.
    pub fn set_authorize_param(&mut self, key: impl Into<String>, value: impl Into<String>) {
        set_param(&mut self.authorize_params, key.into(), value.into());
    }

    pub fn authorization_url(&self) -> Result<String, OAuthError> {
        let mut params = vec![("client_id".to_string(), self.client_id.clone())];
        if let Some(scope) = &self.scope {
            params.push(("scope".to_string(), scope.clone()));
        }
        params.push(("state".to_string(), generate_nonce()?));
        if let Some(callback_url) = &self.callback_url {
            params.push(("redirect_uri".to_string(), callback_url.clone()));
        }
        params.push(("response_type".to_string(), "code".to_string()));
        for (key, value) in &self.authorize_params {
            set_param(&mut params, key.clone(), value.clone());
        }

        let mut url = Url::parse(&self.authorize_url)?;
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(&key, &value);
            }
        }
        Ok(url.to_string())
    }

    /// Exchanges the callback `code` for tokens. `state` must be present but
    /// is not compared with anything.
    pub async fn site_callback(&self, params: &CallbackParams) -> Result<TokenBundle, OAuthError> {
        let code = params.require("code")?;
        let state = params.require("state")?;

        let mut form = vec![
            ("client_id".to_string(), self.client_id.clone()),
            ("client_secret".to_string(), self.client_secret.clone()),
            ("code".to_string(), code.to_string()),
        ];
        if let Some(callback_url) = &self.callback_url {
            form.push(("redirect_uri".to_string(), callback_url.clone()));
        }
        form.push(("grant_type".to_string(), "authorization_code".to_string()));
        form.push(("state".to_string(), state.to_string()));

        let mut request = HttpRequest::post(&self.access_token_url)
            .with_header("Accept", "application/json")
            .with_form(form)
            .expect_json();
        if self.basic_auth {
            let credentials = STANDARD.encode(format!("{}:{}", self.client_id, self.client_secret));
            request = request.with_header("Authorization", format!("Basic {credentials}"));
        }

        let response = self.http.send(request).await?;
        if !response.is_ok() {
            tracing::info!(
                service = %self.key,
                status = response.status,
                body = %response.body,
                "code exchange rejected"
            );
        }
        let token = TokenResponse::parse(response)?;
        Ok(token.into_bundle(&self.key.service_name))
    }
}

/// Bearer-token requests on behalf of a user.
#[derive(Clone)]
pub struct OAuth20Action {
    service_name: String,
    client_id: String,
    client_secret: String,
    access_token: String,
    refresh_token: Option<String>,
    access_token_url: Option<String>,
    /// `Authorization: Bearer` when set, `access_token` query parameter
    /// otherwise.
    pub bearer: bool,
    http: Arc<dyn HttpClient>,
}

impl std::fmt::Debug for OAuth20Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth20Action")
            .field("service_name", &self.service_name)
            .field("client_id", &self.client_id)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("bearer", &self.bearer)
            .finish_non_exhaustive()
    }
}

impl OAuth20Action {
    pub fn new(
        service_name: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        access_token_url: Option<String>,
        http: Arc<dyn HttpClient>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            access_token: access_token.into(),
            refresh_token,
            access_token_url,
            bearer: true,
            http,
        }
    }

    pub fn with_bearer(mut self, bearer: bool) -> Self {
        self.bearer = bearer;
        self
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    pub async fn request(&self, mut request: HttpRequest) -> Result<HttpResponse, OAuthError> {
        if self.bearer {
            request
                .headers
                .push(("Authorization".to_string(), format!("Bearer {}", self.access_token)));
        } else {
            request
                .query
                .push(("access_token".to_string(), self.access_token.clone()));
        }
        if request.expect_json && request.header("Accept").is_none() {
            request
                .headers
                .push(("Accept".to_string(), "application/json".to_string()));
        }
        self.http.send(request).await
    }

    /// Mints a new access token from the refresh token. The old refresh
    /// token is kept when the provider does not rotate it.
    pub async fn refresh(&self) -> Result<TokenBundle, OAuthError> {
        let Some(refresh_token) = self.refresh_token.as_deref().filter(|t| !t.is_empty()) else {
            return Err(OAuthError::RefreshUnavailable {
                reason: "no refresh token".to_string(),
            });
        };
        let Some(access_token_url) = self.access_token_url.as_deref() else {
            return Err(OAuthError::RefreshUnavailable {
                reason: "no access token url".to_string(),
            });
        };

        let form = vec![
            ("client_id".to_string(), self.client_id.clone()),
            ("client_secret".to_string(), self.client_secret.clone()),
            ("refresh_token".to_string(), refresh_token.to_string()),
            ("grant_type".to_string(), "refresh_token".to_string()),
        ];
        let mut request = HttpRequest::post(access_token_url)
            .with_header("Accept", "application/json")
            .with_form(form)
            .expect_json();
        if self.bearer {
            request = request.with_header("Authorization", format!("Bearer {}", self.access_token));
        }

        let token = TokenResponse::parse(self.http.send(request).await?)?;
        let mut bundle = token.into_bundle(&self.service_name);
        if bundle.refresh_token.is_none() {
            bundle.refresh_token = Some(refresh_token.to_string());
        }
        Ok(bundle)
    }
}

fn set_param(params: &mut Vec<(String, String)>, key: String, value: String) {
    if let Some((_, existing)) = params.iter_mut().find(|(param, _)| *param == key) {
        *existing = value;
    } else {
        params.push((key, value));
    }
}
