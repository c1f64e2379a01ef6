use crate::http::{HttpRequest, HttpResponse};
use crate::oauth10::{OAuth10Action, OAuth10Permission};
use crate::oauth20::{OAuth20Action, OAuth20Permission};
use crate::{CallbackParams, OAuthError, ServiceKey, ServiceType, TokenBundle};

/// One authorization attempt against a registered service.
#[derive(Debug, Clone)]
pub enum Permission {
    OAuth10(OAuth10Permission),
    OAuth20(OAuth20Permission),
}

impl Permission {
    pub fn key(&self) -> &ServiceKey {
        match self {
            Self::OAuth10(permission) => permission.key(),
            Self::OAuth20(permission) => permission.key(),
        }
    }

    pub fn service_type(&self) -> ServiceType {
        self.key().service_type
    }

    /// URL the browser is sent to. For OAuth 1.0 this performs the
    /// request-token round trip first.
    pub async fn authorization_url(&self) -> Result<String, OAuthError> {
        match self {
            Self::OAuth10(permission) => permission.authorization_url().await,
            Self::OAuth20(permission) => permission.authorization_url(),
        }
    }

    pub async fn site_callback(&self, params: &CallbackParams) -> Result<TokenBundle, OAuthError> {
        match self {
            Self::OAuth10(permission) => permission.site_callback(params).await,
            Self::OAuth20(permission) => permission.site_callback(params).await,
        }
    }

    pub fn as_oauth20_mut(&mut self) -> Option<&mut OAuth20Permission> {
        match self {
            Self::OAuth20(permission) => Some(permission),
            Self::OAuth10(_) => None,
        }
    }
}

/// Authenticated API access with stored tokens.
#[derive(Debug, Clone)]
pub enum Action {
    OAuth10(OAuth10Action),
    OAuth20(OAuth20Action),
}

impl Action {
    pub fn service_type(&self) -> ServiceType {
        match self {
            Self::OAuth10(_) => ServiceType::OAuth10,
            Self::OAuth20(_) => ServiceType::OAuth20,
        }
    }

    pub fn access_token(&self) -> &str {
        match self {
            Self::OAuth10(action) => action.access_token(),
            Self::OAuth20(action) => action.access_token(),
        }
    }

    pub async fn request(&self, request: HttpRequest) -> Result<HttpResponse, OAuthError> {
        match self {
            Self::OAuth10(action) => action.request(request).await,
            Self::OAuth20(action) => action.request(request).await,
        }
    }

    /// OAuth 1.0 tokens do not expire and cannot be refreshed.
    pub async fn refresh(&self) -> Result<TokenBundle, OAuthError> {
        match self {
            Self::OAuth10(_) => Err(OAuthError::RefreshUnavailable {
                reason: "oauth 1.0 has no refresh grant".to_string(),
            }),
            Self::OAuth20(action) => action.refresh().await,
        }
    }

    pub fn as_oauth20_mut(&mut self) -> Option<&mut OAuth20Action> {
        match self {
            Self::OAuth20(action) => Some(action),
            Self::OAuth10(_) => None,
        }
    }
}
