//! OAuth 1.0 / 1.0a three-legged flow.

use std::sync::Arc;

use url::Url;

use crate::http::{HttpClient, HttpRequest, HttpResponse, Method};
use crate::signature::{Signer, percent_encode};
use crate::{CallbackParams, OAuthError, ServiceKey, ServiceType, TokenBundle};

/// Callback value for services registered without a callback URL.
const OUT_OF_BAND: &str = "oob";

/// Temporary credentials from the request-token endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestToken {
    pub oauth_token: String,
    pub oauth_token_secret: String,
    /// Sent by some 1.0a providers at this stage, never by plain 1.0.
    pub oauth_verifier: Option<String>,
}

#[derive(Clone)]
pub struct OAuth10Permission {
    key: ServiceKey,
    signer: Signer,
    request_token_url: String,
    authorize_url: String,
    access_token_url: String,
    callback_url: Option<String>,
    http: Arc<dyn HttpClient>,
}

impl std::fmt::Debug for OAuth10Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth10Permission")
            .field("key", &self.key)
            .field("request_token_url", &self.request_token_url)
            .field("authorize_url", &self.authorize_url)
            .field("access_token_url", &self.access_token_url)
            .field("callback_url", &self.callback_url)
            .finish_non_exhaustive()
    }
}

impl OAuth10Permission {
    pub fn new(
        service_name: impl Into<String>,
        signer: Signer,
        request_token_url: impl Into<String>,
        authorize_url: impl Into<String>,
        access_token_url: impl Into<String>,
        callback_url: Option<String>,
        http: Arc<dyn HttpClient>,
    ) -> Self {
        Self {
            key: ServiceKey::new(ServiceType::OAuth10, service_name),
            signer,
            request_token_url: request_token_url.into(),
            authorize_url: authorize_url.into(),
            access_token_url: access_token_url.into(),
            callback_url,
            http,
        }
    }

    pub fn key(&self) -> &ServiceKey {
        &self.key
    }

    /// Obtains a request token. The provider must confirm the callback with
    /// the literal string `"true"`.
    pub async fn request_token(&self) -> Result<RequestToken, OAuthError> {
        let callback = self
            .callback_url
            .clone()
            .unwrap_or_else(|| OUT_OF_BAND.to_string());
        let header = self.signer.authorization_header(
            Method::Post,
            &self.request_token_url,
            &[("oauth_callback".to_string(), callback)],
            &[],
            None,
        )?;

        let response = self
            .http
            .send(HttpRequest::post(&self.request_token_url).with_header("Authorization", header))
            .await?
            .ensure_ok()?;

        let pairs = response.form_pairs();
        let oauth_token = form_value(&pairs, "oauth_token")
            .ok_or_else(|| OAuthError::incomplete("oauth_token"))?;
        let oauth_token_secret = form_value(&pairs, "oauth_token_secret")
            .ok_or_else(|| OAuthError::incomplete("oauth_token_secret"))?;
        match form_value(&pairs, "oauth_callback_confirmed") {
            Some(confirmed) if confirmed == "true" => {}
            _ => return Err(OAuthError::incomplete("oauth_callback_confirmed")),
        }

        Ok(RequestToken {
            oauth_token,
            oauth_token_secret,
            oauth_verifier: form_value(&pairs, "oauth_verifier"),
        })
    }

    /// URL the browser opens to approve the request token.
    pub fn authenticate_url(&self, token: &RequestToken) -> String {
        let separator = if self.authorize_url.contains('?') { '&' } else { '?' };
        let mut url = format!(
            "{}{separator}oauth_token={}",
            self.authorize_url,
            percent_encode(&token.oauth_token)
        );
        if let Some(verifier) = &token.oauth_verifier {
            url.push_str("&oauth_verifier=");
            url.push_str(&percent_encode(verifier));
        }
        url
    }

    /// Request token followed by [`authenticate_url`](Self::authenticate_url).
    pub async fn authorization_url(&self) -> Result<String, OAuthError> {
        match self.request_token().await {
            Ok(token) => Ok(self.authenticate_url(&token)),
            Err(err) => {
                tracing::info!(service = %self.key, error = %err, "request token not obtained");
                Err(OAuthError::AccessUrlMissing {
                    reason: err.to_string(),
                })
            }
        }
    }

    /// Exchanges the callback `oauth_token` (and `oauth_verifier` for 1.0a)
    /// for access credentials.
    pub async fn site_callback(&self, params: &CallbackParams) -> Result<TokenBundle, OAuthError> {
        let oauth_token = params.require("oauth_token")?;

        let mut body = Vec::new();
        if let Some(verifier) = params.get("oauth_verifier") {
            body.push(("oauth_verifier".to_string(), verifier.to_string()));
        }
        let header = self.signer.authorization_header(
            Method::Post,
            &self.access_token_url,
            &[("oauth_token".to_string(), oauth_token.to_string())],
            &body,
            None,
        )?;

        let mut request =
            HttpRequest::post(&self.access_token_url).with_header("Authorization", header);
        if !body.is_empty() {
            request = request.with_form(body);
        }
        let response = self.http.send(request).await?.ensure_ok()?;

        let pairs = response.form_pairs();
        let access_token = form_value(&pairs, "oauth_token")
            .ok_or_else(|| OAuthError::token_missing("oauth_token"))?;
        let access_token_secret = form_value(&pairs, "oauth_token_secret")
            .ok_or_else(|| OAuthError::token_missing("oauth_token_secret"))?;

        Ok(TokenBundle {
            service_type: ServiceType::OAuth10,
            service_name: self.key.service_name.clone(),
            access_token,
            access_token_secret: Some(access_token_secret),
            refresh_token: None,
            expires_in: None,
            token_type: None,
            scope: None,
        })
    }
}

/// Signed requests on behalf of a user.
#[derive(Clone)]
pub struct OAuth10Action {
    signer: Signer,
    access_token: String,
    access_token_secret: String,
    http: Arc<dyn HttpClient>,
}

impl std::fmt::Debug for OAuth10Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth10Action")
            .field("consumer_key", &self.signer.consumer_key())
            .finish_non_exhaustive()
    }
}

impl OAuth10Action {
    pub fn new(
        signer: Signer,
        access_token: impl Into<String>,
        access_token_secret: impl Into<String>,
        http: Arc<dyn HttpClient>,
    ) -> Self {
        Self {
            signer,
            access_token: access_token.into(),
            access_token_secret: access_token_secret.into(),
            http,
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Signs and sends `request`. A query string embedded in the URL is moved
    /// into `request.query` so the base string covers it.
    pub async fn request(&self, mut request: HttpRequest) -> Result<HttpResponse, OAuthError> {
        let mut url = Url::parse(&request.url)?;
        if url.host_str().is_none() || !matches!(url.scheme(), "http" | "https") {
            return Err(OAuthError::InvalidRequestUrl(request.url));
        }
        let mut query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        query.append(&mut request.query);
        url.set_query(None);
        url.set_fragment(None);

        let mut signed = query.clone();
        if let Some(form) = &request.form {
            signed.extend(form.iter().cloned());
        }
        let header = self.signer.authorization_header(
            request.method,
            url.as_str(),
            &[("oauth_token".to_string(), self.access_token.clone())],
            &signed,
            Some(&self.access_token_secret),
        )?;

        request.url = url.to_string();
        request.query = query;
        request.headers.push(("Authorization".to_string(), header));
        self.http.send(request).await
    }
}

fn form_value(pairs: &[(String, String)], key: &str) -> Option<String> {
    pairs
        .iter()
        .find(|(name, value)| name == key && !value.is_empty())
        .map(|(_, value)| value.clone())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::fixture::StubProvider;
    use crate::{ErrorCode, FixedNonce};

    fn permission(service: &str, stub: &Arc<StubProvider>) -> OAuth10Permission {
        OAuth10Permission::new(
            service,
            Signer::with_nonce_source("ck", "cs", Arc::new(FixedNonce::new("n", 1))),
            format!("http://{service}.example.org/10/auth_request"),
            format!("http://{service}.example.org/10/auth"),
            format!("http://{service}.example.org/10/access"),
            Some("http://localhost".to_string()),
            stub.clone(),
        )
    }

    #[tokio::test]
    async fn request_token_sends_signed_callback() {
        let stub = Arc::new(StubProvider::default());
        permission("twitter", &stub).request_token().await.unwrap();

        let calls = stub.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].method, Method::Post);
        let header = calls[0].header("Authorization").unwrap();
        assert!(header.starts_with("OAuth "));
        assert!(header.contains("oauth_callback=\"http%3A%2F%2Flocalhost\""));
        assert!(header.contains("oauth_signature_method=\"HMAC-SHA1\""));
    }

    #[tokio::test]
    async fn verifier_only_embedded_when_provider_sends_one() {
        let stub = Arc::new(StubProvider::default());

        let with_verifier = permission("twitter", &stub).authorization_url().await.unwrap();
        assert!(with_verifier.starts_with("http://twitter.example.org/10/auth?oauth_token=token-"));
        assert!(with_verifier.ends_with("&oauth_verifier=optional-verifier"));

        let without_verifier = permission("trakt", &stub).authorization_url().await.unwrap();
        assert!(without_verifier.starts_with("http://trakt.example.org/10/auth?oauth_token=token-"));
        assert!(!without_verifier.contains("oauth_verifier"));
    }

    #[tokio::test]
    async fn request_token_rejects_unconfirmed_callback() {
        let stub = Arc::new(StubProvider::default());
        let err = permission("tumblr", &stub).request_token().await.unwrap_err();
        assert!(matches!(err, OAuthError::IncompleteData { ref field } if field == "oauth_callback_confirmed"));
    }

    #[tokio::test]
    async fn request_token_requires_all_fields() {
        let stub = Arc::new(StubProvider::default());
        let err = permission("trello", &stub).request_token().await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::IncompleteData);
    }

    #[tokio::test]
    async fn provider_failure_means_no_authorize_url() {
        let stub = Arc::new(StubProvider::default());
        let err = permission("myspace", &stub).authorization_url().await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::AccessUrlMissing);
    }

    #[tokio::test]
    async fn site_callback_posts_verifier_and_returns_secret() {
        let stub = Arc::new(StubProvider::default());
        let params = CallbackParams::from_query("oauth_token=req&oauth_verifier=ver");
        let bundle = permission("twitter", &stub)
            .site_callback(&params)
            .await
            .unwrap();

        assert!(bundle.access_token.starts_with("access-token-"));
        assert_eq!(
            bundle.access_token_secret.as_deref(),
            Some("access-token-secret")
        );
        let call = &stub.calls()[0];
        assert_eq!(
            call.form,
            Some(vec![("oauth_verifier".to_string(), "ver".to_string())])
        );
        assert!(call.header("Authorization").unwrap().contains("oauth_token=\"req\""));
    }

    #[tokio::test]
    async fn site_callback_tolerates_plain_oauth10() {
        let stub = Arc::new(StubProvider::default());
        let params = CallbackParams::from_query("oauth_token=req");
        permission("trakt", &stub).site_callback(&params).await.unwrap();
        assert_eq!(stub.calls()[0].form, None);
    }

    #[tokio::test]
    async fn access_step_failures_are_reported() {
        let stub = Arc::new(StubProvider::default());
        let params = CallbackParams::from_query("oauth_token=req&oauth_verifier=ver");

        let err = permission("flickr", &stub).site_callback(&params).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ServiceError);
        assert!(matches!(err, OAuthError::HttpStatus { status: 503, .. }));

        let err = permission("plurk", &stub).site_callback(&params).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::TokenMissing);
        assert!(matches!(err, OAuthError::TokenMissing { ref field } if field == "oauth_token_secret"));
    }

    #[tokio::test]
    async fn site_callback_requires_token_without_network() {
        let stub = Arc::new(StubProvider::default());
        let params = CallbackParams::from_query("wrong=data");
        let err = permission("twitter", &stub).site_callback(&params).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::IncompleteData);
        assert!(stub.calls().is_empty());
    }

    #[tokio::test]
    async fn action_moves_url_query_into_signed_params() {
        let stub = Arc::new(StubProvider::default());
        let action = OAuth10Action::new(
            Signer::with_nonce_source("ck", "cs", Arc::new(FixedNonce::new("n", 1))),
            "at",
            "ats",
            stub.clone(),
        );
        let response = action
            .request(HttpRequest::get("http://twitter.example.org/10/api/me?fields=a,b").expect_json())
            .await
            .unwrap();
        assert_eq!(response.status, 200);

        let call = &stub.calls()[0];
        assert_eq!(call.url, "http://twitter.example.org/10/api/me");
        assert_eq!(call.query, vec![("fields".to_string(), "a,b".to_string())]);
        let header = call.header("Authorization").unwrap();
        assert!(header.contains("oauth_token=\"at\""));
        assert!(!header.contains("fields"));
    }

    #[tokio::test]
    async fn action_rejects_relative_urls() {
        let stub = Arc::new(StubProvider::default());
        let action = OAuth10Action::new(Signer::new("ck", "cs"), "at", "ats", stub.clone());
        let err = action
            .request(HttpRequest::get("file:///etc/passwd"))
            .await
            .unwrap_err();
        assert!(matches!(err, OAuthError::InvalidRequestUrl(_)));
        assert!(stub.calls().is_empty());
    }
}
