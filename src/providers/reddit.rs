use async_trait::async_trait;

use crate::http::HttpRequest;
use crate::permission::Action;
use crate::{OAuthError, Profile, Provider, ServiceType};

const AUTHORIZE_URL: &str = "https://www.reddit.com/api/v1/authorize";
const ACCESS_TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";
const ME_URL: &str = "https://oauth.reddit.com/api/v1/me";

const DEFAULT_SCOPE: &str = "identity";
const USER_AGENT: &str = concat!("byway-oauth/", env!("CARGO_PKG_VERSION"));

// without `permanent` no refresh token is issued
const AUTHORIZE_PARAMS: &[(&str, &str)] = &[("duration", "permanent")];

#[derive(Debug, Clone, Copy, Default)]
pub struct RedditProvider;

#[async_trait]
impl Provider for RedditProvider {
    fn id(&self) -> &'static str {
        "reddit"
    }

    fn service_type(&self) -> ServiceType {
        ServiceType::OAuth20
    }

    fn authorize_url(&self) -> &'static str {
        AUTHORIZE_URL
    }

    fn access_token_url(&self) -> &'static str {
        ACCESS_TOKEN_URL
    }

    fn default_scope(&self) -> Option<&'static str> {
        Some(DEFAULT_SCOPE)
    }

    fn authorize_params(&self) -> Vec<(String, String)> {
        AUTHORIZE_PARAMS
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect()
    }

    fn basic_auth(&self) -> bool {
        true
    }

    async fn fetch_profile(&self, action: &Action) -> Result<Option<Profile>, OAuthError> {
        let request = HttpRequest::get(ME_URL)
            .with_header("User-Agent", USER_AGENT)
            .expect_json();
        let response = action.request(request).await?;
        if !response.is_ok() {
            return Ok(None);
        }
        let data: serde_json::Value = response.json()?;
        let Some(mut profile) = Profile::from_json(&data, "name", &[]) else {
            return Ok(None);
        };
        profile.site = Some(format!("https://www.reddit.com/user/{}", profile.uname));
        Ok(Some(profile))
    }
}
