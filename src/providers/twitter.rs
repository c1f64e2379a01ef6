use async_trait::async_trait;

use crate::http::HttpRequest;
use crate::permission::Action;
use crate::{OAuthError, Profile, Provider, ServiceType};

const REQUEST_TOKEN_URL: &str = "https://api.twitter.com/oauth/request_token";
const AUTHORIZE_URL: &str = "https://api.twitter.com/oauth/authenticate";
const ACCESS_TOKEN_URL: &str = "https://api.twitter.com/oauth/access_token";
const VERIFY_CREDENTIALS_URL: &str = "https://api.twitter.com/1.1/account/verify_credentials.json";

#[derive(Debug, Clone, Copy, Default)]
pub struct TwitterProvider;

#[async_trait]
impl Provider for TwitterProvider {
    fn id(&self) -> &'static str {
        "twitter"
    }

    fn service_type(&self) -> ServiceType {
        ServiceType::OAuth10
    }

    fn request_token_url(&self) -> Option<&'static str> {
        Some(REQUEST_TOKEN_URL)
    }

    fn authorize_url(&self) -> &'static str {
        AUTHORIZE_URL
    }

    fn access_token_url(&self) -> &'static str {
        ACCESS_TOKEN_URL
    }

    async fn fetch_profile(&self, action: &Action) -> Result<Option<Profile>, OAuthError> {
        let response = action
            .request(HttpRequest::get(VERIFY_CREDENTIALS_URL).expect_json())
            .await?;
        if !response.is_ok() {
            return Ok(None);
        }
        let data: serde_json::Value = response.json()?;
        let Some(mut profile) = Profile::from_json(&data, "screen_name", &[("name", "fname")])
        else {
            return Ok(None);
        };
        profile.site = Some(format!("https://twitter.com/{}", profile.uname));
        Ok(Some(profile))
    }
}
