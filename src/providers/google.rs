use async_trait::async_trait;

use crate::http::HttpRequest;
use crate::permission::Action;
use crate::{OAuthError, Profile, Provider, ServiceType};

const AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const ACCESS_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://www.googleapis.com/userinfo/v2/me";

const DEFAULT_SCOPE: &str = "openid email profile";
const USERINFO_FIELDS: &str = "email,id,link,name";

// Google only issues a refresh token when both are present.
const AUTHORIZE_PARAMS: &[(&str, &str)] = &[("access_type", "offline"), ("prompt", "consent")];

#[derive(Debug, Clone, Copy, Default)]
pub struct GoogleProvider;

#[async_trait]
impl Provider for GoogleProvider {
    fn id(&self) -> &'static str {
        "google"
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

    async fn fetch_profile(&self, action: &Action) -> Result<Option<Profile>, OAuthError> {
        let request = HttpRequest::get(USERINFO_URL)
            .with_query("fields", USERINFO_FIELDS)
            .expect_json();
        let response = action.request(request).await?;
        if !response.is_ok() {
            return Ok(None);
        }
        let data: serde_json::Value = response.json()?;
        Ok(Profile::from_json(
            &data,
            "id",
            &[("email", "email"), ("name", "fname"), ("link", "site")],
        ))
    }
}
