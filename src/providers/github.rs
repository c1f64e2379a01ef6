use async_trait::async_trait;
use serde::Deserialize;

use crate::http::HttpRequest;
use crate::permission::Action;
use crate::{OAuthError, Profile, Provider, ServiceType};

const AUTHORIZE_URL: &str = "https://github.com/login/oauth/authorize";
const ACCESS_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const USER_URL: &str = "https://api.github.com/user";
const EMAILS_URL: &str = "https://api.github.com/user/emails";

const DEFAULT_SCOPE: &str = "read:user user:email";
// api.github.com rejects requests without one
const USER_AGENT: &str = concat!("byway-oauth/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct GithubEmail {
    email: Option<String>,
    #[serde(default)]
    primary: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GithubProvider;

#[async_trait]
impl Provider for GithubProvider {
    fn id(&self) -> &'static str {
        "github"
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

    async fn fetch_profile(&self, action: &Action) -> Result<Option<Profile>, OAuthError> {
        let response = action.request(api_request(USER_URL)).await?;
        if !response.is_ok() {
            return Ok(None);
        }
        let data: serde_json::Value = response.json()?;
        let Some(mut profile) =
            Profile::from_json(&data, "login", &[("name", "fname"), ("html_url", "site")])
        else {
            return Ok(None);
        };

        // the address is private unless the user:email scope was granted
        let response = action.request(api_request(EMAILS_URL)).await?;
        if response.is_ok() {
            if let Ok(emails) = response.json::<Vec<GithubEmail>>() {
                profile.email = primary_email(emails);
            }
        }
        Ok(Some(profile))
    }
}

fn api_request(url: &str) -> HttpRequest {
    HttpRequest::get(url)
        .with_header("User-Agent", USER_AGENT)
        .expect_json()
}

fn primary_email(emails: Vec<GithubEmail>) -> Option<String> {
    let mut fallback = None;
    for entry in emails {
        let Some(email) = entry.email.filter(|email| !email.is_empty()) else {
            continue;
        };
        if entry.primary {
            return Some(email);
        }
        fallback.get_or_insert(email);
    }
    fallback
}
