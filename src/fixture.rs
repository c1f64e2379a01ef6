//! In-process fake provider for tests.
//!
//! Requests are routed on the first host label (the service name) and the
//! path, e.g. `http://twitter.example.org/10/auth_request`.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use url::Url;

use crate::http::{HttpClient, HttpRequest, HttpResponse, Method};
use crate::{Action, OAuthError, Profile, ProfileFetcher, ServiceType};

#[derive(Debug, Default)]
pub struct StubProvider {
    calls: Mutex<Vec<HttpRequest>>,
    counter: AtomicU64,
}

impl StubProvider {
    pub fn calls(&self) -> Vec<HttpRequest> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    fn next(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn form(pairs: &[(&str, String)]) -> String {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (key, value) in pairs {
            serializer.append_pair(key, value);
        }
        serializer.finish()
    }

    fn profile() -> String {
        serde_json::json!({
            "uname": "john",
            "fname": "John Smith",
            "email": "john@example.net",
            "site": [],
        })
        .to_string()
    }

    fn oauth10_post(&self, path: &str, service: &str) -> HttpResponse {
        match path {
            "/10/auth_request" => {
                let token = format!("token-{}", self.next());
                let body = match service {
                    "twitter" => Self::form(&[
                        ("oauth_token", token),
                        ("oauth_token_secret", "token-secret".into()),
                        ("oauth_callback_confirmed", "true".into()),
                        ("oauth_verifier", "optional-verifier".into()),
                    ]),
                    "trakt" => Self::form(&[
                        ("oauth_token", token),
                        ("oauth_token_secret", "token-secret".into()),
                        ("oauth_callback_confirmed", "true".into()),
                    ]),
                    "tumblr" => Self::form(&[
                        ("oauth_token", token),
                        ("oauth_token_secret", "token-secret".into()),
                        ("oauth_callback_confirmed", "invalid".into()),
                    ]),
                    "trello" => Self::form(&[("oauth_token_secret", "token-secret".into())]),
                    _ => return HttpResponse::new(503, "oops=fail"),
                };
                HttpResponse::new(200, body)
            }
            "/10/access" => match service {
                "flickr" => HttpResponse::new(503, "oops=fail"),
                "plurk" => HttpResponse::new(
                    200,
                    Self::form(&[("oauth_token", format!("access-token-{}", self.next()))]),
                ),
                _ => HttpResponse::new(
                    200,
                    Self::form(&[
                        ("oauth_token", format!("access-token-{}", self.next())),
                        ("oauth_token_secret", "access-token-secret".into()),
                    ]),
                ),
            },
            _ => HttpResponse::new(404, ""),
        }
    }

    fn oauth10_get(&self, path: &str, service: &str, request: &HttpRequest) -> HttpResponse {
        match path {
            "/10/auth" if service == "twitter" => HttpResponse::new(
                200,
                format!(
                    "http://localhost/?{}",
                    Self::form(&[
                        ("oauth_token", format!("token-{}", self.next())),
                        ("oauth_verifier", "token-verifier".into()),
                    ])
                ),
            ),
            "/10/auth" => HttpResponse::new(404, "http://localhost/?fail"),
            "/10/api/me" => {
                let signed = request
                    .header("Authorization")
                    .is_some_and(|value| value.starts_with("OAuth "));
                match (signed, service) {
                    (false, _) => HttpResponse::new(403, "[]"),
                    (true, "tumblr") => HttpResponse::new(200, r#"{"oops":"tumblr"}"#),
                    (true, "twitter") => HttpResponse::new(200, Self::profile()),
                    (true, _) => HttpResponse::new(404, "[]"),
                }
            }
            _ => HttpResponse::new(404, ""),
        }
    }

    fn oauth20_get(&self, path: &str, service: &str, request: &HttpRequest) -> HttpResponse {
        match path {
            "/20/auth" => HttpResponse::new(
                200,
                format!(
                    "http://localhost/?{}",
                    Self::form(&[
                        ("code", format!("token-{}", self.next())),
                        ("state", "token-verifier".into()),
                    ])
                ),
            ),
            "/20/api/me" => {
                let bearer = request
                    .header("Authorization")
                    .is_some_and(|value| value.starts_with("Bearer "))
                    || request.query.iter().any(|(key, _)| key == "access_token");
                match (bearer, service) {
                    (false, _) => HttpResponse::new(403, ""),
                    (true, "linkedin") => HttpResponse::new(200, r#"{"oops":"linkedin"}"#),
                    (true, "reddit") => HttpResponse::new(200, Self::profile()),
                    (true, _) => HttpResponse::new(404, "[]"),
                }
            }
            _ => HttpResponse::new(404, ""),
        }
    }

    fn oauth20_post(&self, path: &str, service: &str) -> HttpResponse {
        if path != "/20/access" {
            return HttpResponse::new(404, "");
        }
        match service {
            "broken" => HttpResponse::new(500, r#"{"error":"server_error"}"#),
            "notoken" => HttpResponse::new(200, r#"{"token_type":"bearer"}"#),
            _ => HttpResponse::new(
                200,
                serde_json::json!({
                    "access_token": format!("access-{}", self.next()),
                    "expires_in": 3600,
                    "token_type": "bearer",
                    "scope": null,
                    "refresh_token": format!("refresh-{}", self.next()),
                })
                .to_string(),
            ),
        }
    }
}

#[async_trait]
impl HttpClient for StubProvider {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, OAuthError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(request.clone());
        }
        let url = Url::parse(&request.url)?;
        let service = url
            .host_str()
            .and_then(|host| host.split('.').next())
            .unwrap_or_default()
            .to_string();
        let path = url.path();

        let response = match (request.method, path.get(..3)) {
            (Method::Get, Some("/10")) => self.oauth10_get(path, &service, &request),
            (Method::Post, Some("/10")) => self.oauth10_post(path, &service),
            (Method::Get, Some("/20")) => self.oauth20_get(path, &service, &request),
            (Method::Post, Some("/20")) => self.oauth20_post(path, &service),
            _ => HttpResponse::new(404, ""),
        };
        Ok(response)
    }
}

/// Reads `{service}.example.org/{type}/api/me` through the action.
#[derive(Debug, Default)]
pub struct FixtureProfiles;

#[async_trait]
impl ProfileFetcher for FixtureProfiles {
    async fn fetch_profile(
        &self,
        action: &Action,
        service_type: ServiceType,
        service_name: &str,
    ) -> Result<Option<Profile>, OAuthError> {
        let url = format!("http://{service_name}.example.org/{service_type}/api/me");
        let response = action.request(HttpRequest::get(url).expect_json()).await?;
        if !response.is_ok() {
            return Ok(None);
        }
        let data: serde_json::Value = match response.json() {
            Ok(data) => data,
            Err(_) => return Ok(None),
        };
        Ok(Profile::from_json(
            &data,
            "uname",
            &[("fname", "fname"), ("email", "email"), ("site", "site")],
        ))
    }
}

/// Answers fixed responses keyed by request URL (query excluded).
#[derive(Debug, Default)]
pub struct CannedProvider {
    responses: Vec<(String, HttpResponse)>,
    calls: Mutex<Vec<HttpRequest>>,
}

impl CannedProvider {
    pub fn with(mut self, url: &str, status: u16, body: impl Into<String>) -> Self {
        self.responses
            .push((url.to_string(), HttpResponse::new(status, body)));
        self
    }

    pub fn calls(&self) -> Vec<HttpRequest> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl HttpClient for CannedProvider {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, OAuthError> {
        let response = self
            .responses
            .iter()
            .find(|(url, _)| *url == request.url)
            .map(|(_, response)| response.clone())
            .unwrap_or_else(|| HttpResponse::new(404, ""));
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(request);
        }
        Ok(response)
    }
}
