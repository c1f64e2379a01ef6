//! axum adapter for [`OAuthRoute`].

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, RawQuery, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tokio::net::TcpListener;

use crate::config::ROUTE_PREFIX;
use crate::route::{OAuthRoute, RouteResponse};
use crate::{CallbackParams, OAuthError};

#[derive(Clone)]
struct ServerState {
    route: Arc<OAuthRoute>,
}

/// `POST .../auth`, `GET .../callback` and `GET .../fake_login` under
/// `/byway/oauth/{service_type}/{service_name}`.
pub fn router(route: Arc<OAuthRoute>) -> Router {
    let base = format!("{ROUTE_PREFIX}/{{service_type}}/{{service_name}}");
    Router::new()
        .route(&format!("{base}/auth"), post(auth_handler))
        .route(&format!("{base}/callback"), get(callback_handler))
        .route(&format!("{base}/fake_login"), get(fake_login_handler))
        .with_state(ServerState { route })
}

pub async fn serve(route: Arc<OAuthRoute>, bind: &str) -> Result<(), OAuthError> {
    let listener = TcpListener::bind(bind).await?;
    tracing::info!(%bind, "oauth routes listening");
    axum::serve(listener, router(route)).await?;
    Ok(())
}

async fn auth_handler(
    State(state): State<ServerState>,
    Path((service_type, service_name)): Path<(String, String)>,
) -> Response {
    render(state.route.auth(&service_type, &service_name).await)
}

async fn callback_handler(
    State(state): State<ServerState>,
    Path((service_type, service_name)): Path<(String, String)>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Response {
    let params = CallbackParams::from_query(&query.unwrap_or_default());
    let session = session_token(&headers, &state.route.config().token_name);
    let response = state
        .route
        .callback(&service_type, &service_name, &params, session.as_deref())
        .await;
    render(response)
}

async fn fake_login_handler(
    State(state): State<ServerState>,
    Path((service_type, service_name)): Path<(String, String)>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Response {
    let params = CallbackParams::from_query(&query.unwrap_or_default());
    let session = session_token(&headers, &state.route.config().token_name);
    let response = state
        .route
        .fake_login(&service_type, &service_name, params.get("email"), session.as_deref())
        .await;
    render(response)
}

fn render(response: RouteResponse) -> Response {
    match response {
        RouteResponse::Json { status, body } => (status_code(status), Json(body)).into_response(),
        RouteResponse::Abort { status } => status_code(status).into_response(),
        RouteResponse::Redirect { location, cookie } => {
            let Ok(location) = HeaderValue::from_str(&location) else {
                tracing::error!(%location, "redirect location is not a valid header");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            };
            let mut response = StatusCode::FOUND.into_response();
            response.headers_mut().insert(header::LOCATION, location);
            if let Some(cookie) = cookie {
                match HeaderValue::from_str(&cookie.header_value()) {
                    Ok(value) => {
                        response.headers_mut().insert(header::SET_COOKIE, value);
                    }
                    Err(_) => {
                        tracing::error!(cookie = %cookie.name, "session cookie is not a valid header");
                        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
                    }
                }
            }
            response
        }
    }
}

fn status_code(status: u16) -> StatusCode {
    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Value of cookie `name` from any `Cookie` header.
fn session_token(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value.to_string())
}
