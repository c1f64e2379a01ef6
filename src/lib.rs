//! Provider-agnostic OAuth 1.0a and OAuth 2.0 relying-party core.
//!
//! A [`ServiceRegistry`] holds the configured services and hands out
//! [`Permission`]s (the authorization handshake) and [`Action`]s (signed
//! requests with an access token). [`OAuthRoute`] drives the browser flow
//! on top of them and provisions a passwordless session through a
//! [`SessionStore`] once the provider profile is known.

mod config;
mod error;
mod http;
mod nonce;
mod oauth10;
mod oauth20;
mod permission;
mod profile;
mod providers;
mod registry;
mod route;
#[cfg(feature = "server")]
mod server;
mod signature;
mod store;
mod types;

#[cfg(test)]
mod fixture;

pub use config::{AppConfig, ROUTE_PREFIX, ServerConfig, ServiceEntry};
pub use error::{ErrorCode, OAuthError};
pub use http::{HttpClient, HttpRequest, HttpResponse, Method, ReqwestClient};
pub use nonce::{FixedNonce, NonceSource, SystemNonce, generate_nonce};
pub use oauth10::{OAuth10Action, OAuth10Permission, RequestToken};
pub use oauth20::{OAuth20Action, OAuth20Permission};
pub use permission::{Action, Permission};
pub use profile::ProfileFetcher;
pub use providers::{
    GithubProvider, GoogleProvider, Provider, ProviderSet, RedditProvider, TwitterProvider,
};
pub use registry::{Finetune, RequestContext, ServiceConfig, ServiceRegistry};
pub use route::{JsonReply, OAuthRoute, RouteConfig, RouteResponse, SessionCookie};
#[cfg(feature = "server")]
pub use server::{router, serve};
pub use signature::{
    OAUTH_VERSION, SIGNATURE_METHOD, SignedParams, Signer, base_string, hmac_sha1_base64,
    percent_encode, signing_key,
};
pub use store::{Bio, MemoryStore, Provision, SessionGrant, SessionStore, StoredTokens, UserRecord};
pub use types::{CallbackParams, Profile, ServiceKey, ServiceType, TokenBundle};
