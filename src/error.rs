use serde::Serialize;
use thiserror::Error;

/// Stable error codes reported to callers of the auth and callback routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Required path or query parameters are missing.
    IncompleteData,
    /// The `(type, name)` pair is not registered.
    ServiceUnknown,
    /// The provider did not answer with HTTP 200, or the exchange failed on
    /// the wire.
    ServiceError,
    /// OAuth 1.0 request-token phase failed, no authorize URL available.
    AccessUrlMissing,
    /// The provider answered 200 but without the expected token fields.
    TokenMissing,
    /// A callback arrived while the browser already holds a valid session.
    UserAlreadyLoggedIn,
}

impl ErrorCode {
    pub fn as_u16(self) -> u16 {
        match self {
            Self::IncompleteData => 0x0100,
            Self::ServiceUnknown => 0x0101,
            Self::ServiceError => 0x0102,
            Self::AccessUrlMissing => 0x0103,
            Self::TokenMissing => 0x0104,
            Self::UserAlreadyLoggedIn => 0x0105,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::IncompleteData => "INCOMPLETE_DATA",
            Self::ServiceUnknown => "SERVICE_UNKNOWN",
            Self::ServiceError => "SERVICE_ERROR",
            Self::AccessUrlMissing => "ACCESS_URL_MISSING",
            Self::TokenMissing => "TOKEN_MISSING",
            Self::UserAlreadyLoggedIn => "USER_ALREADY_LOGGED_IN",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u16(self.as_u16())
    }
}

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("os rng error: {message}")]
    OsRng { message: String },

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid header: {name}={value}")]
    InvalidHeader { name: String, value: String },

    #[error("unsupported http method: {0}")]
    UnsupportedMethod(String),

    #[error("invalid request url: {0}")]
    InvalidRequestUrl(String),

    #[error("signing error: {0}")]
    Signing(String),

    #[error("invalid service type: '{0}'")]
    InvalidServiceType(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("missing parameter: {field}")]
    IncompleteData { field: String },

    #[error("unknown service: {service_type}/{service_name}")]
    ServiceUnknown {
        service_type: String,
        service_name: String,
    },

    #[error("http status {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("invalid response: {message}")]
    InvalidResponse { message: String, body: String },

    #[error("authorization url not obtained: {reason}")]
    AccessUrlMissing { reason: String },

    #[error("token missing from provider response: {field}")]
    TokenMissing { field: String },

    #[error("refresh not available: {reason}")]
    RefreshUnavailable { reason: String },

    #[error("profile not obtained for {service}")]
    ProfileUnavailable { service: String },

    #[error("storage error: {0}")]
    Storage(String),
}

impl OAuthError {
    pub(crate) fn incomplete(field: impl Into<String>) -> Self {
        Self::IncompleteData {
            field: field.into(),
        }
    }

    pub(crate) fn token_missing(field: impl Into<String>) -> Self {
        Self::TokenMissing {
            field: field.into(),
        }
    }

    /// Maps the error onto the stable code taxonomy.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::IncompleteData { .. }
            | Self::UnsupportedMethod(_)
            | Self::InvalidRequestUrl(_) => ErrorCode::IncompleteData,
            Self::ServiceUnknown { .. } | Self::InvalidServiceType(_) => ErrorCode::ServiceUnknown,
            Self::AccessUrlMissing { .. } => ErrorCode::AccessUrlMissing,
            Self::TokenMissing { .. } | Self::RefreshUnavailable { .. } => ErrorCode::TokenMissing,
            Self::Io(_)
            | Self::OsRng { .. }
            | Self::Url(_)
            | Self::Http(_)
            | Self::InvalidHeader { .. }
            | Self::Signing(_)
            | Self::Config(_)
            | Self::HttpStatus { .. }
            | Self::InvalidResponse { .. }
            | Self::ProfileUnavailable { .. }
            | Self::Storage(_) => ErrorCode::ServiceError,
        }
    }
}
