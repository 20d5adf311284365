use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use super::repo_types::UnknownRole;

/// Errors raised while authenticating or authorizing a request.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("missing or malformed Authorization header")]
    MissingToken,

    #[error("token signature does not verify")]
    InvalidSignature,

    #[error("token expired")]
    Expired,

    #[error("token claims are malformed")]
    MalformedClaims,

    #[error("user unknown or inactive")]
    Unauthenticated,

    #[error("role not allowed")]
    Forbidden,

    #[error("{0} already registered")]
    DuplicateIdentity(&'static str),

    #[error("oauth provider response is missing `{0}`")]
    OAuthClaimMissing(&'static str),

    #[error("oauth handshake failed: {0}")]
    Handshake(String),

    #[error("unknown oauth provider `{0}`")]
    UnknownProvider(String),

    #[error(transparent)]
    InvalidRole(#[from] UnknownRole),

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidCredentials
            | Self::MissingToken
            | Self::InvalidSignature
            | Self::Expired
            | Self::MalformedClaims
            | Self::Unauthenticated
            | Self::OAuthClaimMissing(_)
            | Self::Handshake(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::DuplicateIdentity(_) | Self::InvalidRole(_) | Self::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::UnknownProvider(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing message. Never says which half of a credential was wrong.
    fn detail(&self) -> String {
        match self {
            Self::InvalidCredentials => "Incorrect username or password".into(),
            Self::MissingToken
            | Self::InvalidSignature
            | Self::Expired
            | Self::MalformedClaims
            | Self::Unauthenticated => "Could not validate credentials".into(),
            Self::OAuthClaimMissing(_) | Self::Handshake(_) => "OAuth login failed".into(),
            Self::Forbidden => "Insufficient role for this action".into(),
            Self::DuplicateIdentity(_) => "Username or email already registered".into(),
            Self::UnknownProvider(p) => format!("Unknown OAuth provider: {p}"),
            Self::InvalidRole(e) => e.to_string(),
            Self::BadRequest(msg) => msg.clone(),
            Self::Internal(_) => "Internal server error".into(),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if let Self::Internal(e) = &self {
            error!(error = %e, "internal auth error");
        }

        let mut res = (status, Json(json!({ "detail": self.detail() }))).into_response();
        if status == StatusCode::UNAUTHORIZED {
            res.headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        res
    }
}
