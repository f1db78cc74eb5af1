//! Bearer token check for every protected route, `/ws` included

use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::debug;

/// Why a request was turned away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    MissingToken,
    InvalidFormat,
    InvalidToken,
}

impl AuthError {
    fn status(self) -> StatusCode {
        match self {
            AuthError::InvalidToken => StatusCode::FORBIDDEN,
            AuthError::MissingToken | AuthError::InvalidFormat => StatusCode::UNAUTHORIZED,
        }
    }

    fn message(self) -> &'static str {
        match self {
            AuthError::MissingToken => "missing Authorization header",
            AuthError::InvalidFormat => "invalid Authorization format (expected: Bearer <token>)",
            AuthError::InvalidToken => "invalid token",
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.message() }))).into_response()
    }
}

/// Extract the token from `Authorization: Bearer <token>`
fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingToken)?
        .to_str()
        .map_err(|_| AuthError::InvalidFormat)?;

    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::InvalidFormat)
}

pub async fn auth_middleware(
    State(expected): State<String>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let presented = bearer_token(request.headers())?;

    if presented != expected {
        debug!(path = %request.uri().path(), "rejected request with wrong token");
        return Err(AuthError::InvalidToken);
    }

    Ok(next.run(request).await)
}
