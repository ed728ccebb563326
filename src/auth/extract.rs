use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
    response::Response,
};

use super::Auth;
use crate::api::{internal_error, unauthorized};
use crate::handler::AppState;

/// The user behind the request's session token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i32,
}

/// Session token from the `token` cookie, else from `Authorization: Bearer`.
pub fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    let from_cookie = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().strip_prefix("token="))
        .find(|t| !t.is_empty());

    if let Some(token) = from_cookie {
        return Some(token.to_string());
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split_once(' '))
        .filter(|(scheme, _)| scheme.eq_ignore_ascii_case("bearer"))
        .map(|(_, token)| token.trim().to_string())
        .filter(|t| !t.is_empty())
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(token) = token_from_headers(&parts.headers) else {
            tracing::debug!("no session token on request");
            return Err(unauthorized("Unauthorized"));
        };

        let conn = state.db.connection().await;
        match Auth::new(&conn).user_for_token(&token).await {
            Ok(Some(user)) => Ok(AuthUser { id: user.id }),
            Ok(None) => Err(unauthorized("Invalid or expired token")),
            Err(e) => {
                tracing::error!("Failed to look up session: {}", e);
                Err(internal_error("Failed to verify session"))
            }
        }
    }
}
