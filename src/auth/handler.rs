//! HTTP handlers for registration and sessions

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use super::{Auth, AuthUser, Login, Register, token_from_headers};
use crate::api::{ApiResponse, bad_request, created, internal_error, success, unauthorized};
use crate::error::AuthError;
use crate::handler::AppState;
use crate::model::User;

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: User,
    pub token: String,
}

fn session_cookie(token: &str, max_age_secs: i64) -> String {
    format!("token={token}; HttpOnly; Path=/; SameSite=Lax; Max-Age={max_age_secs}")
}

pub async fn register(State(state): State<AppState>, Json(payload): Json<Register>) -> Response {
    let conn = state.db.connection().await;
    let auth = Auth::new(&conn);

    match auth.register(payload).await {
        Ok(user) => {
            tracing::info!(user_id = user.id, "user registered");
            created(user)
        }
        Err(e @ (AuthError::Validation(_) | AuthError::EmailTaken)) => bad_request(&e.to_string()),
        Err(e) => {
            tracing::error!("Failed to register user: {}", crate::unpack_error(&e));
            internal_error("Internal server error")
        }
    }
}

pub async fn login(State(state): State<AppState>, Json(payload): Json<Login>) -> Response {
    let conn = state.db.connection().await;
    let auth = Auth::new(&conn);

    match auth.login(payload, state.session_ttl).await {
        Ok((user, token)) => {
            tracing::info!(user_id = user.id, "user logged in");
            let cookie = session_cookie(&token, state.session_ttl.num_seconds());
            (
                StatusCode::OK,
                [(header::SET_COOKIE, cookie)],
                Json(ApiResponse {
                    data: LoginResponse { user, token },
                }),
            )
                .into_response()
        }
        Err(AuthError::InvalidCredentials) => unauthorized("Invalid email or password"),
        Err(e) => {
            tracing::error!("Failed to log in: {}", crate::unpack_error(&e));
            internal_error("Error logging in")
        }
    }
}

pub async fn me(State(state): State<AppState>, user: AuthUser) -> Response {
    let conn = state.db.connection().await;
    let auth = Auth::new(&conn);

    match auth.get_user(user.id).await {
        Ok(Some(user)) => success(user),
        Ok(None) => unauthorized("Unauthorized"),
        Err(e) => {
            tracing::error!("Failed to get user: {}", e);
            internal_error("Failed to get user")
        }
    }
}

pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(token) = token_from_headers(&headers) {
        let conn = state.db.connection().await;
    let auth = Auth::new(&conn);
        if let Err(e) = auth.logout(&token).await {
            tracing::error!("Failed to delete session: {}", e);
        }
    }

    (
        StatusCode::OK,
        [(header::SET_COOKIE, session_cookie("", 0))],
        Json(ApiResponse {
            data: "Logout successful",
        }),
    )
        .into_response()
}
