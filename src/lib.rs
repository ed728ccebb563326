use std::error::Error;

use axum::{Router, routing::get};

use crate::handler::{AppState, healthcheck, ping};

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handler;
pub mod model;
pub mod oracle;
pub mod reader;
pub mod render;
pub mod resolver;

/// All HTTP routes, without transport layers such as CORS.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(healthcheck))
        .route("/ping", get(ping))
        .nest("/api/auth", auth::routes())
        .nest("/api", reader::routes())
        .with_state(state)
}

pub fn unpack_error(err: &dyn Error) -> String {
    let mut parts = Vec::new();
    parts.push(err.to_string());
    let mut current = err.source();
    while let Some(source) = current {
        parts.push(source.to_string());
        current = source.source();
    }
    parts.join(": ")
}
