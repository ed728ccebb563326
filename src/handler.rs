use std::sync::Arc;

use axum::response::Response;
use tracing::info;

use crate::api::success;
use crate::db::Database;
use crate::oracle::SnippetOracle;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub oracle: Arc<dyn SnippetOracle>,
    pub session_ttl: chrono::Duration,
}

impl AppState {
    pub fn new(db: Arc<Database>, oracle: Arc<dyn SnippetOracle>, session_ttl_hours: i64) -> Self {
        AppState {
            db,
            oracle,
            session_ttl: chrono::Duration::hours(session_ttl_hours),
        }
    }
}

pub async fn healthcheck() -> Response {
    info!("got healthcheck request");
    success("ok")
}

pub async fn ping() -> Response {
    success("pong")
}
