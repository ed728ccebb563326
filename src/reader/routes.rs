use axum::{
    Router,
    routing::{delete, get, post, put},
};

use super::handler;
use crate::handler::AppState;

// GET/POST on /categories/:id and the /highlights and /sentences routes take
// the parent id (document or category); PUT/DELETE take the row's own id.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/documents", get(handler::list_documents))
        .route("/documents", post(handler::create_document))
        .route("/documents/:id", get(handler::get_document))
        .route("/documents/:id", put(handler::update_document))
        .route("/documents/:id", delete(handler::delete_document))
        .route("/documents/:id/render", get(handler::render_document))
        .route("/categories/:id", get(handler::list_categories))
        .route("/categories/:id", post(handler::create_category))
        .route("/categories/:id", put(handler::update_category))
        .route("/categories/:id", delete(handler::delete_category))
        .route("/highlights/:id", get(handler::list_highlights))
        .route("/highlights/generate/:id", post(handler::generate_highlights))
        .route("/sentences/:id", post(handler::create_sentences))
        .route("/sentences/:id", get(handler::list_sentences))
}
