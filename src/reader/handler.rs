//! HTTP Handlers for the Reader API

use axum::{
    Json,
    extract::{Path, Query, State},
    response::Response,
};
use serde::{Deserialize, Serialize};

use super::{
    CategoryInput, CreateDocument, GenerationReport, Reader, UpdateCategory, UpdateDocument,
    normalize_categories,
};
use crate::api::{
    bad_gateway, bad_request, conflict, created, forbidden, internal_error, no_content, not_found, success,
};
use crate::auth::AuthUser;
use crate::error::is_unique_violation;
use crate::handler::AppState;
use crate::model::{Category, CategoryColor, Document, Highlight};
use crate::oracle::{categories_or_default, title_or_default};
use crate::render::{self, Segment};

// ============================================================================
// Query Parameters
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RenderParams {
    /// Comma separated category ids to leave undecorated.
    pub hidden: Option<String>,
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct CategoryHighlights {
    pub category: Category,
    pub highlights: Vec<Highlight>,
}

#[derive(Debug, Serialize)]
pub struct GeneratedHighlights {
    pub category: Category,
    pub highlights: Vec<Highlight>,
    pub report: GenerationReport,
}

#[derive(Debug, Serialize)]
pub struct RenderedDocument {
    pub document_id: i32,
    pub length: usize,
    pub hidden: Vec<i32>,
    pub segments: Vec<Segment>,
}

// ============================================================================
// Ownership
// ============================================================================

async fn owned_document(lib: &Reader<'_>, id: i32, user: &AuthUser) -> Result<Document, Response> {
    match lib.get_document(id).await {
        Ok(Some(doc)) if doc.user_id == user.id => Ok(doc),
        Ok(_) => Err(not_found("Document not found")),
        Err(e) => {
            tracing::error!("Failed to get document: {}", e);
            Err(internal_error("Failed to get document"))
        }
    }
}

async fn owned_category(lib: &Reader<'_>, id: i32, user: &AuthUser) -> Result<(Category, Document), Response> {
    let category = match lib.get_category(id).await {
        Ok(Some(category)) => category,
        Ok(None) => return Err(not_found("Category not found")),
        Err(e) => {
            tracing::error!("Failed to get category: {}", e);
            return Err(internal_error("Failed to get category"));
        }
    };

    match lib.get_document(category.document_id).await {
        Ok(Some(doc)) if doc.user_id == user.id => Ok((category, doc)),
        Ok(_) => Err(not_found("Category not found")),
        Err(e) => {
            tracing::error!("Failed to get document: {}", e);
            Err(internal_error("Failed to get category"))
        }
    }
}

// ============================================================================
// Document Handlers
// ============================================================================

pub async fn list_documents(State(state): State<AppState>, user: AuthUser) -> Response {
    let lib = Reader::new(&state.db);

    match lib.list_documents(user.id).await {
        Ok(documents) => success(documents),
        Err(e) => {
            tracing::error!("Failed to list documents: {}", e);
            internal_error("Failed to list documents")
        }
    }
}

pub async fn create_document(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateDocument>,
) -> Response {
    if payload.content.trim().is_empty() {
        return bad_request("Content is required");
    }

    let title = match payload.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        Some(title) => title.to_string(),
        None => title_or_default(state.oracle.as_ref(), &payload.content).await,
    };

    let categories = if payload.auto_generate_categories {
        categories_or_default(state.oracle.as_ref(), &payload.content).await
    } else {
        match normalize_categories(&payload.categories) {
            Ok(categories) => categories,
            Err(msg) => return bad_request(&msg),
        }
    };

    let lib = Reader::new(&state.db);
    match lib
        .create_document(user.id, &title, &payload.content, &categories)
        .await
    {
        Ok(doc) => {
            tracing::info!(
                document_id = doc.document.id,
                categories = doc.categories.len(),
                "document created"
            );
            created(doc)
        }
        Err(e) => {
            tracing::error!("Failed to create document: {:#}", e);
            internal_error("Failed to create document")
        }
    }
}

pub async fn get_document(State(state): State<AppState>, user: AuthUser, Path(id): Path<i32>) -> Response {
    let lib = Reader::new(&state.db);
    if let Err(resp) = owned_document(&lib, id, &user).await {
        return resp;
    }

    match lib.get_document_with_categories(id).await {
        Ok(Some(doc)) => success(doc),
        Ok(None) => not_found("Document not found"),
        Err(e) => {
            tracing::error!("Failed to get document: {}", e);
            internal_error("Failed to get document")
        }
    }
}

pub async fn update_document(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i32>,
    Json(mut payload): Json<UpdateDocument>,
) -> Response {
    if payload.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
        return bad_request("Title cannot be empty");
    }
    if payload.content.as_deref().is_some_and(|c| c.trim().is_empty()) {
        return bad_request("Content is required");
    }
    payload.title = payload.title.map(|t| t.trim().to_string());

    let lib = Reader::new(&state.db);
    if let Err(resp) = owned_document(&lib, id, &user).await {
        return resp;
    }

    match lib.update_document(id, payload).await {
        Ok(Some(doc)) => success(doc),
        Ok(None) => not_found("Document not found"),
        Err(e) => {
            tracing::error!("Failed to update document: {}", e);
            internal_error("Failed to update document")
        }
    }
}

pub async fn delete_document(State(state): State<AppState>, user: AuthUser, Path(id): Path<i32>) -> Response {
    let lib = Reader::new(&state.db);

    match lib.get_document(id).await {
        Ok(Some(doc)) if doc.user_id != user.id => return forbidden("Not authorized to delete this document"),
        Ok(Some(_)) => {}
        Ok(None) => return not_found("Document not found"),
        Err(e) => {
            tracing::error!("Failed to get document: {}", e);
            return internal_error("Failed to delete document");
        }
    }

    match lib.delete_document(id).await {
        Ok(true) => {
            tracing::info!(document_id = id, "document deleted");
            no_content()
        }
        Ok(false) => not_found("Document not found"),
        Err(e) => {
            tracing::error!("Failed to delete document: {}", e);
            internal_error("Failed to delete document")
        }
    }
}

pub async fn render_document(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i32>,
    Query(params): Query<RenderParams>,
) -> Response {
    let lib = Reader::new(&state.db);
    let doc = match owned_document(&lib, id, &user).await {
        Ok(doc) => doc,
        Err(resp) => return resp,
    };

    let categories = match lib.list_categories(id).await {
        Ok(categories) => categories,
        Err(e) => {
            tracing::error!("Failed to list categories: {}", e);
            return internal_error("Failed to render document");
        }
    };
    let highlights = match lib.list_highlights_by_document(id).await {
        Ok(highlights) => highlights,
        Err(e) => {
            tracing::error!("Failed to list highlights: {}", e);
            return internal_error("Failed to render document");
        }
    };

    let hidden = render::parse_hidden(params.hidden.as_deref());
    let decorations = render::decorations(&doc.content, &categories, &highlights, &hidden);
    let segments = render::segment(&doc.content, &decorations);

    let mut hidden: Vec<i32> = hidden.into_iter().collect();
    hidden.sort_unstable();

    success(RenderedDocument {
        document_id: doc.id,
        length: doc.content.chars().count(),
        hidden,
        segments,
    })
}

// ============================================================================
// Category Handlers
// ============================================================================

pub async fn list_categories(
    State(state): State<AppState>,
    user: AuthUser,
    Path(document_id): Path<i32>,
) -> Response {
    let lib = Reader::new(&state.db);
    if let Err(resp) = owned_document(&lib, document_id, &user).await {
        return resp;
    }

    match lib.list_categories(document_id).await {
        Ok(categories) => success(categories),
        Err(e) => {
            tracing::error!("Failed to list categories: {}", e);
            internal_error("Failed to list categories")
        }
    }
}

pub async fn create_category(
    State(state): State<AppState>,
    user: AuthUser,
    Path(document_id): Path<i32>,
    Json(payload): Json<CategoryInput>,
) -> Response {
    let lib = Reader::new(&state.db);
    if let Err(resp) = owned_document(&lib, document_id, &user).await {
        return resp;
    }

    let existing = match lib.list_categories(document_id).await {
        Ok(categories) => categories,
        Err(e) => {
            tracing::error!("Failed to list categories: {}", e);
            return internal_error("Failed to create category");
        }
    };

    // Normalize against the existing names so defaults and suffixes continue
    // where the document left off.
    let mut inputs: Vec<CategoryInput> = existing
        .iter()
        .map(|c| CategoryInput {
            name: Some(c.name.clone()),
            color: Some(c.color.as_str().to_string()),
        })
        .collect();
    inputs.push(payload);

    let (name, color) = match normalize_categories(&inputs) {
        Ok(mut normalized) => match normalized.pop() {
            Some(last) => last,
            None => return internal_error("Failed to create category"),
        },
        Err(msg) => return bad_request(&msg),
    };

    match lib.create_category(document_id, &name, color).await {
        Ok(category) => created(category),
        Err(e) if is_unique_violation(&e) => conflict("A category with that name already exists"),
        Err(e) => {
            tracing::error!("Failed to create category: {}", e);
            internal_error("Failed to create category")
        }
    }
}

pub async fn update_category(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateCategory>,
) -> Response {
    let name = payload.name.as_deref().map(str::trim);
    if name.is_some_and(str::is_empty) {
        return bad_request("Category name cannot be empty");
    }

    let color = match payload.color.as_deref() {
        Some(c) => match c.parse::<CategoryColor>() {
            Ok(color) => Some(color),
            Err(_) => {
                return bad_request(&format!("Invalid color. Allowed colors: {}", CategoryColor::allowed()));
            }
        },
        None => None,
    };

    let lib = Reader::new(&state.db);
    if let Err(resp) = owned_category(&lib, id, &user).await {
        return resp;
    }

    match lib.update_category(id, name, color).await {
        Ok(Some(category)) => success(category),
        Ok(None) => not_found("Category not found"),
        Err(e) if is_unique_violation(&e) => conflict("A category with that name already exists"),
        Err(e) => {
            tracing::error!("Failed to update category: {}", e);
            internal_error("Failed to update category")
        }
    }
}

pub async fn delete_category(State(state): State<AppState>, user: AuthUser, Path(id): Path<i32>) -> Response {
    let lib = Reader::new(&state.db);
    if let Err(resp) = owned_category(&lib, id, &user).await {
        return resp;
    }

    match lib.delete_category(id).await {
        Ok(true) => no_content(),
        Ok(false) => not_found("Category not found"),
        Err(e) => {
            tracing::error!("Failed to delete category: {}", e);
            internal_error("Failed to delete category")
        }
    }
}

// ============================================================================
// Highlight Handlers
// ============================================================================

pub async fn list_highlights(
    State(state): State<AppState>,
    user: AuthUser,
    Path(category_id): Path<i32>,
) -> Response {
    let lib = Reader::new(&state.db);
    let (category, _) = match owned_category(&lib, category_id, &user).await {
        Ok(found) => found,
        Err(resp) => return resp,
    };

    match lib.list_highlights_by_category(category_id).await {
        Ok(highlights) => success(CategoryHighlights { category, highlights }),
        Err(e) => {
            tracing::error!("Failed to list highlights: {}", e);
            internal_error("Failed to list highlights")
        }
    }
}

/// Ask the oracle for fresh snippets and swap them in. Resolution runs against
/// the content as stored at replace time. On oracle failure the stored
/// highlights are left alone.
pub async fn generate_highlights(
    State(state): State<AppState>,
    user: AuthUser,
    Path(category_id): Path<i32>,
) -> Response {
    let lib = Reader::new(&state.db);
    let (category, doc) = match owned_category(&lib, category_id, &user).await {
        Ok(found) => found,
        Err(resp) => return resp,
    };

    let snippets = match state.oracle.snippets(&doc.content, &category.name).await {
        Ok(snippets) => snippets,
        Err(e) => {
            tracing::error!(category_id, "Failed to generate highlights: {}", crate::unpack_error(&e));
            return bad_gateway("Failed to generate highlights");
        }
    };

    match lib.replace_highlights(category_id, &snippets).await {
        Ok(Some(regenerated)) => {
            let report = GenerationReport::from(&regenerated.resolution);
            tracing::info!(
                category_id,
                requested = report.requested,
                accepted = report.accepted,
                unmatched = report.unmatched,
                overlapping = report.overlapping,
                "replaced highlights"
            );
            success(GeneratedHighlights {
                category,
                highlights: regenerated.highlights,
                report,
            })
        }
        Ok(None) => not_found("Category not found"),
        Err(e) => {
            tracing::error!("Failed to store highlights: {}", e);
            internal_error("Failed to store highlights")
        }
    }
}

// ============================================================================
// Sentence Handlers
// ============================================================================

pub async fn create_sentences(
    State(state): State<AppState>,
    user: AuthUser,
    Path(document_id): Path<i32>,
) -> Response {
    let lib = Reader::new(&state.db);
    let doc = match owned_document(&lib, document_id, &user).await {
        Ok(doc) => doc,
        Err(resp) => return resp,
    };

    match lib.replace_sentences(doc.id, user.id, &doc.content).await {
        Ok(sentences) => created(sentences),
        Err(e) => {
            tracing::error!("Failed to create sentences: {}", e);
            internal_error("Failed to create sentences")
        }
    }
}

pub async fn list_sentences(
    State(state): State<AppState>,
    user: AuthUser,
    Path(document_id): Path<i32>,
) -> Response {
    let lib = Reader::new(&state.db);
    if let Err(resp) = owned_document(&lib, document_id, &user).await {
        return resp;
    }

    match lib.list_sentences(document_id).await {
        Ok(sentences) => success(sentences),
        Err(e) => {
            tracing::error!("Failed to list sentences: {}", e);
            internal_error("Failed to list sentences")
        }
    }
}
