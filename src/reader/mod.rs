//! Reader Module
//!
//! Documents, their highlight categories, generated highlights and sentence
//! splits. Everything here is scoped to the signed-in user.
//!
//! # Usage
//!
//! ```rust,ignore
//! use adhd_reader::reader;
//!
//! let app = Router::new()
//!     .nest("/api", reader::routes())
//!     .with_state(app_state);
//!
//! let lib = reader::Reader::new(&db);
//! let doc = lib.create_document(user_id, "Title", content, &categories).await?;
//! ```

mod handler;
mod lib;
mod routes;

pub use handler::{GeneratedHighlights, RenderedDocument};
pub use lib::*;
pub use routes::routes;

/// Schema for documents, categories, highlights and sentences.
pub fn migrations() -> &'static [(&'static str, &'static str)] {
    &[("reader_001_schema.sql", include_str!("migrations/001_schema.sql"))]
}
