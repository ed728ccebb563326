use std::sync::LazyLock;

use anyhow::Result;
use libsql::Connection;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::db::Database;
use crate::model::{Category, CategoryColor, Document, DocumentWithCategories, Highlight, Sentence};
use crate::resolver::{Resolution, resolve};

pub const UNTITLED_CATEGORY: &str = "Untitled Category";

static SENTENCE_END: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[.!?]+\s+").expect("valid regex"));

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryInput {
    pub name: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateDocument {
    pub content: String,
    pub title: Option<String>,
    #[serde(default, alias = "autoGenerateCategories")]
    pub auto_generate_categories: bool,
    #[serde(default)]
    pub categories: Vec<CategoryInput>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateDocument {
    pub title: Option<String>,
    pub content: Option<String>,
    #[serde(alias = "isPublic")]
    pub is_public: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateCategory {
    pub name: Option<String>,
    pub color: Option<String>,
}

/// What happened to the oracle's candidates during one regeneration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationReport {
    pub requested: usize,
    pub accepted: usize,
    pub unmatched: usize,
    pub overlapping: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<&Resolution> for GenerationReport {
    fn from(r: &Resolution) -> Self {
        let message = if r.requested == 0 {
            Some("The oracle returned no candidate highlights".to_string())
        } else if r.is_empty() {
            Some("None of the candidate highlights matched the document text".to_string())
        } else {
            None
        };

        GenerationReport {
            requested: r.requested,
            accepted: r.spans.len(),
            unmatched: r.unmatched(),
            overlapping: r.overlapping(),
            message,
        }
    }
}

/// Default blank names, de-duplicate clashing ones with a numeric suffix and
/// fill missing colors in palette order. Fails on a color outside the palette.
pub fn normalize_categories(inputs: &[CategoryInput]) -> Result<Vec<(String, CategoryColor)>, String> {
    let mut out: Vec<(String, CategoryColor)> = Vec::with_capacity(inputs.len());

    for (i, input) in inputs.iter().enumerate() {
        let base = input
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(UNTITLED_CATEGORY);

        let mut name = base.to_string();
        let mut n = 2;
        while out.iter().any(|(taken, _)| *taken == name) {
            name = format!("{base} {n}");
            n += 1;
        }

        let color = match input.color.as_deref() {
            Some(c) => c
                .parse::<CategoryColor>()
                .map_err(|_| format!("Color must be one of: {}", CategoryColor::allowed()))?,
            None => CategoryColor::nth(i),
        };

        out.push((name, color));
    }

    Ok(out)
}

/// Split content into sentences at runs of `.`, `!` or `?` followed by
/// whitespace. Terminal punctuation stays with its sentence.
pub fn split_sentences(content: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut last = 0;

    for m in SENTENCE_END.find_iter(content) {
        let punct_end = m.start() + m.as_str().trim_end().len();
        sentences.push(&content[last..punct_end]);
        last = m.end();
    }
    sentences.push(&content[last..]);

    sentences
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Highlights written by one regeneration, with the resolution they came from.
#[derive(Debug, Clone)]
pub struct Regenerated {
    pub resolution: Resolution,
    pub highlights: Vec<Highlight>,
}

/// Store for documents and everything hanging off them.
///
/// Each method holds the database connection for its whole duration, so a
/// multi-statement write is never observed half done.
pub struct Reader<'a> {
    db: &'a Database,
}

impl<'a> Reader<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    // ------------------------------------------------------------------
    // Documents
    // ------------------------------------------------------------------

    pub async fn list_documents(&self, user_id: i32) -> Result<Vec<Document>> {
        let query = r#"
            SELECT id, user_id, title, content, is_public, created_at, updated_at
            FROM documents
            WHERE user_id = ?
            ORDER BY created_at DESC, id DESC
        "#;

        let conn = self.db.connection().await;
        let mut rows = conn.query(query, libsql::params![user_id]).await?;
        let mut documents = Vec::new();
        while let Some(row) = rows.next().await? {
            documents.push(Self::row_to_document(&row)?);
        }
        Ok(documents)
    }

    pub async fn get_document(&self, id: i32) -> Result<Option<Document>> {
        let conn = self.db.connection().await;
        Self::fetch_document(&conn, id).await
    }

    pub async fn get_document_with_categories(&self, id: i32) -> Result<Option<DocumentWithCategories>> {
        let conn = self.db.connection().await;
        let Some(document) = Self::fetch_document(&conn, id).await? else {
            return Ok(None);
        };
        let categories = Self::fetch_categories(&conn, id).await?;
        Ok(Some(DocumentWithCategories { document, categories }))
    }

    /// Create a document and its categories in one transaction.
    pub async fn create_document(
        &self,
        user_id: i32,
        title: &str,
        content: &str,
        categories: &[(String, CategoryColor)],
    ) -> Result<DocumentWithCategories> {
        let conn = self.db.connection().await;
        Database::begin(&conn).await?;
        let result = Self::create_document_on(&conn, user_id, title, content, categories).await;
        Database::finish(&conn, result).await
    }

    async fn create_document_on(
        conn: &Connection,
        user_id: i32,
        title: &str,
        content: &str,
        categories: &[(String, CategoryColor)],
    ) -> Result<DocumentWithCategories> {
        let query = r#"
            INSERT INTO documents (user_id, title, content)
            VALUES (?, ?, ?)
            RETURNING id, user_id, title, content, is_public, created_at, updated_at
        "#;

        let mut rows = conn.query(query, libsql::params![user_id, title, content]).await?;
        let document = match rows.next().await? {
            Some(row) => Self::row_to_document(&row)?,
            None => anyhow::bail!("Failed to create document"),
        };

        let mut created = Vec::with_capacity(categories.len());
        for (name, color) in categories {
            created.push(Self::insert_category(conn, document.id, name, *color).await?);
        }

        Ok(DocumentWithCategories {
            document,
            categories: created,
        })
    }

    /// Apply the given fields. A content change drops the document's
    /// highlights and sentences, whose offsets no longer apply.
    pub async fn update_document(&self, id: i32, input: UpdateDocument) -> Result<Option<Document>> {
        let conn = self.db.connection().await;
        Database::begin(&conn).await?;
        let result = Self::update_document_on(&conn, id, input).await;
        Database::finish(&conn, result).await
    }

    async fn update_document_on(conn: &Connection, id: i32, input: UpdateDocument) -> Result<Option<Document>> {
        let Some(current) = Self::fetch_document(conn, id).await? else {
            return Ok(None);
        };

        let mut updates = Vec::new();
        let mut params: Vec<libsql::Value> = Vec::new();

        if let Some(title) = &input.title {
            updates.push("title = ?");
            params.push(title.clone().into());
        }
        if let Some(is_public) = input.is_public {
            updates.push("is_public = ?");
            params.push((is_public as i32).into());
        }
        let content_changed = input.content.as_ref().is_some_and(|c| *c != current.content);
        if let Some(content) = &input.content {
            updates.push("content = ?");
            params.push(content.clone().into());
        }

        if updates.is_empty() {
            return Ok(Some(current));
        }

        updates.push("updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')");
        params.push(id.into());

        let query = format!("UPDATE documents SET {} WHERE id = ?", updates.join(", "));
        conn.execute(&query, params).await?;

        if content_changed {
            let cleared = conn
                .execute(
                    "DELETE FROM highlights WHERE category_id IN (SELECT id FROM categories WHERE document_id = ?)",
                    libsql::params![id],
                )
                .await?;
            conn.execute("DELETE FROM sentences WHERE document_id = ?", libsql::params![id])
                .await?;
            tracing::info!(document_id = id, cleared, "content changed, stale highlights removed");
        }

        Self::fetch_document(conn, id).await
    }

    pub async fn delete_document(&self, id: i32) -> Result<bool> {
        let conn = self.db.connection().await;
        Database::begin(&conn).await?;

        let result = async {
            conn.execute(
                "DELETE FROM highlights WHERE category_id IN (SELECT id FROM categories WHERE document_id = ?)",
                libsql::params![id],
            )
            .await?;
            conn.execute("DELETE FROM categories WHERE document_id = ?", libsql::params![id])
                .await?;
            conn.execute("DELETE FROM sentences WHERE document_id = ?", libsql::params![id])
                .await?;
            let deleted = conn
                .execute("DELETE FROM documents WHERE id = ?", libsql::params![id])
                .await?;
            Ok::<bool, anyhow::Error>(deleted > 0)
        }
        .await;

        Database::finish(&conn, result).await
    }

    async fn fetch_document(conn: &Connection, id: i32) -> Result<Option<Document>> {
        let query = r#"
            SELECT id, user_id, title, content, is_public, created_at, updated_at
            FROM documents WHERE id = ?
        "#;

        let mut rows = conn.query(query, libsql::params![id]).await?;
        if let Some(row) = rows.next().await? {
            Ok(Some(Self::row_to_document(&row)?))
        } else {
            Ok(None)
        }
    }

    fn row_to_document(row: &libsql::Row) -> Result<Document> {
        Ok(Document {
            id: row.get(0)?,
            user_id: row.get(1)?,
            title: row.get(2)?,
            content: row.get(3)?,
            is_public: row.get::<i32>(4)? != 0,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    // ------------------------------------------------------------------
    // Categories
    // ------------------------------------------------------------------

    pub async fn list_categories(&self, document_id: i32) -> Result<Vec<Category>> {
        let conn = self.db.connection().await;
        Self::fetch_categories(&conn, document_id).await
    }

    pub async fn get_category(&self, id: i32) -> Result<Option<Category>> {
        let conn = self.db.connection().await;
        Self::fetch_category(&conn, id).await
    }

    pub async fn create_category(&self, document_id: i32, name: &str, color: CategoryColor) -> Result<Category> {
        let conn = self.db.connection().await;
        Self::insert_category(&conn, document_id, name, color).await
    }

    pub async fn update_category(
        &self,
        id: i32,
        name: Option<&str>,
        color: Option<CategoryColor>,
    ) -> Result<Option<Category>> {
        let conn = self.db.connection().await;

        let mut updates = Vec::new();
        let mut params: Vec<libsql::Value> = Vec::new();

        if let Some(name) = name {
            updates.push("name = ?");
            params.push(name.to_string().into());
        }
        if let Some(color) = color {
            updates.push("color = ?");
            params.push(color.as_str().to_string().into());
        }

        if updates.is_empty() {
            return Self::fetch_category(&conn, id).await;
        }

        params.push(id.into());
        let query = format!("UPDATE categories SET {} WHERE id = ?", updates.join(", "));
        conn.execute(&query, params).await?;

        Self::fetch_category(&conn, id).await
    }

    pub async fn delete_category(&self, id: i32) -> Result<bool> {
        let conn = self.db.connection().await;
        Database::begin(&conn).await?;

        let result = async {
            conn.execute("DELETE FROM highlights WHERE category_id = ?", libsql::params![id])
                .await?;
            let deleted = conn
                .execute("DELETE FROM categories WHERE id = ?", libsql::params![id])
                .await?;
            Ok::<bool, anyhow::Error>(deleted > 0)
        }
        .await;

        Database::finish(&conn, result).await
    }

    async fn fetch_categories(conn: &Connection, document_id: i32) -> Result<Vec<Category>> {
        let query = "SELECT id, document_id, name, color FROM categories WHERE document_id = ? ORDER BY id";
        let mut rows = conn.query(query, libsql::params![document_id]).await?;

        let mut categories = Vec::new();
        while let Some(row) = rows.next().await? {
            categories.push(Self::row_to_category(&row)?);
        }
        Ok(categories)
    }

    async fn fetch_category(conn: &Connection, id: i32) -> Result<Option<Category>> {
        let query = "SELECT id, document_id, name, color FROM categories WHERE id = ?";
        let mut rows = conn.query(query, libsql::params![id]).await?;

        if let Some(row) = rows.next().await? {
            Ok(Some(Self::row_to_category(&row)?))
        } else {
            Ok(None)
        }
    }

    async fn insert_category(conn: &Connection, document_id: i32, name: &str, color: CategoryColor) -> Result<Category> {
        let query = r#"
            INSERT INTO categories (document_id, name, color)
            VALUES (?, ?, ?)
            RETURNING id, document_id, name, color
        "#;

        let mut rows = conn
            .query(query, libsql::params![document_id, name, color.as_str()])
            .await?;

        match rows.next().await? {
            Some(row) => Self::row_to_category(&row),
            None => anyhow::bail!("Failed to create category"),
        }
    }

    fn row_to_category(row: &libsql::Row) -> Result<Category> {
        let color_str: String = row.get(3)?;
        let color: CategoryColor = color_str.parse().map_err(|e: String| anyhow::anyhow!(e))?;

        Ok(Category {
            id: row.get(0)?,
            document_id: row.get(1)?,
            name: row.get(2)?,
            color,
        })
    }

    // ------------------------------------------------------------------
    // Highlights
    // ------------------------------------------------------------------

    pub async fn list_highlights_by_category(&self, category_id: i32) -> Result<Vec<Highlight>> {
        let query = r#"
            SELECT id, category_id, start_index, end_index, text
            FROM highlights
            WHERE category_id = ?
            ORDER BY start_index ASC
        "#;

        let conn = self.db.connection().await;
        let mut rows = conn.query(query, libsql::params![category_id]).await?;
        let mut highlights = Vec::new();
        while let Some(row) = rows.next().await? {
            highlights.push(Self::row_to_highlight(&row)?);
        }
        Ok(highlights)
    }

    pub async fn list_highlights_by_document(&self, document_id: i32) -> Result<Vec<Highlight>> {
        let query = r#"
            SELECT highlights.id, highlights.category_id, highlights.start_index, highlights.end_index, highlights.text
            FROM highlights
            JOIN categories ON categories.id = highlights.category_id
            WHERE categories.document_id = ?
            ORDER BY highlights.start_index ASC, highlights.category_id ASC
        "#;

        let conn = self.db.connection().await;
        let mut rows = conn.query(query, libsql::params![document_id]).await?;
        let mut highlights = Vec::new();
        while let Some(row) = rows.next().await? {
            highlights.push(Self::row_to_highlight(&row)?);
        }
        Ok(highlights)
    }

    /// Resolve `snippets` against the document's current content and swap the
    /// result in for the category's highlights, all in one transaction.
    ///
    /// `None` when the category (or its document) no longer exists.
    pub async fn replace_highlights<S: AsRef<str> + Sync>(
        &self,
        category_id: i32,
        snippets: &[S],
    ) -> Result<Option<Regenerated>> {
        let conn = self.db.connection().await;
        Database::begin(&conn).await?;
        let result = Self::replace_highlights_on(&conn, category_id, snippets).await;
        Database::finish(&conn, result).await
    }

    async fn replace_highlights_on<S: AsRef<str> + Sync>(
        conn: &Connection,
        category_id: i32,
        snippets: &[S],
    ) -> Result<Option<Regenerated>> {
        let Some(category) = Self::fetch_category(conn, category_id).await? else {
            return Ok(None);
        };
        let Some(document) = Self::fetch_document(conn, category.document_id).await? else {
            return Ok(None);
        };

        // Offsets must match the content as it is now, not as it was when
        // the snippets were requested.
        let resolution = resolve(&document.content, snippets);

        conn.execute("DELETE FROM highlights WHERE category_id = ?", libsql::params![category_id])
            .await?;

        let query = r#"
            INSERT INTO highlights (category_id, start_index, end_index, text)
            VALUES (?, ?, ?, ?)
            RETURNING id, category_id, start_index, end_index, text
        "#;

        let mut highlights = Vec::with_capacity(resolution.spans.len());
        for span in &resolution.spans {
            let mut rows = conn
                .query(
                    query,
                    libsql::params![category_id, span.start as i64, span.end as i64, span.text.as_str()],
                )
                .await?;
            match rows.next().await? {
                Some(row) => highlights.push(Self::row_to_highlight(&row)?),
                None => anyhow::bail!("Failed to create highlight"),
            }
        }

        Ok(Some(Regenerated { resolution, highlights }))
    }

    fn row_to_highlight(row: &libsql::Row) -> Result<Highlight> {
        Ok(Highlight {
            id: row.get(0)?,
            category_id: row.get(1)?,
            start_index: row.get::<i64>(2)? as usize,
            end_index: row.get::<i64>(3)? as usize,
            text: row.get(4)?,
        })
    }

    // ------------------------------------------------------------------
    // Sentences
    // ------------------------------------------------------------------

    pub async fn replace_sentences(&self, document_id: i32, user_id: i32, content: &str) -> Result<Vec<Sentence>> {
        let sentences = split_sentences(content);

        let conn = self.db.connection().await;
        Database::begin(&conn).await?;

        let result = async {
            conn.execute("DELETE FROM sentences WHERE document_id = ?", libsql::params![document_id])
                .await?;

            let query = r#"
                INSERT INTO sentences (document_id, user_id, idx, text)
                VALUES (?, ?, ?, ?)
                RETURNING id, document_id, idx, text
            "#;

            let mut created = Vec::with_capacity(sentences.len());
            for (idx, text) in sentences.iter().enumerate() {
                let mut rows = conn
                    .query(query, libsql::params![document_id, user_id, idx as i32, text.as_str()])
                    .await?;
                match rows.next().await? {
                    Some(row) => created.push(Self::row_to_sentence(&row)?),
                    None => anyhow::bail!("Failed to create sentence"),
                }
            }
            Ok::<Vec<Sentence>, anyhow::Error>(created)
        }
        .await;

        Database::finish(&conn, result).await
    }

    pub async fn list_sentences(&self, document_id: i32) -> Result<Vec<Sentence>> {
        let query = "SELECT id, document_id, idx, text FROM sentences WHERE document_id = ? ORDER BY idx";
        let conn = self.db.connection().await;
        let mut rows = conn.query(query, libsql::params![document_id]).await?;

        let mut sentences = Vec::new();
        while let Some(row) = rows.next().await? {
            sentences.push(Self::row_to_sentence(&row)?);
        }
        Ok(sentences)
    }

    fn row_to_sentence(row: &libsql::Row) -> Result<Sentence> {
        Ok(Sentence {
            id: row.get(0)?,
            document_id: row.get(1)?,
            idx: row.get(2)?,
            text: row.get(3)?,
        })
    }
}
