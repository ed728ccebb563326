//! Snippet Oracle
//!
//! The language model behind title, category and highlight generation. It is
//! treated as an opaque, non-deterministic collaborator: everything it returns
//! is cleaned up here and checked again by [`crate::resolver`] before being
//! stored.

mod openai;

pub use openai::OpenAiOracle;

use async_trait::async_trait;

use crate::error::OracleError;
use crate::model::CategoryColor;

pub const DEFAULT_TITLE: &str = "Untitled Document";
pub const DEFAULT_CATEGORIES: [&str; 3] = ["Main Points", "Key Details", "Follow-up"];

const MAX_TITLE_WORDS: usize = 4;

#[async_trait]
pub trait SnippetOracle: Send + Sync {
    /// A short title for `content`.
    async fn title(&self, content: &str) -> Result<String, OracleError>;

    /// Category names describing distinct aspects of `content`.
    async fn categories(&self, content: &str) -> Result<Vec<String>, OracleError>;

    /// Verbatim passages of `content` relevant to `category`.
    async fn snippets(&self, content: &str, category: &str) -> Result<Vec<String>, OracleError>;
}

/// Oracle title, falling back to [`DEFAULT_TITLE`] on blank content, failure
/// or an unusable reply.
pub async fn title_or_default(oracle: &dyn SnippetOracle, content: &str) -> String {
    if content.trim().is_empty() {
        return DEFAULT_TITLE.to_string();
    }

    match oracle.title(content).await {
        Ok(raw) => clean_title(&raw).unwrap_or_else(|| DEFAULT_TITLE.to_string()),
        Err(e) => {
            tracing::warn!(error = %e, "title generation failed, using default");
            DEFAULT_TITLE.to_string()
        }
    }
}

/// Exactly three named categories, one per palette color.
pub async fn categories_or_default(oracle: &dyn SnippetOracle, content: &str) -> Vec<(String, CategoryColor)> {
    let names = match oracle.categories(content).await {
        Ok(names) => {
            let mut seen: Vec<String> = Vec::new();
            for name in names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
                if !seen.iter().any(|s| s.eq_ignore_ascii_case(name)) {
                    seen.push(name.to_string());
                }
            }
            seen
        }
        Err(e) => {
            tracing::warn!(error = %e, "category generation failed, using defaults");
            Vec::new()
        }
    };

    if names.len() < CategoryColor::ALL.len() {
        if !names.is_empty() {
            tracing::warn!(count = names.len(), "oracle returned too few categories, using defaults");
        }
        return DEFAULT_CATEGORIES
            .iter()
            .zip(CategoryColor::ALL)
            .map(|(n, c)| (n.to_string(), c))
            .collect();
    }

    names.into_iter().zip(CategoryColor::ALL).collect()
}

/// Split a model reply into one entry per line, dropping list markers,
/// numbering and wrapping quotes.
pub fn parse_lines(reply: &str) -> Vec<String> {
    reply
        .lines()
        .map(strip_list_marker)
        .map(strip_quotes)
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

fn strip_list_marker(line: &str) -> &str {
    let line = line.trim();

    if let Some(rest) = line.strip_prefix(['-', '*', '•']) {
        return rest.trim_start();
    }

    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix(['.', ')', ':']) {
            return rest.trim_start();
        }
    }

    line
}

fn strip_quotes(line: &str) -> &str {
    let line = line.trim();
    for (open, close) in [('"', '"'), ('\'', '\''), ('“', '”')] {
        if let Some(inner) = line.strip_prefix(open).and_then(|l| l.strip_suffix(close)) {
            return inner;
        }
    }
    line
}

fn clean_title(raw: &str) -> Option<String> {
    let first = parse_lines(raw).into_iter().next()?;
    let first = first.trim_start_matches('"').trim_end_matches('"');
    let words: Vec<&str> = first.split_whitespace().take(MAX_TITLE_WORDS).collect();
    if words.is_empty() {
        return None;
    }
    Some(words.join(" "))
}

/// Canned oracle for tests and offline runs.
#[derive(Debug, Clone, Default)]
pub struct StaticOracle {
    pub title: Option<String>,
    pub categories: Vec<String>,
    pub snippets: Vec<String>,
}

#[async_trait]
impl SnippetOracle for StaticOracle {
    async fn title(&self, _content: &str) -> Result<String, OracleError> {
        self.title.clone().ok_or(OracleError::EmptyReply)
    }

    async fn categories(&self, _content: &str) -> Result<Vec<String>, OracleError> {
        Ok(self.categories.clone())
    }

    async fn snippets(&self, _content: &str, _category: &str) -> Result<Vec<String>, OracleError> {
        Ok(self.snippets.clone())
    }
}
