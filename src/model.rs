use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Fixed palette a category color is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CategoryColor {
    First,
    Second,
    Third,
}

impl CategoryColor {
    pub const ALL: [CategoryColor; 3] = [CategoryColor::First, CategoryColor::Second, CategoryColor::Third];

    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryColor::First => "#FDE68A",
            CategoryColor::Second => "#A7F3D0",
            CategoryColor::Third => "#BFDBFE",
        }
    }

    pub fn slot(&self) -> &'static str {
        match self {
            CategoryColor::First => "first",
            CategoryColor::Second => "second",
            CategoryColor::Third => "third",
        }
    }

    /// Palette color for the n-th category of a document, wrapping around.
    pub fn nth(n: usize) -> Self {
        CategoryColor::ALL[n % CategoryColor::ALL.len()]
    }

    pub fn allowed() -> String {
        CategoryColor::ALL
            .iter()
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Accepts either the hex value or the palette slot name.
impl FromStr for CategoryColor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        CategoryColor::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(trimmed) || c.slot().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| format!("invalid color {s:?}, must be one of: {}", CategoryColor::allowed()))
    }
}

impl TryFrom<String> for CategoryColor {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CategoryColor> for String {
    fn from(value: CategoryColor) -> Self {
        value.as_str().to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i32,
    pub email: String,
    pub name: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: i32,
    pub user_id: i32,
    pub title: String,
    pub content: String,
    pub is_public: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: i32,
    pub document_id: i32,
    pub name: String,
    pub color: CategoryColor,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Highlight {
    pub id: i32,
    pub category_id: i32,
    pub start_index: usize,
    pub end_index: usize,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sentence {
    pub id: i32,
    pub document_id: i32,
    pub idx: i32,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentWithCategories {
    #[serde(flatten)]
    pub document: Document,
    pub categories: Vec<Category>,
}
