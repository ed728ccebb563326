//! Renderer-agnostic decoration of document content.
//!
//! Turns stored highlights into a flat list of segments tiling the content.
//! Each segment lists the categories marking it; the client only has to wrap
//! segment text in whatever its display toolkit uses for colored spans.

use std::collections::HashSet;

use serde::Serialize;

use crate::model::{Category, CategoryColor, Highlight};
use crate::resolver::is_stale;

/// One "decorate this span" instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decoration {
    pub category_id: i32,
    pub color: CategoryColor,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Mark {
    pub category_id: i32,
    pub color: CategoryColor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub start: usize,
    pub end: usize,
    pub text: String,
    pub marks: Vec<Mark>,
}

/// Decorations for every visible category. Highlights that no longer match
/// `content` are dropped.
pub fn decorations(
    content: &str,
    categories: &[Category],
    highlights: &[Highlight],
    hidden: &HashSet<i32>,
) -> Vec<Decoration> {
    let mut out: Vec<Decoration> = highlights
        .iter()
        .filter(|h| !hidden.contains(&h.category_id))
        .filter(|h| !is_stale(content, h.start_index, h.end_index, &h.text))
        .filter_map(|h| {
            let category = categories.iter().find(|c| c.id == h.category_id)?;
            Some(Decoration {
                category_id: category.id,
                color: category.color,
                start: h.start_index,
                end: h.end_index,
            })
        })
        .collect();

    out.sort_by_key(|d| (d.start, d.end, d.category_id));
    out
}

/// Split `content` at every decoration boundary.
///
/// The returned segments are contiguous, start at 0 and end at the char length
/// of `content`. Overlapping decorations from different categories show up as
/// several marks on the same segment.
pub fn segment(content: &str, decorations: &[Decoration]) -> Vec<Segment> {
    let offsets: Vec<usize> = content
        .char_indices()
        .map(|(b, _)| b)
        .chain(std::iter::once(content.len()))
        .collect();
    let len = offsets.len() - 1;

    let mut bounds: Vec<usize> = decorations
        .iter()
        .filter(|d| d.start < d.end && d.end <= len)
        .flat_map(|d| [d.start, d.end])
        .chain([0, len])
        .collect();
    bounds.sort_unstable();
    bounds.dedup();

    bounds
        .windows(2)
        .map(|w| {
            let (start, end) = (w[0], w[1]);
            let marks = decorations
                .iter()
                .filter(|d| d.end <= len && d.start <= start && d.end >= end)
                .map(|d| Mark {
                    category_id: d.category_id,
                    color: d.color,
                })
                .collect();

            Segment {
                start,
                end,
                text: content[offsets[start]..offsets[end]].to_string(),
                marks,
            }
        })
        .collect()
}

/// Parse a `hidden=1,2,3` query value. Unparseable ids are ignored.
pub fn parse_hidden(raw: Option<&str>) -> HashSet<i32> {
    raw.map(|s| {
        s.split(',')
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .filter_map(|p| p.parse().ok())
            .collect()
    })
    .unwrap_or_default()
}
