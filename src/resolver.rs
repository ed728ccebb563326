//! Span resolution for oracle-proposed highlight snippets.
//!
//! The oracle answers with free-standing snippets of text and no positions.
//! This module locates each snippet inside the document content and keeps a
//! set of non-overlapping ranges that can be persisted as highlights.
//!
//! # Policy
//!
//! - **Exact match only**: a snippet must occur verbatim in the content
//! - **First occurrence**: duplicates in the content resolve to the lowest offset
//! - **Discovery order**: snippets are accepted in the order the oracle returned
//!   them; a later snippet overlapping an accepted range is rejected
//! - **Char offsets**: `start`/`end` count Unicode scalar values, not bytes
//!
//! Nothing here fails on bad oracle output. Rejected snippets are reported
//! alongside the accepted spans so callers can tell "the oracle said nothing"
//! apart from "nothing the oracle said was in the document".

use serde::Serialize;

/// A snippet located in the content, as a half-open `[start, end)` char range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedSpan {
    pub text: String,
    pub start: usize,
    pub end: usize,
}

impl ResolvedSpan {
    pub fn overlaps(&self, start: usize, end: usize) -> bool {
        start < self.end && end > self.start
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    /// Snippet was empty.
    Empty,
    /// Snippet does not occur verbatim in the content.
    NoMatch,
    /// Snippet's first occurrence intersects an already accepted span.
    Overlap,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejected {
    pub snippet: String,
    pub reason: Rejection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Resolution {
    /// Accepted spans, ascending by `start`, pairwise disjoint.
    pub spans: Vec<ResolvedSpan>,
    pub rejected: Vec<Rejected>,
    pub requested: usize,
}

impl Resolution {
    pub fn unmatched(&self) -> usize {
        self.count(Rejection::NoMatch) + self.count(Rejection::Empty)
    }

    pub fn overlapping(&self) -> usize {
        self.count(Rejection::Overlap)
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    fn count(&self, reason: Rejection) -> usize {
        self.rejected.iter().filter(|r| r.reason == reason).count()
    }
}

/// Resolve `snippets` against `content`.
///
/// Deterministic: the same `(content, snippets)` always yields the same
/// `Resolution`, so retried regenerations are idempotent.
pub fn resolve<S: AsRef<str>>(content: &str, snippets: &[S]) -> Resolution {
    let mut accepted: Vec<ResolvedSpan> = Vec::with_capacity(snippets.len());
    let mut rejected = Vec::new();

    for snippet in snippets {
        let snippet = snippet.as_ref();

        let reason = match locate(content, snippet) {
            Err(reason) => Some(reason),
            Ok((start, end)) if accepted.iter().any(|a| a.overlaps(start, end)) => Some(Rejection::Overlap),
            Ok((start, end)) => {
                accepted.push(ResolvedSpan {
                    text: snippet.to_string(),
                    start,
                    end,
                });
                None
            }
        };

        if let Some(reason) = reason {
            tracing::debug!(?reason, snippet_len = snippet.len(), "snippet rejected");
            rejected.push(Rejected {
                snippet: snippet.to_string(),
                reason,
            });
        }
    }

    accepted.sort_by_key(|s| s.start);

    Resolution {
        spans: accepted,
        rejected,
        requested: snippets.len(),
    }
}

/// First occurrence of `snippet` in `content` as a char range.
fn locate(content: &str, snippet: &str) -> Result<(usize, usize), Rejection> {
    if snippet.is_empty() {
        return Err(Rejection::Empty);
    }

    let byte_start = content.find(snippet).ok_or(Rejection::NoMatch)?;
    let start = content[..byte_start].chars().count();
    let end = start + snippet.chars().count();

    Ok((start, end))
}

/// Slice `content` by char offsets. `None` when the range is empty, inverted
/// or runs past the end.
pub fn slice_chars(content: &str, start: usize, end: usize) -> Option<&str> {
    if start >= end {
        return None;
    }

    let byte_start = char_to_byte(content, start)?;
    let byte_end = char_to_byte(content, end)?;
    content.get(byte_start..byte_end)
}

fn char_to_byte(content: &str, char_idx: usize) -> Option<usize> {
    content
        .char_indices()
        .map(|(b, _)| b)
        .chain(std::iter::once(content.len()))
        .nth(char_idx)
}

/// True when a stored highlight no longer reproduces its text, e.g. after the
/// document content was edited.
pub fn is_stale(content: &str, start: usize, end: usize, text: &str) -> bool {
    slice_chars(content, start, end) != Some(text)
}
