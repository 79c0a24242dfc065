//! Span splicing and whitespace cleanup.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A span of the working text selected for removal.
///
/// Offsets are byte offsets into the text the span was detected in; `end` is
/// exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    /// The exact substring that will be removed.
    pub content: String,
    /// Start offset (inclusive).
    pub start: usize,
    /// End offset (exclusive).
    pub end: usize,
}

impl Match {
    /// Create a match covering `text[start..end]`.
    ///
    /// Returns `None` if the range is out of bounds or not on char boundaries.
    #[must_use]
    pub fn new(text: &str, start: usize, end: usize) -> Option<Self> {
        let content = text.get(start..end)?;
        Some(Self {
            content: content.to_string(),
            start,
            end,
        })
    }

    /// Length of the span in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Whether the span is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Whether this span shares any byte with `other`.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Remove every match from `text`, working from the last match to the first.
///
/// # Errors
///
/// Returns [`Error::Processing`] if a match does not describe a slice of
/// `text` or two matches overlap.
pub fn splice(text: &str, matches: &[Match]) -> Result<String> {
    let mut ordered: Vec<&Match> = matches.iter().collect();
    ordered.sort_by(|a, b| b.start.cmp(&a.start));

    let mut result = text.to_string();
    let mut floor = text.len();
    for m in ordered {
        if m.start > m.end || m.end > floor {
            return Err(Error::processing(format!(
                "span {}..{} overlaps or exceeds the remaining text",
                m.start, m.end
            )));
        }
        if text.get(m.start..m.end) != Some(m.content.as_str()) {
            return Err(Error::processing(format!(
                "span {}..{} does not match the working text",
                m.start, m.end
            )));
        }
        result.replace_range(m.start..m.end, "");
        floor = m.start;
    }
    Ok(result)
}

/// Collapse blank lines and trim the ends of the text.
///
/// Lines that hold nothing but whitespace are dropped wherever they sit between
/// two line breaks; leading and trailing whitespace is then trimmed. This also
/// removes paragraph breaks in text that had nothing filtered:
/// `"one\n\ntwo"` becomes `"one\ntwo"`.
#[must_use]
pub fn normalize_whitespace(text: &str) -> String {
    let segments: Vec<&str> = text.split('\n').collect();
    let last = segments.len().saturating_sub(1);
    let kept: Vec<&str> = segments
        .iter()
        .enumerate()
        .filter(|(i, line)| *i == 0 || *i == last || !line.trim().is_empty())
        .map(|(_, line)| *line)
        .collect();
    kept.join("\n").trim().to_string()
}

/// 1-based line number of a byte offset.
#[must_use]
pub fn line_number(text: &str, offset: usize) -> usize {
    let end = offset.min(text.len());
    text.as_bytes()[..end].iter().filter(|&&b| b == b'\n').count() + 1
}
