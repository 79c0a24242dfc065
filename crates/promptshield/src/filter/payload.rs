//! Detection of base64-encoded phishing payloads.
//!
//! Two passes look for base64 candidates: contiguous runs, and runs with a
//! single space or tab between every symbol. Each candidate is decoded and kept
//! only if the decoded text is printable and matches a phishing pattern.
//! Harmless base64 is never reported.
//!
//! A spaced run can swallow one-letter words at its edges (`I`, `a`, or the
//! first letter of the next word). Such runs are retried with up to
//! [`MAX_EDGE_WORDS`] symbols dropped from each edge.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use tracing::trace;

use super::encoding::{self, is_base64_char, is_base64_symbol};
use super::patterns::PhishingMatcher;
use super::text::Match;

/// Minimum number of base64 symbols in a candidate run.
pub const DEFAULT_MIN_PAYLOAD_LENGTH: usize = 20;

/// Most symbols dropped from one edge of a spaced run.
pub const MAX_EDGE_WORDS: usize = 3;

#[allow(clippy::expect_used)]
static CONTIGUOUS_RUN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9+/]+={0,2}").expect("valid contiguous run regex")
});

// The leading group stands in for a look-behind: a spaced run has to start
// at the beginning of the text or after a non-base64 character.
#[allow(clippy::expect_used)]
static SPACED_RUN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^A-Za-z0-9+/=])((?:[A-Za-z0-9+/][ \t])+[A-Za-z0-9+/](?:[ \t]=){0,2})")
        .expect("valid spaced run regex")
});

/// A confirmed phishing payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadMatch {
    /// The span to remove, including absorbed whitespace.
    pub span: Match,
    /// Offsets of the encoded run itself.
    pub run: Range<usize>,
    /// The decoded payload text.
    pub decoded: String,
    /// Name of the phishing pattern the decoded text matched.
    pub pattern: String,
}

fn symbol_count(run: &str) -> usize {
    run.chars().filter(|&c| is_base64_symbol(c)).count()
}

/// Whether `text[start..end]` stands alone rather than being the inner part of
/// a longer base64-alphabet token.
///
/// An `=` before the run is a separator (`token=...`). After the run it would
/// be a third padding character.
fn is_isolated(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    !before.is_some_and(is_base64_symbol) && !after.is_some_and(is_base64_char)
}

/// Offsets of contiguous, isolated base64 runs with at least `min_length` symbols.
#[must_use]
pub fn contiguous_runs(text: &str, min_length: usize) -> Vec<Range<usize>> {
    CONTIGUOUS_RUN
        .find_iter(text)
        .filter(|m| symbol_count(m.as_str()) >= min_length)
        .filter(|m| is_isolated(text, m.start(), m.end()))
        .map(|m| m.range())
        .collect()
}

/// Offsets of whitespace-interspersed base64 runs with at least `min_length`
/// symbols.
///
/// Runs are not checked for isolation here, since an edge may still need
/// trimming. See [`spaced_trims`].
#[must_use]
pub fn spaced_runs(text: &str, min_length: usize) -> Vec<Range<usize>> {
    SPACED_RUN
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .filter(|m| symbol_count(m.as_str()) >= min_length)
        .map(|m| m.range())
        .collect()
}

/// Drop `lead` symbols from the front of a spaced run and `tail` from the
/// back, each with its separator.
///
/// Returns `None` when the run is too short or ends in padding.
fn trim_edges(text: &str, run: &Range<usize>, lead: usize, tail: usize) -> Option<Range<usize>> {
    let start = run.start + 2 * lead;
    let mut end = run.end;
    for _ in 0..tail {
        if text.as_bytes().get(end.checked_sub(1)?) == Some(&b'=') {
            return None;
        }
        end = end.checked_sub(2)?;
    }
    (start < end).then_some(start..end)
}

/// Isolated sub-runs of a spaced run, fewest dropped symbols first.
///
/// The untrimmed run comes first when it is isolated itself.
#[must_use]
pub fn spaced_trims(text: &str, run: &Range<usize>, min_length: usize) -> Vec<Range<usize>> {
    let mut trims = Vec::new();
    for dropped in 0..=2 * MAX_EDGE_WORDS {
        for lead in 0..=dropped.min(MAX_EDGE_WORDS) {
            let tail = dropped - lead;
            if tail > MAX_EDGE_WORDS {
                continue;
            }
            let Some(range) = trim_edges(text, run, lead, tail) else {
                continue;
            };
            if symbol_count(&text[range.clone()]) >= min_length
                && is_isolated(text, range.start, range.end)
            {
                trims.push(range);
            }
        }
    }
    trims
}

/// Scanner for encoded phishing payloads.
#[derive(Debug, Clone, Copy)]
pub struct PayloadScanner<'a> {
    matcher: &'a PhishingMatcher,
    min_length: usize,
    min_printable_ratio: f64,
}

impl<'a> PayloadScanner<'a> {
    /// Create a scanner with the default thresholds.
    #[must_use]
    pub fn new(matcher: &'a PhishingMatcher) -> Self {
        Self {
            matcher,
            min_length: DEFAULT_MIN_PAYLOAD_LENGTH,
            min_printable_ratio: encoding::DEFAULT_MIN_PRINTABLE_RATIO,
        }
    }

    /// Set the minimum run length in base64 symbols.
    #[must_use]
    pub fn with_min_length(mut self, min_length: usize) -> Self {
        self.min_length = min_length;
        self
    }

    /// Set the printable ratio a decoded payload needs.
    #[must_use]
    pub fn with_min_printable_ratio(mut self, ratio: f64) -> Self {
        self.min_printable_ratio = ratio;
        self
    }

    /// Decode a compact candidate and classify it.
    fn classify(&self, encoded: &str) -> Option<(String, String)> {
        let Some(decoded) = encoding::decode_text(encoded, self.min_printable_ratio) else {
            trace!(len = encoded.len(), "Base64 candidate is not printable text");
            return None;
        };
        let Some(pattern) = self.matcher.classify(&decoded) else {
            trace!(len = encoded.len(), "Base64 candidate is not phishing");
            return None;
        };
        Some((decoded, pattern.name.clone()))
    }

    /// Find all phishing payloads in `text`, in ascending order.
    ///
    /// Returned spans never overlap; each absorbs the whitespace on one side
    /// of its run.
    #[must_use]
    pub fn scan(&self, text: &str) -> Vec<PayloadMatch> {
        let mut found: Vec<(Range<usize>, String, String)> = Vec::new();

        for run in contiguous_runs(text, self.min_length) {
            if let Some((decoded, pattern)) = self.classify(&text[run.clone()]) {
                found.push((run, decoded, pattern));
            }
        }

        for run in spaced_runs(text, self.min_length) {
            for candidate in spaced_trims(text, &run, self.min_length) {
                let claimed = found
                    .iter()
                    .any(|(r, _, _)| r.start < candidate.end && candidate.start < r.end);
                if claimed {
                    continue;
                }
                let compact: String = text[candidate.clone()]
                    .chars()
                    .filter(|c| !c.is_whitespace())
                    .collect();
                if let Some((decoded, pattern)) = self.classify(&compact) {
                    found.push((candidate, decoded, pattern));
                    break;
                }
            }
        }

        found.sort_by_key(|(run, _, _)| run.start);

        let mut matches = Vec::with_capacity(found.len());
        let mut floor = 0;
        for (i, (run, decoded, pattern)) in found.iter().enumerate() {
            let ceiling = found.get(i + 1).map_or(text.len(), |(next, _, _)| next.start);
            let (start, end) = absorb_whitespace(text, run, floor, ceiling);
            floor = end;
            if let Some(span) = Match::new(text, start, end) {
                matches.push(PayloadMatch {
                    span,
                    run: run.clone(),
                    decoded: decoded.clone(),
                    pattern: pattern.clone(),
                });
            }
        }
        matches
    }
}

/// Extend a run over the whitespace before it, or after it when there is
/// none before, staying within `floor..ceiling`.
fn absorb_whitespace(text: &str, run: &Range<usize>, floor: usize, ceiling: usize) -> (usize, usize) {
    let mut start = run.start;
    while start > floor {
        match text[..start].chars().next_back() {
            Some(c) if c.is_whitespace() => start -= c.len_utf8(),
            _ => break,
        }
    }

    let mut end = run.end;
    if start == run.start {
        while end < ceiling {
            match text[end..].chars().next() {
                Some(c) if c.is_whitespace() => end += c.len_utf8(),
                _ => break,
            }
        }
    }
    (start, end)
}
