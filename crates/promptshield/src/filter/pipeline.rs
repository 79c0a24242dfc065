//! The content filter entry points.
//!
//! Text passes through the instruction scanner first and the payload scanner
//! second, so a phishing payload wrapped inside a fake system object is removed
//! together with its wrapper. Residual whitespace is normalized last.
//!
//! Removing a span joins the text on either side of it, and the joined text
//! can form a new instruction or payload. Both scanners therefore run again on
//! the spliced text until a pass finds nothing, which keeps the output free of
//! anything a second call would remove.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::instruction::{Evidence, InstructionScanner, ScanMode};
use super::payload::{PayloadScanner, DEFAULT_MIN_PAYLOAD_LENGTH};
use super::patterns::PhishingMatcher;
use super::text::{line_number, normalize_whitespace, splice, Match};
use super::encoding::DEFAULT_MIN_PRINTABLE_RATIO;
use crate::config::FilterConfig;
use crate::error::{Error, Result};

/// Options for [`ContentFilter::filter_advanced`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterOptions {
    /// Only remove canonically formatted system objects.
    pub strict_mode: bool,
    /// Skip whitespace normalization after splicing.
    pub preserve_whitespace: bool,
    /// Return a diagnostic record for every removed span.
    pub log_matches: bool,
}

impl FilterOptions {
    fn scan_mode(self) -> ScanMode {
        if self.strict_mode {
            ScanMode::Strict
        } else {
            ScanMode::Lenient
        }
    }
}

/// Which scanner produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// An injected `"role": "system"` object.
    StructuredInstruction,
    /// A base64-encoded phishing payload.
    EncodedPayload,
}

impl std::fmt::Display for MatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StructuredInstruction => write!(f, "structured_instruction"),
            Self::EncodedPayload => write!(f, "encoded_payload"),
        }
    }
}

/// Diagnostic record for one removed span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    /// Which scanner found the span.
    pub kind: MatchKind,
    /// The removed text.
    pub content: String,
    /// Start offset in the working text the span was found in.
    pub start: usize,
    /// End offset (exclusive) in the same working text.
    pub end: usize,
    /// 1-based line of the span in the original text.
    pub line: usize,
    /// Decoded payload text (encoded payloads only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decoded: Option<String>,
    /// Phishing pattern name (encoded payloads only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

/// Outcome of a filter call.
///
/// When `success` is false, `cleaned_content` equals `original_content` and
/// `filtered_count` is zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterResult {
    /// Whether filtering completed.
    pub success: bool,
    /// The filtered text.
    pub cleaned_content: String,
    /// The text as passed in.
    pub original_content: String,
    /// Number of removed spans.
    pub filtered_count: usize,
    /// Failure messages.
    pub errors: Vec<String>,
    /// Per-match diagnostics, when requested.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matches: Vec<MatchRecord>,
    /// Formatting warnings about removed spans.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl FilterResult {
    fn unchanged(text: &str) -> Self {
        Self {
            success: true,
            cleaned_content: text.to_string(),
            original_content: text.to_string(),
            filtered_count: 0,
            errors: Vec::new(),
            matches: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn failed(text: String, error: &Error) -> Self {
        Self {
            success: false,
            cleaned_content: text.clone(),
            original_content: text,
            filtered_count: 0,
            errors: vec![error.to_string()],
            matches: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Whether anything was removed.
    #[must_use]
    pub fn was_filtered(&self) -> bool {
        self.filtered_count > 0
    }

    /// Render the result as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

struct Outcome {
    cleaned: String,
    count: usize,
    matches: Vec<MatchRecord>,
    warnings: Vec<String>,
}

/// Map an offset in spliced text back to the text before the splice.
///
/// `removed` holds the spans taken out of that text, in ascending order.
fn original_offset(offset: usize, removed: &[Match]) -> usize {
    let mut shift = 0;
    for m in removed {
        if m.start - shift <= offset {
            shift += m.len();
        } else {
            break;
        }
    }
    offset + shift
}

/// Map an offset through every splice pass back to the original text.
fn unwind_offset(offset: usize, passes: &[Vec<Match>]) -> usize {
    passes
        .iter()
        .rev()
        .fold(offset, |offset, removed| original_offset(offset, removed))
}

/// Filter for injected system instructions and encoded phishing payloads.
///
/// The filter is immutable after construction and can be shared freely
/// between threads.
#[derive(Debug, Clone)]
pub struct ContentFilter {
    matcher: PhishingMatcher,
    min_payload_length: usize,
    min_printable_ratio: f64,
}

impl ContentFilter {
    /// Create a filter with the built-in phishing patterns and default thresholds.
    #[must_use]
    pub fn new() -> Self {
        Self::with_matcher(PhishingMatcher::new())
    }

    /// Create a filter with a custom phishing pattern set.
    #[must_use]
    pub fn with_matcher(matcher: PhishingMatcher) -> Self {
        Self {
            matcher,
            min_payload_length: DEFAULT_MIN_PAYLOAD_LENGTH,
            min_printable_ratio: DEFAULT_MIN_PRINTABLE_RATIO,
        }
    }

    /// Create a filter from configuration.
    #[must_use]
    pub fn from_config(config: &FilterConfig) -> Self {
        Self {
            matcher: PhishingMatcher::from_config(
                config.use_builtin_patterns,
                &config.custom_phishing_patterns,
            ),
            min_payload_length: config.min_payload_length,
            min_printable_ratio: config.min_printable_ratio,
        }
    }

    /// The phishing pattern set in use.
    #[must_use]
    pub fn matcher(&self) -> &PhishingMatcher {
        &self.matcher
    }

    /// Filter text with lenient matching and whitespace normalization.
    #[must_use]
    pub fn filter(&self, text: &str) -> FilterResult {
        let mut result = self.filter_advanced(text, &FilterOptions::default());
        result.warnings.clear();
        result
    }

    /// Filter text with explicit options.
    ///
    /// Instruction spans that only matched through repair or the substring
    /// heuristic, rather than a strict JSON parse, are reported in `warnings`
    /// but still removed.
    #[must_use]
    pub fn filter_advanced(&self, text: &str, options: &FilterOptions) -> FilterResult {
        if text.trim().is_empty() {
            return FilterResult::unchanged(text);
        }

        match self.run(text, *options) {
            Ok(outcome) => {
                debug!(
                    removed = outcome.count,
                    input_len = text.len(),
                    output_len = outcome.cleaned.len(),
                    "Content filtered"
                );
                FilterResult {
                    success: true,
                    cleaned_content: outcome.cleaned,
                    original_content: text.to_string(),
                    filtered_count: outcome.count,
                    errors: Vec::new(),
                    matches: outcome.matches,
                    warnings: outcome.warnings,
                }
            }
            Err(e) => {
                warn!(error = %e, "Content filtering failed, returning original content");
                FilterResult::failed(text.to_string(), &e)
            }
        }
    }

    /// Filter an untyped value, rejecting anything that is not a string.
    #[must_use]
    pub fn filter_value(&self, value: &Value) -> FilterResult {
        self.filter_value_advanced(value, None)
    }

    /// Filter an untyped value with explicit options.
    #[must_use]
    pub fn filter_value_advanced(&self, value: &Value, options: Option<&FilterOptions>) -> FilterResult {
        match (value, options) {
            (Value::String(text), None) => self.filter(text),
            (Value::String(text), Some(options)) => self.filter_advanced(text, options),
            (other, _) => {
                let err = Error::input_type(other);
                warn!(error = %err, "Rejected non-string filter input");
                FilterResult::failed(other.to_string(), &err)
            }
        }
    }

    fn payload_scanner(&self) -> PayloadScanner<'_> {
        PayloadScanner::new(&self.matcher)
            .with_min_length(self.min_payload_length)
            .with_min_printable_ratio(self.min_printable_ratio)
    }

    fn run(&self, text: &str, options: FilterOptions) -> Result<Outcome> {
        let instructions = InstructionScanner::new(options.scan_mode());
        let payloads = self.payload_scanner();

        let mut current = text.to_string();
        let mut passes: Vec<Vec<Match>> = Vec::new();
        let mut matches = Vec::new();
        let mut warnings = Vec::new();

        loop {
            loop {
                let found = instructions.scan_with_evidence(&current);
                if found.is_empty() {
                    break;
                }
                for (m, evidence) in &found {
                    let line = line_number(text, unwind_offset(m.start, &passes));
                    debug!(
                        start = m.start,
                        end = m.end,
                        pass = passes.len(),
                        "Removed system instruction"
                    );
                    if *evidence != Evidence::Json {
                        warnings.push(format!(
                            "instruction at line {line} is not valid JSON (matched by {evidence})"
                        ));
                    }
                    if options.log_matches {
                        matches.push(MatchRecord {
                            kind: MatchKind::StructuredInstruction,
                            content: m.content.clone(),
                            start: m.start,
                            end: m.end,
                            line,
                            decoded: None,
                            pattern: None,
                        });
                    }
                }
                let spans: Vec<Match> = found.into_iter().map(|(m, _)| m).collect();
                current = splice(&current, &spans)?;
                passes.push(spans);
            }

            let found = payloads.scan(&current);
            if found.is_empty() {
                break;
            }
            for p in &found {
                debug!(
                    start = p.span.start,
                    end = p.span.end,
                    pass = passes.len(),
                    pattern = %p.pattern,
                    "Removed encoded payload"
                );
                if options.log_matches {
                    matches.push(MatchRecord {
                        kind: MatchKind::EncodedPayload,
                        content: p.span.content.clone(),
                        start: p.span.start,
                        end: p.span.end,
                        line: line_number(text, unwind_offset(p.run.start, &passes)),
                        decoded: Some(p.decoded.clone()),
                        pattern: Some(p.pattern.clone()),
                    });
                }
            }
            let spans: Vec<Match> = found.into_iter().map(|p| p.span).collect();
            current = splice(&current, &spans)?;
            passes.push(spans);
        }

        let cleaned = if options.preserve_whitespace {
            current
        } else {
            normalize_whitespace(&current)
        };

        Ok(Outcome {
            cleaned,
            count: passes.iter().map(Vec::len).sum(),
            matches,
            warnings,
        })
    }
}

impl Default for ContentFilter {
    fn default() -> Self {
        Self::new()
    }
}
