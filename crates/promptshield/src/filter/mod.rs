//! Content filtering for untrusted text.
//!
//! This module removes two kinds of injected content before text reaches a
//! language model:
//!
//! - Structured instructions: JSON-like objects declaring `"role": "system"`
//!   ([`instruction`]).
//! - Encoded payloads: base64 runs that decode to phishing prompts
//!   ([`payload`]).
//!
//! [`ContentFilter`] runs both scanners in that order and normalizes the
//! whitespace left behind.

pub mod encoding;
pub mod instruction;
pub mod patterns;
pub mod payload;
pub mod pipeline;
pub mod text;

pub use instruction::{Evidence, InstructionScanner, ScanMode};
pub use patterns::{builtin_phishing_patterns, PhishingMatcher, PhishingPattern};
pub use payload::{PayloadMatch, PayloadScanner};
pub use pipeline::{ContentFilter, FilterOptions, FilterResult, MatchKind, MatchRecord};
pub use text::Match;
