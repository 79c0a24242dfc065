//! Base64 decoding and printable-text validation.
//!
//! Candidates are decoded with the standard alphabet. Padding is optional and
//! non-canonical trailing bits are tolerated, since attackers rarely bother
//! producing canonical output.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;

/// Fraction of printable bytes a decoded payload needs to count as text.
pub const DEFAULT_MIN_PRINTABLE_RATIO: f64 = 0.8;

const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Check if a character belongs to the base64 alphabet (padding excluded).
#[must_use]
pub fn is_base64_symbol(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '+' || c == '/'
}

/// Check if a character may appear inside a base64 run, padding included.
#[must_use]
pub fn is_base64_char(c: char) -> bool {
    is_base64_symbol(c) || c == '='
}

/// Decode a base64 candidate, returning `None` if it is not valid base64.
#[must_use]
pub fn decode(candidate: &str) -> Option<Vec<u8>> {
    LENIENT.decode(candidate).ok()
}

/// Fraction of bytes that are printable ASCII, tab, newline or carriage return.
///
/// Empty input has a ratio of zero.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn printable_ratio(bytes: &[u8]) -> f64 {
    if bytes.is_empty() {
        return 0.0;
    }
    let printable = bytes
        .iter()
        .filter(|&&b| (0x20..=0x7E).contains(&b) || matches!(b, b'\t' | b'\n' | b'\r'))
        .count();
    printable as f64 / bytes.len() as f64
}

/// Decode a candidate and return its text if it is mostly printable.
///
/// Returns `None` for undecodable candidates and for binary payloads whose
/// printable ratio is below `min_ratio`.
#[must_use]
pub fn decode_text(candidate: &str, min_ratio: f64) -> Option<String> {
    let bytes = decode(candidate)?;
    if printable_ratio(&bytes) < min_ratio {
        return None;
    }
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;

    #[test]
    fn test_base64_alphabet() {
        assert!(is_base64_symbol('A'));
        assert!(is_base64_symbol('z'));
        assert!(is_base64_symbol('7'));
        assert!(is_base64_symbol('+'));
        assert!(is_base64_symbol('/'));
        assert!(!is_base64_symbol('='));
        assert!(is_base64_char('='));
        assert!(!is_base64_char('-'));
        assert!(!is_base64_char('_'));
        assert!(!is_base64_char(' '));
    }

    #[test]
    fn test_decode_padded_and_unpadded() {
        assert_eq!(decode("aGVsbG8=").as_deref(), Some(&b"hello"[..]));
        assert_eq!(decode("aGVsbG8").as_deref(), Some(&b"hello"[..]));
    }

    #[test]
    fn test_decode_rejects_invalid_length() {
        // Five symbols can never be a complete base64 quantum.
        assert!(decode("aGVsb").is_none());
    }

    #[test]
    fn test_printable_ratio() {
        assert!((printable_ratio(b"plain text\n") - 1.0).abs() < f64::EPSILON);
        assert!((printable_ratio(&[0, 1, 2, b'a']) - 0.25).abs() < f64::EPSILON);
        assert!(printable_ratio(&[]).abs() < f64::EPSILON);
    }

    #[test]
    fn test_decode_text_accepts_sentences() {
        let encoded = STANDARD.encode("Your login session has timed out");
        assert_eq!(
            decode_text(&encoded, DEFAULT_MIN_PRINTABLE_RATIO).as_deref(),
            Some("Your login session has timed out")
        );
    }

    #[test]
    fn test_decode_text_rejects_binary() {
        let encoded = STANDARD.encode([0u8, 159, 146, 150, 1, 2, 3, 4, 5, 6, 7, 8, 200, 201]);
        assert!(decode_text(&encoded, DEFAULT_MIN_PRINTABLE_RATIO).is_none());
    }

    #[test]
    fn test_decode_text_rejects_ordinary_words() {
        // Long alphanumeric words decode to noise.
        assert!(decode_text("internationalization", DEFAULT_MIN_PRINTABLE_RATIO).is_none());
    }
}
