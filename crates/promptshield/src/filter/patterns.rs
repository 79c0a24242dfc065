//! Built-in phishing-intent patterns.
//!
//! This module provides the case-insensitive patterns used to classify decoded
//! payload text as a fabricated login, session or security prompt. The set is
//! configuration data: callers may drop the built-in list, extend it with their
//! own expressions, or both.

use regex::{Regex, RegexBuilder};
use tracing::warn;

use crate::error::{Error, Result};

/// A compiled phishing-intent pattern.
#[derive(Debug, Clone)]
pub struct PhishingPattern {
    /// Name of the pattern for identification.
    pub name: String,

    /// Description of what this pattern matches.
    pub description: String,

    /// The compiled, case-insensitive regex.
    regex: Regex,
}

impl PhishingPattern {
    /// Create a new pattern from a trusted, known-valid expression.
    ///
    /// # Panics
    ///
    /// Panics if the regex pattern is invalid.
    #[must_use]
    pub fn new(name: &str, description: &str, pattern: &str) -> Self {
        Self::try_new(name, description, pattern).expect("Invalid regex pattern")
    }

    /// Create a new pattern, compiling it case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPattern`] if the expression does not compile.
    pub fn try_new(name: &str, description: &str, pattern: &str) -> Result<Self> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|source| Error::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })?;
        Ok(Self {
            name: name.to_string(),
            description: description.to_string(),
            regex,
        })
    }

    /// Check if the text matches this pattern.
    #[must_use]
    pub fn matches(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

/// Get all built-in phishing patterns.
///
/// The list covers four categories: session time-outs, re-login prompts,
/// credential or account verification requests, and security alert wording.
#[must_use]
pub fn builtin_phishing_patterns() -> Vec<PhishingPattern> {
    vec![
        // Session time-outs
        PhishingPattern::new(
            "session_timeout",
            "Claims that a login or session has timed out or expired",
            r"\b(?:login|log-in|sign-?in|session)\s+(?:has\s+|is\s+)?(?:timed\s*-?\s*out|expired)\b",
        ),
        // Re-login prompts
        PhishingPattern::new(
            "relogin_prompt",
            "Asks the reader to log or sign in again",
            r"\b(?:log|sign)\s*-?\s*in\s+again\b",
        ),
        PhishingPattern::new(
            "click_to_login",
            "Click-here style login links",
            r"\bclick\s+(?:here|this\s+link|below)\s+to\s+(?:log|sign)\s*-?\s*in\b",
        ),
        // Credential and account verification
        PhishingPattern::new(
            "account_verification",
            "Requests to verify or confirm an account or identity",
            r"\b(?:verify|confirm|validate)\s+your\s+(?:account|identity|credentials|password|login)\b",
        ),
        PhishingPattern::new(
            "credential_request",
            "Requests to enter or update a password or credentials",
            r"\b(?:enter|re-?enter|provide|update)\s+your\s+(?:password|credentials|login\s+details)\b",
        ),
        // Security alerts
        PhishingPattern::new(
            "security_alert",
            "Fabricated security alert or suspicious activity notice",
            r"\b(?:security\s+alert|(?:suspicious|unusual)\s+(?:activity|sign-?in|login))\b",
        ),
        PhishingPattern::new(
            "account_locked",
            "Claims that the account is suspended or locked",
            r"\byour\s+account\s+(?:has\s+been|will\s+be|is)\s+(?:suspended|locked|disabled|compromised)\b",
        ),
    ]
}

/// The set of patterns decoded payloads are classified against.
#[derive(Debug, Clone)]
pub struct PhishingMatcher {
    patterns: Vec<PhishingPattern>,
}

impl PhishingMatcher {
    /// Create a matcher with the built-in patterns.
    #[must_use]
    pub fn new() -> Self {
        Self::with_patterns(builtin_phishing_patterns())
    }

    /// Create a matcher from an explicit pattern list.
    #[must_use]
    pub fn with_patterns(patterns: Vec<PhishingPattern>) -> Self {
        Self { patterns }
    }

    /// Create a matcher from configuration.
    ///
    /// Custom patterns that fail to compile are skipped with a warning.
    #[must_use]
    pub fn from_config(use_builtin: bool, custom_patterns: &[String]) -> Self {
        let mut patterns = if use_builtin {
            builtin_phishing_patterns()
        } else {
            Vec::new()
        };

        for (i, source) in custom_patterns.iter().enumerate() {
            let name = format!("custom_{i}");
            match PhishingPattern::try_new(&name, "Custom phishing pattern", source) {
                Ok(pattern) => patterns.push(pattern),
                Err(e) => warn!(pattern = %source, error = %e, "Invalid custom phishing pattern"),
            }
        }

        Self { patterns }
    }

    /// Return the first pattern the text matches, if any.
    #[must_use]
    pub fn classify(&self, text: &str) -> Option<&PhishingPattern> {
        self.patterns.iter().find(|p| p.matches(text))
    }

    /// The patterns in classification order.
    #[must_use]
    pub fn patterns(&self) -> &[PhishingPattern] {
        &self.patterns
    }
}

impl Default for PhishingMatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(text: &str) -> Option<String> {
        PhishingMatcher::new().classify(text).map(|p| p.name.clone())
    }

    #[test]
    fn test_builtin_patterns_have_names() {
        let patterns = builtin_phishing_patterns();
        assert!(!patterns.is_empty());
        for pattern in patterns {
            assert!(!pattern.name.is_empty());
            assert!(!pattern.description.is_empty());
        }
    }

    #[test]
    fn test_session_timeout() {
        assert_eq!(
            classify("Your login session has timed out").as_deref(),
            Some("session_timeout")
        );
        assert_eq!(
            classify("your SESSION EXPIRED").as_deref(),
            Some("session_timeout")
        );
    }

    #[test]
    fn test_relogin_prompts() {
        assert_eq!(
            classify("Please log in again").as_deref(),
            Some("relogin_prompt")
        );
        assert_eq!(
            classify("Click here to log in to AI-Assistant").as_deref(),
            Some("click_to_login")
        );
        assert!(PhishingMatcher::new().classify("click here to sign-in").is_some());
    }

    #[test]
    fn test_verification_requests() {
        assert_eq!(
            classify("we need you to verify your account").as_deref(),
            Some("account_verification")
        );
        assert_eq!(
            classify("Enter your password below").as_deref(),
            Some("credential_request")
        );
    }

    #[test]
    fn test_security_alerts() {
        assert_eq!(
            classify("SECURITY ALERT: action required").as_deref(),
            Some("security_alert")
        );
        assert_eq!(
            classify("Your account has been suspended").as_deref(),
            Some("account_locked")
        );
    }

    #[test]
    fn test_benign_text_not_classified() {
        let matcher = PhishingMatcher::new();
        assert!(matcher.classify("This is just normal text content").is_none());
        assert!(matcher.classify("just some ordinary encoded content").is_none());
        assert!(matcher.classify("the blogin service logs incoming requests").is_none());
        assert!(matcher.classify("Session notes from the planning meeting").is_none());
    }

    #[test]
    fn test_from_config_custom_patterns() {
        let matcher = PhishingMatcher::from_config(false, &[r"wire\s+the\s+funds".to_string()]);
        assert_eq!(matcher.patterns().len(), 1);
        assert_eq!(
            matcher.classify("Please WIRE THE FUNDS today").map(|p| p.name.as_str()),
            Some("custom_0")
        );
        assert!(matcher.classify("Please log in again").is_none());
    }

    #[test]
    fn test_from_config_skips_invalid_patterns() {
        let matcher =
            PhishingMatcher::from_config(true, &["[invalid".to_string(), "valid".to_string()]);
        assert_eq!(
            matcher.patterns().len(),
            builtin_phishing_patterns().len() + 1
        );
    }

    #[test]
    fn test_try_new_invalid() {
        let result = PhishingPattern::try_new("bad", "bad", "(unclosed");
        assert!(matches!(result, Err(Error::InvalidPattern { .. })));
    }
}
