//! Configuration management for promptshield.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::filter::encoding::DEFAULT_MIN_PRINTABLE_RATIO;
use crate::filter::payload::DEFAULT_MIN_PAYLOAD_LENGTH;
use crate::filter::FilterOptions;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default configuration directory name.
const CONFIG_DIR_NAME: &str = "promptshield";

/// Prefix for environment variable overrides.
const ENV_PREFIX: &str = "PROMPTSHIELD_";

/// Smallest accepted payload run length.
const MIN_PAYLOAD_LENGTH_FLOOR: usize = 4;

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `PROMPTSHIELD_`, sections split on `__`)
/// 2. TOML config file at `~/.config/promptshield/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Content filter configuration.
    pub filter: FilterConfig,
    /// File ingestion configuration.
    pub ingest: IngestConfig,
}

/// Content filter configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Run the filter over uploaded content.
    pub enabled: bool,
    /// Only remove canonically formatted system objects.
    pub strict_mode: bool,
    /// Skip whitespace normalization.
    pub preserve_whitespace: bool,
    /// Collect per-match diagnostics.
    pub log_matches: bool,
    /// Minimum base64 run length, in symbols.
    pub min_payload_length: usize,
    /// Share of printable bytes a decoded payload needs.
    pub min_printable_ratio: f64,
    /// Include the built-in phishing patterns.
    pub use_builtin_patterns: bool,
    /// Extra phishing patterns (regex, matched case-insensitively).
    pub custom_phishing_patterns: Vec<String>,
}

/// File ingestion configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Maximum size of an uploaded file in bytes.
    pub max_file_bytes: u64,
    /// Maximum length of extracted text in characters.
    pub max_content_chars: usize,
    /// Remove long binary base64 blobs from extracted text.
    pub strip_embedded_objects: bool,
    /// Minimum length of a base64 blob to strip.
    pub embedded_object_min_length: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strict_mode: false,
            preserve_whitespace: false,
            log_matches: false,
            min_payload_length: DEFAULT_MIN_PAYLOAD_LENGTH,
            min_printable_ratio: DEFAULT_MIN_PRINTABLE_RATIO,
            use_builtin_patterns: true,
            custom_phishing_patterns: Vec::new(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: 10 * 1024 * 1024, // 10 MiB
            max_content_chars: 1_000_000,
            strip_embedded_objects: true,
            embedded_object_min_length: 100,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Configuration is loaded in this order (later sources override earlier):
    /// 1. Default values
    /// 2. TOML config file (if exists)
    /// 3. Environment variables (prefixed with `PROMPTSHIELD_`)
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);
        let config = Self::figment(config_file).extract::<Config>()?;
        config.validate()?;
        Ok(config)
    }

    fn figment(config_file: PathBuf) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        // Validate filter config
        if self.filter.min_payload_length < MIN_PAYLOAD_LENGTH_FLOOR {
            return Err(Error::ConfigValidation {
                message: format!(
                    "min_payload_length ({}) must be at least {MIN_PAYLOAD_LENGTH_FLOOR}",
                    self.filter.min_payload_length
                ),
            });
        }

        let ratio = self.filter.min_printable_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(Error::ConfigValidation {
                message: format!("min_printable_ratio ({ratio}) must be in (0, 1]"),
            });
        }

        // Validate regex patterns
        for pattern in &self.filter.custom_phishing_patterns {
            if regex::Regex::new(pattern).is_err() {
                return Err(Error::ConfigValidation {
                    message: format!("invalid regex pattern: {pattern}"),
                });
            }
        }

        // Validate ingest config
        if self.ingest.max_file_bytes == 0 {
            return Err(Error::ConfigValidation {
                message: "max_file_bytes must be greater than 0".to_string(),
            });
        }

        if self.ingest.embedded_object_min_length < self.filter.min_payload_length {
            return Err(Error::ConfigValidation {
                message: format!(
                    "embedded_object_min_length ({}) cannot be less than min_payload_length ({})",
                    self.ingest.embedded_object_min_length, self.filter.min_payload_length
                ),
            });
        }

        Ok(())
    }

    /// Get the filter options selected by this configuration.
    #[must_use]
    pub fn filter_options(&self) -> FilterOptions {
        FilterOptions {
            strict_mode: self.filter.strict_mode,
            preserve_whitespace: self.filter.preserve_whitespace,
            log_matches: self.filter.log_matches,
        }
    }
}
