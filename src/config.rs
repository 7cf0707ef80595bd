//! Configuration file parser for ~/.config/newsdesk/config.toml.
//!
//! The config file is optional — a missing file yields `Config::default()`.
//! Unknown keys are silently ignored by serde (with `deny_unknown_fields`
//! off), though we log a warning when the file contains potential typos.
use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds the maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Struct
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// Missing keys fall back to `Default::default()`.
///
/// The custom Debug impl masks `api_key` so the credential cannot leak into
/// logs, error messages, or debug output.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Two-letter country code sent with every headlines request.
    pub country: String,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Whether switching category also clears the current search text.
    ///
    /// Off by default: the search box keeps its text across category
    /// switches, and the new feed is filtered by it immediately.
    pub clear_search_on_category_change: bool,

    /// Headlines API base URL. Overridable mainly for testing.
    pub base_url: String,

    /// Headlines API key (alternative to the NEWSDESK_API_KEY env var).
    /// Env var takes precedence over config file.
    pub api_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            country: "us".to_string(),
            request_timeout_secs: 30,
            clear_search_on_category_change: false,
            base_url: "https://newsapi.org".to_string(),
            api_key: None,
        }
    }
}

/// Mask api_key in Debug output to prevent secret leakage.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("country", &self.country)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field(
                "clear_search_on_category_change",
                &self.clear_search_on_category_change,
            )
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → silently accepted (serde default behavior), logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check file size before reading to bound memory use on a corrupted
        // or maliciously large config file.
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        // Parse the TOML content first as a raw table to detect unknown keys
        if let Ok(raw) = content.parse::<toml::Table>() {
            let known_keys = [
                "country",
                "request_timeout_secs",
                "clear_search_on_category_change",
                "base_url",
                "api_key",
            ];
            for key in raw.keys() {
                if !known_keys.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), country = %config.country, "Loaded configuration");
        Ok(config)
    }

    /// Resolve the API key: the NEWSDESK_API_KEY env var wins over the
    /// config file. Returns None when neither is set.
    ///
    /// The key is wrapped in a [`SecretString`] at the earliest opportunity;
    /// nothing downstream ever holds it as a plain `String`.
    pub fn resolve_api_key(&self) -> Option<SecretString> {
        if let Ok(key) = std::env::var("NEWSDESK_API_KEY") {
            if !key.trim().is_empty() {
                return Some(SecretString::from(key));
            }
        }
        self.api_key
            .as_ref()
            .map(|key| SecretString::from(key.clone()))
    }
}

// ============================================================================
// Tests
// ============================================================================
