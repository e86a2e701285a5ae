//! Configuration file parser for ~/.config/riffle/config.toml.
//!
//! The config file is optional; a missing or empty file yields
//! `Config::default()`. Unknown keys are accepted but logged as warnings.
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::detail::DEFAULT_DETAIL_CAPACITY;
use crate::filter::{DateRange, FilterState, SortOrder};
use crate::gesture::DEFAULT_SWIPE_THRESHOLD;
use crate::prefetch::DEFAULT_PREFETCH_RADIUS;
use crate::session::{SessionSettings, DEFAULT_PAGE_SIZE};

/// Environment variable that overrides `api_token`.
pub const TOKEN_ENV_VAR: &str = "RIFFLE_API_TOKEN";

/// Largest page the server is asked for.
pub const MAX_PAGE_SIZE: u32 = 500;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid config value for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// `Debug` masks `api_token`.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the item server. `--server` overrides it.
    pub server_url: Option<String>,

    /// Bearer token. `RIFFLE_API_TOKEN` takes precedence.
    pub api_token: Option<String>,

    /// Background refresh interval in seconds. 0 = manual refresh only.
    pub refresh_interval_secs: u64,

    /// Items requested per page.
    pub page_size: u32,

    /// Neighbors on each side of the open item whose bodies are prefetched.
    pub prefetch_radius: usize,

    /// How long a fetched item body is reused without asking again.
    pub detail_fresh_secs: u64,

    /// Horizontal travel needed for a swipe. Values below 50 are raised.
    pub swipe_threshold: f32,

    /// Whether Esc and clicks outside the reader close it.
    pub backdrop_close: bool,

    pub sort: SortOrder,
    pub show_read: bool,
    pub date_range: DateRange,

    /// Custom keybinding overrides. Keys are action names, values are key strings.
    pub keybindings: HashMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: None,
            api_token: None,
            refresh_interval_secs: 300,
            page_size: DEFAULT_PAGE_SIZE,
            prefetch_radius: DEFAULT_PREFETCH_RADIUS,
            detail_fresh_secs: 300,
            swipe_threshold: DEFAULT_SWIPE_THRESHOLD,
            backdrop_close: true,
            sort: SortOrder::default(),
            show_read: false,
            date_range: DateRange::default(),
            keybindings: HashMap::new(),
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("server_url", &self.server_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .field("refresh_interval_secs", &self.refresh_interval_secs)
            .field("page_size", &self.page_size)
            .field("prefetch_radius", &self.prefetch_radius)
            .field("detail_fresh_secs", &self.detail_fresh_secs)
            .field("swipe_threshold", &self.swipe_threshold)
            .field("backdrop_close", &self.backdrop_close)
            .field("sort", &self.sort)
            .field("show_read", &self.show_read)
            .field("date_range", &self.date_range)
            .field("keybindings", &self.keybindings)
            .finish()
    }
}

const KNOWN_KEYS: [&str; 12] = [
    "server_url",
    "api_token",
    "refresh_interval_secs",
    "page_size",
    "prefetch_radius",
    "detail_fresh_secs",
    "swipe_threshold",
    "backdrop_close",
    "sort",
    "show_read",
    "date_range",
    "keybindings",
];

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing or empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Out-of-range values → `Err(ConfigError::Invalid)`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
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
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        let config = Self::parse(&content)?;
        tracing::info!(
            path = %path.display(),
            server = ?config.server_url,
            page_size = config.page_size,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parses and validates TOML text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        config.validate()
    }

    fn validate(mut self) -> Result<Self, ConfigError> {
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(ConfigError::Invalid {
                key: "page_size",
                reason: format!("must be between 1 and {}", MAX_PAGE_SIZE),
            });
        }
        if !self.swipe_threshold.is_finite() || self.swipe_threshold < DEFAULT_SWIPE_THRESHOLD {
            tracing::warn!(
                value = self.swipe_threshold,
                min = DEFAULT_SWIPE_THRESHOLD,
                "swipe_threshold below minimum, raising"
            );
            self.swipe_threshold = DEFAULT_SWIPE_THRESHOLD;
        }
        if let Some(url) = &self.server_url {
            if url.trim().is_empty() {
                self.server_url = None;
            }
        }
        Ok(self)
    }

    /// The bearer token, preferring `RIFFLE_API_TOKEN` over the file.
    pub fn api_token(&self) -> Option<SecretString> {
        resolve_token(std::env::var(TOKEN_ENV_VAR).ok(), self.api_token.as_deref())
    }

    pub fn refresh_interval(&self) -> Option<Duration> {
        (self.refresh_interval_secs > 0).then(|| Duration::from_secs(self.refresh_interval_secs))
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            page_size: self.page_size,
            prefetch_radius: self.prefetch_radius,
            detail_fresh_for: Duration::from_secs(self.detail_fresh_secs),
            detail_capacity: DEFAULT_DETAIL_CAPACITY,
        }
    }

    /// Initial filter built from `sort`, `show_read` and `date_range`.
    pub fn initial_filter(&self) -> FilterState {
        FilterState::new(self.show_read, self.date_range, self.sort)
    }
}

fn resolve_token(env: Option<String>, file: Option<&str>) -> Option<SecretString> {
    env.filter(|t| !t.trim().is_empty())
        .or_else(|| file.filter(|t| !t.trim().is_empty()).map(str::to_owned))
        .map(|t| SecretString::from(t.trim().to_owned()))
}

/// `~/.config/riffle`, honoring `XDG_CONFIG_HOME`.
pub fn config_dir() -> Option<PathBuf> {
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(xdg).join("riffle"));
    }
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config").join("riffle"))
}

// ============================================================================
// Tests
// ============================================================================
