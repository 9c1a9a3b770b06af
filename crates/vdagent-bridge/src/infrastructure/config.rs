//! TOML configuration for the bridge binary.
//!
//! Every field has a default, so the bridge runs with no config file at all
//! and an older file missing newer fields still loads.  Example:
//!
//! ```toml
//! [features]
//! mouse = true
//! clipboard = true
//!
//! [transport]
//! listen_address = "127.0.0.1:5930"
//! write_budget = 65536
//! stall_timeout_ms = 5000
//!
//! [host_feed]
//! enabled = true
//!
//! [display]
//! width = 1920
//! height = 1080
//! ```
//!
//! # Serde default values
//!
//! Fields annotated with `#[serde(default = "some_fn")]` use the return value
//! of `some_fn()` when the field is absent.  Whole sections annotated with
//! `#[serde(default)]` fall back to the section's `Default` impl.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use vdagent_core::domain::pointer::DisplaySize;

use crate::application::negotiate_caps::FeatureConfig;
use crate::application::outbound::DEFAULT_MAX_PENDING_BYTES;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level bridge configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BridgeConfig {
    #[serde(default)]
    pub features: FeaturesSection,
    #[serde(default)]
    pub transport: TransportSection,
    #[serde(default)]
    pub display: DisplaySection,
    #[serde(default)]
    pub mouse: MouseSection,
    #[serde(default)]
    pub host_feed: HostFeedSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Which host features are offered to guests.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeaturesSection {
    #[serde(default = "default_true")]
    pub mouse: bool,
    #[serde(default = "default_true")]
    pub clipboard: bool,
}

/// Guest channel settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransportSection {
    /// TCP address the guest channel is served on.
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    /// Bytes that may be queued towards one guest socket at a time.
    #[serde(default = "default_write_budget")]
    pub write_budget: usize,
    /// Outbound bytes a session may hold back while the socket is full.
    #[serde(default = "default_max_pending_bytes")]
    pub max_pending_bytes: usize,
    /// How long held-back output may wait without the guest reading any of
    /// it before the session is dropped, in milliseconds.
    #[serde(default = "default_stall_timeout_ms")]
    pub stall_timeout_ms: u64,
}

/// Resolution used to scale absolute pointer positions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DisplaySection {
    #[serde(default = "default_display_width")]
    pub width: u32,
    #[serde(default = "default_display_height")]
    pub height: u32,
}

/// Pointer synchronisation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MouseSection {
    /// Interval between MOUSE_STATE updates, in milliseconds.
    #[serde(default = "default_sync_interval_ms")]
    pub sync_interval_ms: u64,
}

/// Host control feed on standard input (pointer moves, host copy/paste).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostFeedSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingSection {
    /// `tracing` level used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub level: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_true() -> bool {
    true
}
fn default_listen_address() -> String {
    "127.0.0.1:5930".to_string()
}
fn default_write_budget() -> usize {
    64 * 1024
}
fn default_max_pending_bytes() -> usize {
    DEFAULT_MAX_PENDING_BYTES
}
fn default_stall_timeout_ms() -> u64 {
    5_000
}
fn default_display_width() -> u32 {
    1024
}
fn default_display_height() -> u32 {
    768
}
fn default_sync_interval_ms() -> u64 {
    20
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for FeaturesSection {
    fn default() -> Self {
        Self {
            mouse: default_true(),
            clipboard: default_true(),
        }
    }
}

impl Default for TransportSection {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            write_budget: default_write_budget(),
            max_pending_bytes: default_max_pending_bytes(),
            stall_timeout_ms: default_stall_timeout_ms(),
        }
    }
}

impl Default for HostFeedSection {
    fn default() -> Self {
        Self {
            enabled: default_true(),
        }
    }
}

impl Default for DisplaySection {
    fn default() -> Self {
        Self {
            width: default_display_width(),
            height: default_display_height(),
        }
    }
}

impl Default for MouseSection {
    fn default() -> Self {
        Self {
            sync_interval_ms: default_sync_interval_ms(),
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl BridgeConfig {
    /// The feature switches as the negotiator consumes them.
    pub fn feature_config(&self) -> FeatureConfig {
        FeatureConfig {
            mouse: self.features.mouse,
            clipboard: self.features.clipboard,
        }
    }

    /// The configured display resolution.
    pub fn display_size(&self) -> DisplaySize {
        DisplaySize::new(self.display.width, self.display.height)
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Loads the configuration from `path`, or returns the defaults when `path`
/// is `None` or the file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: Option<&Path>) -> Result<BridgeConfig, ConfigError> {
    let Some(path) = path else {
        return Ok(BridgeConfig::default());
    };

    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BridgeConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_enables_both_features() {
        let cfg = BridgeConfig::default();
        assert_eq!(cfg.feature_config(), FeatureConfig { mouse: true, clipboard: true });
        assert_eq!(cfg.display_size(), DisplaySize::new(1024, 768));
        assert_eq!(cfg.transport.max_pending_bytes, 256 * 1024);
        assert_eq!(cfg.transport.stall_timeout_ms, 5_000);
        assert!(cfg.host_feed.enabled);
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let cfg: BridgeConfig = toml::from_str("").expect("deserialize empty");
        assert_eq!(cfg, BridgeConfig::default());
    }

    #[test]
    fn test_partial_section_overrides_only_given_fields() {
        // Arrange
        let toml_str = r#"
[features]
clipboard = false

[display]
width = 1920
"#;

        // Act
        let cfg: BridgeConfig = toml::from_str(toml_str).expect("deserialize partial");

        // Assert
        assert!(cfg.features.mouse);
        assert!(!cfg.features.clipboard);
        assert_eq!(cfg.display_size(), DisplaySize::new(1920, 768));
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let mut cfg = BridgeConfig::default();
        cfg.transport.listen_address = "0.0.0.0:6000".to_string();
        cfg.mouse.sync_interval_ms = 50;

        let text = toml::to_string_pretty(&cfg).expect("serialize");
        let restored: BridgeConfig = toml::from_str(&text).expect("deserialize");

        assert_eq!(cfg, restored);
    }

    #[test]
    fn test_load_config_missing_file_returns_defaults() {
        let path = std::env::temp_dir().join(format!("vdagent-missing-{}.toml", uuid::Uuid::new_v4()));
        let cfg = load_config(Some(&path)).unwrap();
        assert_eq!(cfg, BridgeConfig::default());
    }

    #[test]
    fn test_load_config_reads_file_and_reports_parse_errors() {
        // Arrange
        let dir = std::env::temp_dir();
        let good = dir.join(format!("vdagent-good-{}.toml", uuid::Uuid::new_v4()));
        let bad = dir.join(format!("vdagent-bad-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(&good, "[logging]\nlevel = \"debug\"\n").unwrap();
        std::fs::write(&bad, "[[[ not valid toml").unwrap();

        // Act
        let loaded = load_config(Some(&good));
        let failed = load_config(Some(&bad));
        let _ = std::fs::remove_file(&good);
        let _ = std::fs::remove_file(&bad);

        // Assert
        assert_eq!(loaded.unwrap().logging.level, "debug");
        assert!(matches!(failed, Err(ConfigError::Parse(_))));
    }
}
