//! Configuration loaded from a TOML file.
//!
//! Every field has a default, so an empty or missing file is valid.
//!
//! ```toml
//! [transfer]
//! max_retries = 3
//! connect_timeout_secs = 20
//! busy_policy = "reject"
//!
//! [render]
//! fonts_dir = "/usr/share/etiqueta/fonts"
//!
//! [server]
//! listen = "0.0.0.0:8080"
//!
//! [logging]
//! level = "info"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::EtiquetaError;
use crate::transfer::{BusyPolicy, TransferConfig};

/// Where the loaded configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File,
    Missing,
    /// The file exists but did not parse; defaults are in use.
    Invalid(String),
}

impl ConfigSource {
    /// Log how the configuration was obtained.
    pub fn log(&self, path: &Path) {
        match self {
            ConfigSource::File => tracing::debug!("config loaded from {}", path.display()),
            ConfigSource::Missing => {
                tracing::info!("no config at {}; using defaults", path.display())
            }
            ConfigSource::Invalid(e) => {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display())
            }
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub transfer: TransferSettings,
    pub render: RenderSettings,
    pub server: ServerSettings,
    pub logging: LoggingSettings,
}

/// Transfer limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferSettings {
    /// Resends allowed per chunk.
    pub max_retries: u32,
    pub connect_timeout_secs: u64,
    /// Wait for each device reply.
    pub chunk_timeout_secs: u64,
    /// Bound on a whole transfer, connect included.
    pub transfer_timeout_secs: u64,
    /// "reject" or "queue".
    pub busy_policy: BusyPolicy,
}

/// Asset locations for the composer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Directory scanned for `.ttf`/`.otf` files. Empty disables TTF fonts.
    pub fonts_dir: String,
    /// Icon font file. Empty disables icons.
    pub icon_font: String,
    /// Icon metadata JSON (name → codepoint).
    pub icon_meta: String,
    /// Timeout for image downloads.
    pub fetch_timeout_secs: u64,
}

/// HTTP service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub listen: String,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Filter directive: "trace", "debug", "info", "etiqueta=debug", ...
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for TransferSettings {
    fn default() -> Self {
        let defaults = TransferConfig::default();
        Self {
            max_retries: defaults.max_retries,
            connect_timeout_secs: defaults.connect_timeout.as_secs(),
            chunk_timeout_secs: defaults.chunk_timeout.as_secs(),
            transfer_timeout_secs: defaults.transfer_timeout.as_secs(),
            busy_policy: BusyPolicy::Reject,
        }
    }
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            fonts_dir: String::new(),
            icon_font: String::new(),
            icon_meta: String::new(),
            fetch_timeout_secs: 10,
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".into(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    ///
    /// Nothing is logged here: this runs before the subscriber exists, so the
    /// caller reports the returned [`ConfigSource`] once logging is up.
    pub fn load(path: &Path) -> (Self, ConfigSource) {
        match std::fs::read_to_string(path) {
            Ok(contents) => match Self::parse(&contents) {
                Ok(config) => (config, ConfigSource::File),
                Err(e) => (Self::default(), ConfigSource::Invalid(e.to_string())),
            },
            Err(_) => (Self::default(), ConfigSource::Missing),
        }
    }

    /// Parse configuration from TOML text.
    pub fn parse(text: &str) -> Result<Self, EtiquetaError> {
        toml::from_str(text).map_err(|e| EtiquetaError::Config(e.to_string()))
    }

    /// Write the default configuration to a file (for bootstrapping).
    pub fn write_default(path: &Path) -> Result<(), EtiquetaError> {
        let text = toml::to_string_pretty(&Self::default())
            .map_err(|e| EtiquetaError::Config(e.to_string()))?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Driver limits. Zero timeouts are raised to one second.
    pub fn to_transfer_config(&self) -> TransferConfig {
        let secs = |s: u64| Duration::from_secs(s.max(1));
        TransferConfig {
            max_retries: self.transfer.max_retries,
            connect_timeout: secs(self.transfer.connect_timeout_secs),
            chunk_timeout: secs(self.transfer.chunk_timeout_secs),
            transfer_timeout: secs(self.transfer.transfer_timeout_secs),
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.render.fetch_timeout_secs.max(1))
    }

    pub fn fonts_dir(&self) -> Option<PathBuf> {
        non_empty(&self.render.fonts_dir)
    }

    /// Icon font and metadata paths, when both are set.
    pub fn icon_paths(&self) -> Option<(PathBuf, PathBuf)> {
        Some((non_empty(&self.render.icon_font)?, non_empty(&self.render.icon_meta)?))
    }
}

fn non_empty(path: &str) -> Option<PathBuf> {
    (!path.trim().is_empty()).then(|| PathBuf::from(path))
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_config_serializes() {
        let text = toml::to_string_pretty(&AppConfig::default()).unwrap();
        assert!(text.contains("[transfer]"));
        assert!(text.contains("max_retries = 3"));
        assert!(text.contains("busy_policy = \"reject\""));
    }

    #[test]
    fn roundtrip_config() {
        let cfg = AppConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        let parsed = AppConfig::parse(&text).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let cfg = AppConfig::parse(
            r#"
            [transfer]
            max_retries = 5
            busy_policy = "queue"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.transfer.max_retries, 5);
        assert_eq!(cfg.transfer.busy_policy, BusyPolicy::Queue);
        assert_eq!(cfg.transfer.chunk_timeout_secs, 30);
        assert_eq!(cfg.server.listen, "0.0.0.0:8080");
    }

    #[test]
    fn invalid_policy_is_rejected() {
        let err = AppConfig::parse("[transfer]\nbusy_policy = \"drop\"").unwrap_err();
        assert!(matches!(err, EtiquetaError::Config(_)));
    }

    #[test]
    fn missing_file_falls_back() {
        let (cfg, source) = AppConfig::load(Path::new("/nonexistent/etiqueta.toml"));
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(source, ConfigSource::Missing);
    }

    #[test]
    fn invalid_file_reports_parse_error() {
        let path = std::env::temp_dir().join(format!("etiqueta-invalid-{}.toml", std::process::id()));
        std::fs::write(&path, "[transfer]\nmax_retries = \"many\"\n").unwrap();
        let (cfg, source) = AppConfig::load(&path);
        std::fs::remove_file(&path).unwrap();

        assert_eq!(cfg, AppConfig::default());
        assert!(matches!(source, ConfigSource::Invalid(_)));
    }

    #[test]
    fn valid_file_is_used() {
        let path = std::env::temp_dir().join(format!("etiqueta-valid-{}.toml", std::process::id()));
        std::fs::write(&path, "[server]\nlisten = \"127.0.0.1:9000\"\n").unwrap();
        let (cfg, source) = AppConfig::load(&path);
        std::fs::remove_file(&path).unwrap();

        assert_eq!(source, ConfigSource::File);
        assert_eq!(cfg.server.listen, "127.0.0.1:9000");
    }

    #[test]
    fn to_transfer_config_clamps_zero() {
        let mut cfg = AppConfig::default();
        cfg.transfer.chunk_timeout_secs = 0;
        let t = cfg.to_transfer_config();
        assert_eq!(t.chunk_timeout, Duration::from_secs(1));
        assert_eq!(t.max_retries, 3);
    }

    #[test]
    fn icon_paths_need_both() {
        let mut cfg = AppConfig::default();
        cfg.render.icon_font = "mdi.ttf".into();
        assert_eq!(cfg.icon_paths(), None);
        cfg.render.icon_meta = "meta.json".into();
        assert!(cfg.icon_paths().is_some());
    }
}
