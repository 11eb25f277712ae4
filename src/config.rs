/*============================================================
  Synavera Project: UCW
  Module: ucw_core::config
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Load UCW configuration: bridge timing, placeholder text
    overrides per language, and default paths for the binary.

  Security / Safety Notes:
    Text overrides are treated as trusted page-owner HTML and
    are passed through to the markup boundary unchanged.

  Dependencies:
    serde + toml for parsing, dirs for default locations.

  Operational Scope:
    Read once at startup; the engine receives immutable copies
    of the sections it needs.

  Revision History:
    2025-11-12 COD  Authored configuration layer.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Sensible defaults when no file is present
    - Explicit error paths for malformed configuration
============================================================*/

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, UcwError};

const CONFIG_DIR: &str = "ucw";
const CONFIG_FILE: &str = "config.toml";

/// Top-level UCW configuration document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UcwConfig {
    /// Emit DEBUG log lines (the page-side `ucw-debug` switch).
    pub debug: bool,
    pub bridge: BridgeConfig,
    pub widget: WidgetConfig,
    pub paths: PathsConfig,
}

/// Timing knobs for the consent bridge.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Window in which native change events coalesce into one recheck.
    pub debounce_ms: u64,
    /// Readiness polling cadence for surfaces without a ready event.
    pub ready_poll_ms: u64,
    /// Delay of the second full recheck after the CMP reports ready.
    pub ready_recheck_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 100,
            ready_poll_ms: 16,
            ready_recheck_ms: 500,
        }
    }
}

impl BridgeConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn ready_poll(&self) -> Duration {
        Duration::from_millis(self.ready_poll_ms.max(1))
    }

    pub fn ready_recheck(&self) -> Duration {
        Duration::from_millis(self.ready_recheck_ms)
    }
}

/// Placeholder text overrides. Root-level fields apply to every language.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WidgetConfig {
    #[serde(flatten)]
    pub defaults: TextOverrides,
    /// Per-language blocks keyed by two-letter code (case-insensitive).
    pub i18n: BTreeMap<String, TextOverrides>,
}

impl WidgetConfig {
    /// Look up the block for a language, ignoring case and region suffix.
    pub fn for_language(&self, lang: &str) -> Option<&TextOverrides> {
        let code = language_code(lang);
        self.i18n
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(&code))
            .map(|(_, overrides)| overrides)
    }
}

/// One set of text overrides.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TextOverrides {
    pub text_html: Option<String>,
    pub accept_label: Option<String>,
    pub accept_label_class: Option<String>,
    pub text_service_prefix: Option<String>,
    pub text_suffix_html: Option<String>,
}

/// Default locations used by the binary.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub report: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
}

impl UcwConfig {
    /// Load from an explicit path, else the user config dir, else defaults.
    pub fn load_from_optional_path(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => match default_config_path() {
                Some(candidate) if candidate.is_file() => Self::load(&candidate),
                _ => Ok(Self::default()),
            },
        }
    }

    /// Parse the TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            UcwError::Config(format!("Failed to read config {}: {err}", path.display()))
        })?;
        Self::from_toml(&raw)
            .map_err(|err| UcwError::Config(format!("{}: {err}", path.display())))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|err| UcwError::Config(format!("Invalid config: {err}")))
    }

    pub fn report_path(&self) -> PathBuf {
        self.paths
            .report
            .clone()
            .unwrap_or_else(|| state_dir().join("activation_report.json"))
    }

    pub fn log_dir(&self) -> PathBuf {
        self.paths
            .log_dir
            .clone()
            .unwrap_or_else(|| state_dir().join("logs"))
    }
}

/// Reduce `de-DE` / `DE` / `de` to `de`.
pub fn language_code(lang: &str) -> String {
    lang.split(['-', '_'])
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
}

fn state_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(CONFIG_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
debug = true

[bridge]
debounce_ms = 250

[widget]
accept_label = "Load content"

[widget.i18n.de]
text_html = "<p>Wir verwenden Dienste von Drittanbietern.</p>"
accept_label = "Cookies dauerhaft zulassen"
accept_label_class = "btn btn-primary"

[widget.i18n.EN]
text_service_prefix = "We use "
"#;

    #[test]
    fn parses_sections_and_keeps_defaults() {
        let config = UcwConfig::from_toml(SAMPLE).unwrap();
        assert!(config.debug);
        assert_eq!(config.bridge.debounce(), Duration::from_millis(250));
        assert_eq!(config.bridge.ready_poll_ms, 16);
        assert_eq!(config.bridge.ready_recheck_ms, 500);
        assert_eq!(
            config.widget.defaults.accept_label.as_deref(),
            Some("Load content")
        );
    }

    #[test]
    fn language_lookup_ignores_case_and_region() {
        let config = UcwConfig::from_toml(SAMPLE).unwrap();
        let de = config.widget.for_language("de-DE").unwrap();
        assert_eq!(de.accept_label_class.as_deref(), Some("btn btn-primary"));
        let en = config.widget.for_language("en").unwrap();
        assert_eq!(en.text_service_prefix.as_deref(), Some("We use "));
        assert!(config.widget.for_language("fr").is_none());
    }

    #[test]
    fn explicit_path_errors_are_config_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[bridge]\ndebounce_ms = \"soon\"\n").unwrap();
        let err = UcwConfig::load_from_optional_path(Some(&path)).unwrap_err();
        assert!(matches!(err, UcwError::Config(_)));
    }
}
