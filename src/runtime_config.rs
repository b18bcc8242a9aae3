// =============================================================================
// Runtime Configuration — engine settings with atomic save
// =============================================================================
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash.  All fields carry `#[serde(default)]` so that adding new fields
// never breaks loading an older config file.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::decision_record::DEFAULT_PROFIT_THRESHOLD_PCT;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_backend_base_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_bind_addr() -> String {
    "0.0.0.0:3001".to_string()
}

fn default_profit_threshold_pct() -> f64 {
    DEFAULT_PROFIT_THRESHOLD_PCT
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level runtime configuration for the TenderBid engine.
///
/// Every field has a serde default so that older JSON files missing new
/// fields will still deserialise correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Base URL of the backend host serving the matching, recommendation,
    /// document-generation, and history services.
    #[serde(default = "default_backend_base_url")]
    pub backend_base_url: String,

    /// Address the REST API binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Starting minimum acceptable profit margin percentage. The operator
    /// can adjust this per session via the API.
    #[serde(default = "default_profit_threshold_pct")]
    pub default_profit_threshold_pct: f64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            backend_base_url: default_backend_base_url(),
            bind_addr: default_bind_addr(),
            default_profit_threshold_pct: default_profit_threshold_pct(),
        }
    }
}

impl RuntimeConfig {
    /// Read the configuration from the JSON file at `path`. A missing or
    /// unparseable file is an error; the caller decides whether to fall
    /// back to defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading runtime config {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("parsing runtime config {}", path.display()))?;

        info!(
            path = %path.display(),
            backend = %config.backend_base_url,
            threshold = config.default_profit_threshold_pct,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Persist to `path`. Writes a `.tmp` sibling first and renames it
    /// into place so a crash mid-write never leaves a truncated file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("serialising runtime config")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("writing tmp config {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("renaming tmp config into {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.backend_base_url, "http://127.0.0.1:8000");
        assert_eq!(cfg.bind_addr, "0.0.0.0:3001");
        assert!((cfg.default_profit_threshold_pct - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: RuntimeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.backend_base_url, "http://127.0.0.1:8000");
        assert!((cfg.default_profit_threshold_pct - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "backend_base_url": "https://tenders.internal:9000" }"#;
        let cfg: RuntimeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.backend_base_url, "https://tenders.internal:9000");
        assert_eq!(cfg.bind_addr, "0.0.0.0:3001");
    }

    #[test]
    fn roundtrip_serialisation() {
        let mut cfg = RuntimeConfig::default();
        cfg.default_profit_threshold_pct = 5.5;
        let json = serde_json::to_string(&cfg).unwrap();
        let cfg2: RuntimeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg.backend_base_url, cfg2.backend_base_url);
        assert!((cfg2.default_profit_threshold_pct - 5.5).abs() < f64::EPSILON);
    }
}
