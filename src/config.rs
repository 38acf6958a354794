//! Configuration management
//!
//! Settings arrive as loosely shaped JSON: in `initializationOptions`, and again in every
//! `workspace/didChangeConfiguration`. Clients send them either flat or nested under a
//! `secbit` key, and some send only the fields that changed. We try the strict shapes
//! first, then fall back to merging field by field so one bad value does not throw away
//! the rest.

use crate::{analysis::AnalyzerOptions, registry::RuleRegistry};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const SETTINGS_SECTION: &str = "secbit";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecbitConfig {
    /// Native SECBIT compiler. Absent or empty selects the embedded compiler.
    pub solc: Option<PathBuf>,

    pub enables: Vec<String>,

    #[serde(rename = "noSMT")]
    pub no_smt: bool,

    #[serde(rename = "asERC20")]
    pub as_erc20: bool,

    #[serde(rename = "onSave")]
    pub on_save: bool,
}

/// Analyzer options for one run plus the configured tags the registry does not know.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedOptions {
    pub options: AnalyzerOptions,
    pub unknown_tags: Vec<String>,
}

impl SecbitConfig {
    pub fn from_lsp_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        if let Some(section) = value.get(SETTINGS_SECTION) {
            if let Ok(config) = serde_json::from_value::<SecbitConfig>(section.clone()) {
                debug!("Deserialized configuration from '{}' key", SETTINGS_SECTION);
                return Ok(config);
            }
        } else if let Ok(config) = serde_json::from_value::<SecbitConfig>(value.clone()) {
            debug!("Deserialized configuration directly");
            return Ok(config);
        }

        let mut config = SecbitConfig::default();
        config.update_from_lsp_value(value)?;
        Ok(config)
    }

    /// Merges whatever recognizable settings `value` carries into `self`.
    pub fn update_from_lsp_value(&mut self, value: serde_json::Value) -> Result<(), serde_json::Error> {
        let settings = match value.get(SETTINGS_SECTION) {
            Some(section) => section.clone(),
            None => value,
        };

        if !settings.is_object() {
            return Err(serde::de::Error::custom(format!(
                "expected settings object, found {}",
                settings
            )));
        }

        if let Some(solc) = settings.get("solc") {
            match solc {
                serde_json::Value::Null => self.solc = None,
                serde_json::Value::String(path) => self.solc = Some(PathBuf::from(path)),
                other => debug!("Ignoring non-string solc setting: {}", other),
            }
        }

        if let Some(enables) = settings.get("enables") {
            match serde_json::from_value::<Vec<String>>(enables.clone()) {
                Ok(tags) => self.enables = tags,
                Err(e) => debug!("Ignoring malformed enables setting: {}", e),
            }
        }

        if let Some(no_smt) = settings.get("noSMT").and_then(|v| v.as_bool()) {
            self.no_smt = no_smt;
        }

        if let Some(as_erc20) = settings.get("asERC20").and_then(|v| v.as_bool()) {
            self.as_erc20 = as_erc20;
        }

        if let Some(on_save) = settings.get("onSave").and_then(|v| v.as_bool()) {
            self.on_save = on_save;
        }

        info!("Configuration updated: {:?}", self);
        Ok(())
    }

    pub fn solc_path(&self) -> Option<&Path> {
        self.solc
            .as_deref()
            .filter(|path| !path.as_os_str().is_empty())
    }

    /// Splits `enables` against the registry; unknown tags are left out of the options.
    pub fn resolve_options(&self, registry: &RuleRegistry) -> ResolvedOptions {
        let selection = registry.filter_tags(&self.enables);

        ResolvedOptions {
            options: AnalyzerOptions {
                no_smt: self.no_smt,
                as_erc20: self.as_erc20,
                tags: selection.accepted,
            },
            unknown_tags: selection.unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_config() {
        let config = SecbitConfig::default();

        assert!(config.solc_path().is_none());
        assert!(config.enables.is_empty());
        assert!(!config.no_smt);
        assert!(!config.as_erc20);
        assert!(!config.on_save);
    }

    #[test]
    fn test_config_from_flat_value() {
        let config = SecbitConfig::from_lsp_value(json!({
            "solc": "/opt/secbit/solc",
            "enables": ["reentrance", "tx-origin"],
            "noSMT": true,
            "asERC20": true,
            "onSave": true
        }))
        .unwrap();

        assert_eq!(config.solc_path(), Some(Path::new("/opt/secbit/solc")));
        assert_eq!(config.enables, vec!["reentrance", "tx-origin"]);
        assert!(config.no_smt);
        assert!(config.as_erc20);
        assert!(config.on_save);
    }

    #[test]
    fn test_config_from_section_value() {
        let config = SecbitConfig::from_lsp_value(json!({
            "secbit": { "onSave": true, "enables": ["throw"] }
        }))
        .unwrap();

        assert!(config.on_save);
        assert_eq!(config.enables, vec!["throw"]);
        assert!(config.solc.is_none());
    }

    #[test]
    fn test_config_partial_merge_skips_bad_fields() {
        let config = SecbitConfig::from_lsp_value(json!({
            "secbit": {
                "solc": "/usr/bin/solc",
                "enables": "reentrance",
                "onSave": "yes",
                "asERC20": true
            }
        }))
        .unwrap();

        assert_eq!(config.solc_path(), Some(Path::new("/usr/bin/solc")));
        assert!(config.enables.is_empty());
        assert!(!config.on_save);
        assert!(config.as_erc20);
    }

    #[test]
    fn test_update_from_lsp_value_keeps_unmentioned_fields() {
        let mut config = SecbitConfig {
            solc: Some(PathBuf::from("/usr/bin/solc")),
            on_save: true,
            ..Default::default()
        };

        config
            .update_from_lsp_value(json!({ "secbit": { "noSMT": true } }))
            .unwrap();

        assert!(config.no_smt);
        assert!(config.on_save);
        assert_eq!(config.solc_path(), Some(Path::new("/usr/bin/solc")));

        config
            .update_from_lsp_value(json!({ "secbit": { "solc": null } }))
            .unwrap();
        assert!(config.solc_path().is_none());
    }

    #[test]
    fn test_update_rejects_non_object() {
        let mut config = SecbitConfig::default();
        assert!(config.update_from_lsp_value(json!(42)).is_err());
        assert!(SecbitConfig::from_lsp_value(json!("solc")).is_err());
    }

    #[test]
    fn test_empty_solc_is_absent() {
        let config = SecbitConfig::from_lsp_value(json!({ "solc": "" })).unwrap();
        assert!(config.solc.is_some());
        assert!(config.solc_path().is_none());
    }

    #[test]
    fn test_resolve_options_rejects_unknown_tags() {
        let config = SecbitConfig {
            enables: vec!["reentrance".to_string(), "bogus-tag".to_string()],
            no_smt: true,
            as_erc20: true,
            ..Default::default()
        };

        let resolved = config.resolve_options(&RuleRegistry::secbit());

        assert_eq!(resolved.options.tags, vec!["reentrance"]);
        assert_eq!(resolved.unknown_tags, vec!["bogus-tag"]);
        assert!(resolved.options.no_smt);
        assert!(resolved.options.as_erc20);
    }

    #[test]
    fn test_config_serialization_uses_setting_names() {
        let config = SecbitConfig {
            no_smt: true,
            ..Default::default()
        };

        let value = serde_json::to_value(&config).unwrap();

        assert_eq!(value["noSMT"], json!(true));
        assert_eq!(value["asERC20"], json!(false));
        assert_eq!(value["onSave"], json!(false));
        assert_eq!(SecbitConfig::from_lsp_value(value).unwrap(), config);
    }
}
