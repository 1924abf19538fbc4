//! Run configuration: defaults, then an optional JSON file, then
//! `UPGRADE_IMPACT_*` environment variables, then command-line overrides.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{AuditError, AuditResult};
use crate::search::filesystem::DEFAULT_SCRIPT_PATTERN;
use crate::search::guards::{
    clamp_text_limit, clamp_workers, DEFAULT_MAX_ENCODED_TEXT_BYTES, DEFAULT_SCRIPT_WORKERS,
};
use crate::store::database::resolve_path;

pub const ENV_PREFIX: &str = "UPGRADE_IMPACT_";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuditConfig {
    /// New snapshot plus the custom-object catalog.
    pub catalog_path: PathBuf,
    /// Old snapshot, attached as `legacy`.
    pub legacy_path: PathBuf,
    pub custom_project: String,
    pub report_id: String,
    pub script_root: PathBuf,
    pub script_pattern: String,
    pub run_log_path: PathBuf,
    pub script_workers: usize,
    pub max_encoded_text_bytes: usize,
    pub json_out: Option<PathBuf>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            catalog_path: PathBuf::from("upgrade_catalog.db"),
            legacy_path: PathBuf::from("legacy_catalog.db"),
            custom_project: "UPGCUST".to_string(),
            report_id: "UPGIMPACT".to_string(),
            script_root: PathBuf::from("/psft/sqr"),
            script_pattern: DEFAULT_SCRIPT_PATTERN.to_string(),
            run_log_path: PathBuf::from("upgrade_impact.log"),
            script_workers: DEFAULT_SCRIPT_WORKERS,
            max_encoded_text_bytes: DEFAULT_MAX_ENCODED_TEXT_BYTES,
            json_out: None,
        }
    }
}

/// Values given on the command line; `None` leaves the layer below in place.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub catalog_path: Option<PathBuf>,
    pub legacy_path: Option<PathBuf>,
    pub custom_project: Option<String>,
    pub report_id: Option<String>,
    pub script_root: Option<PathBuf>,
    pub script_pattern: Option<String>,
    pub run_log_path: Option<PathBuf>,
    pub script_workers: Option<usize>,
    pub json_out: Option<PathBuf>,
}

impl AuditConfig {
    pub fn from_file(path: &Path) -> AuditResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AuditError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        serde_json::from_str(&raw)
            .map_err(|e| AuditError::Config(format!("invalid config {}: {e}", path.display())))
    }

    /// Full layering: defaults, file, process environment, overrides.
    pub fn load(file: Option<&Path>, overrides: &ConfigOverrides) -> AuditResult<Self> {
        let mut config = match file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.apply_overrides(overrides);
        config.validate()?;
        Ok(config)
    }

    /// Apply `UPGRADE_IMPACT_*` variables looked up through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> AuditResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let parse_usize = |name: &str, value: String| {
            value.parse::<usize>().map_err(|_| {
                AuditError::Config(format!("{ENV_PREFIX}{name} must be a positive integer, got {value:?}"))
            })
        };

        if let Some(v) = var("CATALOG") {
            self.catalog_path = PathBuf::from(v);
        }
        if let Some(v) = var("LEGACY") {
            self.legacy_path = PathBuf::from(v);
        }
        if let Some(v) = var("PROJECT") {
            self.custom_project = v;
        }
        if let Some(v) = var("REPORT_ID") {
            self.report_id = v;
        }
        if let Some(v) = var("SCRIPT_ROOT") {
            self.script_root = PathBuf::from(v);
        }
        if let Some(v) = var("SCRIPT_PATTERN") {
            self.script_pattern = v;
        }
        if let Some(v) = var("LOG") {
            self.run_log_path = PathBuf::from(v);
        }
        if let Some(v) = var("SCRIPT_WORKERS") {
            self.script_workers = parse_usize("SCRIPT_WORKERS", v)?;
        }
        if let Some(v) = var("MAX_TEXT_BYTES") {
            self.max_encoded_text_bytes = parse_usize("MAX_TEXT_BYTES", v)?;
        }
        if let Some(v) = var("JSON_OUT") {
            let flag = v.to_lowercase();
            self.json_out = if matches!(flag.as_str(), "0" | "false" | "no" | "off") {
                None
            } else {
                Some(PathBuf::from(v))
            };
        }
        Ok(())
    }

    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        let o = overrides.clone();
        if let Some(v) = o.catalog_path {
            self.catalog_path = v;
        }
        if let Some(v) = o.legacy_path {
            self.legacy_path = v;
        }
        if let Some(v) = o.custom_project {
            self.custom_project = v;
        }
        if let Some(v) = o.report_id {
            self.report_id = v;
        }
        if let Some(v) = o.script_root {
            self.script_root = v;
        }
        if let Some(v) = o.script_pattern {
            self.script_pattern = v;
        }
        if let Some(v) = o.run_log_path {
            self.run_log_path = v;
        }
        if let Some(v) = o.script_workers {
            self.script_workers = v;
        }
        if o.json_out.is_some() {
            self.json_out = o.json_out;
        }
    }

    /// Reject blank identifiers and bring numeric knobs into range.
    pub fn validate(&mut self) -> AuditResult<()> {
        for (name, value) in [
            ("custom_project", &self.custom_project),
            ("report_id", &self.report_id),
            ("script_pattern", &self.script_pattern),
        ] {
            if value.trim().is_empty() {
                return Err(AuditError::Config(format!("{name} must not be blank")));
            }
        }
        if self.script_workers == 0 {
            return Err(AuditError::Config("script_workers must be at least 1".to_string()));
        }
        self.script_workers = clamp_workers(self.script_workers);
        self.max_encoded_text_bytes = clamp_text_limit(self.max_encoded_text_bytes);
        Ok(())
    }

    /// Expand `~` and make every path absolute.
    pub fn resolve_paths(&mut self) -> AuditResult<()> {
        self.catalog_path = resolve_path(&self.catalog_path)?;
        self.legacy_path = resolve_path(&self.legacy_path)?;
        self.script_root = resolve_path(&self.script_root)?;
        self.run_log_path = resolve_path(&self.run_log_path)?;
        if let Some(path) = &self.json_out {
            self.json_out = Some(resolve_path(path)?);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AuditConfig::default();
        assert_eq!(config.custom_project, "UPGCUST");
        assert_eq!(config.script_pattern, "*.sq?");
        assert_eq!(config.script_root, PathBuf::from("/psft/sqr"));
        assert_eq!(config.max_encoded_text_bytes, 4 * 1024 * 1024);
    }

    #[test]
    fn test_file_then_env_then_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.json");
        std::fs::write(
            &path,
            r#"{"custom_project": "FROMFILE", "report_id": "FILE_RUN", "script_workers": 2}"#,
        )
        .unwrap();

        let mut config = AuditConfig::from_file(&path).unwrap();
        assert_eq!(config.custom_project, "FROMFILE");
        assert_eq!(config.script_pattern, "*.sq?");

        config
            .apply_env(env(&[
                ("UPGRADE_IMPACT_PROJECT", "FROMENV"),
                ("UPGRADE_IMPACT_SCRIPT_WORKERS", "8"),
            ]))
            .unwrap();
        assert_eq!(config.custom_project, "FROMENV");
        assert_eq!(config.report_id, "FILE_RUN");
        assert_eq!(config.script_workers, 8);

        config.apply_overrides(&ConfigOverrides {
            custom_project: Some("FROMCLI".into()),
            ..Default::default()
        });
        assert_eq!(config.custom_project, "FROMCLI");
        assert_eq!(config.script_workers, 8);
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.json");
        std::fs::write(&path, r#"{"projekt": "X"}"#).unwrap();
        assert!(matches!(
            AuditConfig::from_file(&path),
            Err(AuditError::Config(_))
        ));
    }

    #[test]
    fn test_bad_env_number_is_config_error() {
        let mut config = AuditConfig::default();
        let err = config
            .apply_env(env(&[("UPGRADE_IMPACT_SCRIPT_WORKERS", "many")]))
            .unwrap_err();
        assert!(matches!(err, AuditError::Config(_)));
    }

    #[test]
    fn test_json_out_can_be_disabled_from_env() {
        let mut config = AuditConfig {
            json_out: Some(PathBuf::from("totals.json")),
            ..Default::default()
        };
        config
            .apply_env(env(&[("UPGRADE_IMPACT_JSON_OUT", "off")]))
            .unwrap();
        assert_eq!(config.json_out, None);
    }

    #[test]
    fn test_validate() {
        let mut config = AuditConfig {
            report_id: "  ".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let mut config = AuditConfig {
            script_workers: 500,
            max_encoded_text_bytes: 1,
            ..Default::default()
        };
        config.validate().unwrap();
        assert_eq!(config.script_workers, 32);
        assert_eq!(config.max_encoded_text_bytes, 1024);

        let mut config = AuditConfig {
            script_workers: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
