//! Workflow configuration.
//!
//! Thresholds, ledger extraction window, the certification target and extra
//! catalog files are read from TOML:
//!
//! ```toml
//! catalog_files = ["catalogs/uec-2025.toml"]
//!
//! [thresholds.uec]
//! mode = "percentage"
//! value = 80
//!
//! [ledger]
//! extract_window = 12
//!
//! [certification]
//! approve_to = "Published"
//! ```
//!
//! Every key is optional; missing keys take the defaults of
//! [`WorkflowConfig::default`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::catalog::{CatalogError, CatalogRegistry};
use crate::ledger::DEFAULT_EXTRACT_WINDOW;
use crate::scoring::Threshold;
use crate::workflow::{Stage, TransitionPolicy, WorkflowStatus};

/// Environment variable naming the config file used when no path is given.
pub const CONFIG_ENV: &str = "IMFLOW_CONFIG";

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

/// Per-stage pass thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThresholdConfig {
    pub imer: Threshold,
    pub pimec: Threshold,
    pub uec: Threshold,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            imer: Threshold::IMER_PIMEC_DEFAULT,
            pimec: Threshold::IMER_PIMEC_DEFAULT,
            uec: Threshold::UEC_DEFAULT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LedgerConfig {
    /// Maximum lines returned when reading a predecessor's block.
    pub extract_window: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            extract_window: DEFAULT_EXTRACT_WINDOW,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CertificationConfig {
    /// `Certified` or `Published`.
    pub approve_to: WorkflowStatus,
}

impl Default for CertificationConfig {
    fn default() -> Self {
        Self {
            approve_to: WorkflowStatus::Certified,
        }
    }
}

/// One threshold option in its transport form:
/// `{stage, thresholdMode, thresholdValue}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdOption {
    pub stage: Stage,
    pub threshold_mode: ThresholdMode,
    pub threshold_value: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdMode {
    Absolute,
    Percentage,
}

impl ThresholdOption {
    pub fn threshold(&self) -> Threshold {
        match self.threshold_mode {
            ThresholdMode::Absolute => Threshold::Absolute(self.threshold_value),
            ThresholdMode::Percentage => Threshold::Percentage(self.threshold_value),
        }
    }
}

/// Complete workflow configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkflowConfig {
    pub thresholds: ThresholdConfig,
    pub ledger: LedgerConfig,
    pub certification: CertificationConfig,
    /// Extra catalog files, relative to the config file's directory.
    pub catalog_files: Vec<PathBuf>,
}

impl WorkflowConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: WorkflowConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&raw)?;
        tracing::debug!(path = %path.display(), "workflow config loaded");
        Ok(config)
    }

    /// Load `path`, else the file named by `IMFLOW_CONFIG`, else defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match std::env::var_os(CONFIG_ENV) {
            Some(env_path) if !env_path.is_empty() => Self::load(Path::new(&env_path)),
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (stage, threshold) in [
            (Stage::Imer, self.thresholds.imer),
            (Stage::Pimec, self.thresholds.pimec),
            (Stage::Uec, self.thresholds.uec),
        ] {
            if let Threshold::Percentage(pct) = threshold {
                if pct > 100 {
                    return Err(ConfigError::Invalid(format!(
                        "{stage} percentage threshold {pct} exceeds 100"
                    )));
                }
            }
        }
        if self.ledger.extract_window == 0 {
            return Err(ConfigError::Invalid(
                "ledger.extract_window must be at least 1".into(),
            ));
        }
        if !self.certification.approve_to.is_terminal() {
            return Err(ConfigError::Invalid(format!(
                "certification.approve_to must be Certified or Published, got '{}'",
                self.certification.approve_to
            )));
        }
        Ok(())
    }

    /// Threshold of a rubric stage; `None` for Faculty and Admin.
    pub fn threshold_for(&self, stage: Stage) -> Option<Threshold> {
        match stage {
            Stage::Imer => Some(self.thresholds.imer),
            Stage::Pimec => Some(self.thresholds.pimec),
            Stage::Uec => Some(self.thresholds.uec),
            Stage::Faculty | Stage::Admin => None,
        }
    }

    /// Override one stage's threshold from its transport form.
    pub fn apply_option(&mut self, option: &ThresholdOption) -> Result<(), ConfigError> {
        let threshold = option.threshold();
        match option.stage {
            Stage::Imer => self.thresholds.imer = threshold,
            Stage::Pimec => self.thresholds.pimec = threshold,
            Stage::Uec => self.thresholds.uec = threshold,
            other => {
                return Err(ConfigError::Invalid(format!(
                    "stage {other} has no rubric threshold"
                )))
            }
        }
        self.validate()
    }

    pub fn transition_policy(&self) -> TransitionPolicy {
        TransitionPolicy {
            approve_to: self.certification.approve_to,
        }
    }

    /// Built-in catalogs plus every `catalog_files` entry, resolved against
    /// `base_dir` when relative.
    pub fn catalogs(&self, base_dir: Option<&Path>) -> Result<CatalogRegistry, ConfigError> {
        let mut registry = CatalogRegistry::builtin();
        for file in &self.catalog_files {
            let path = match base_dir {
                Some(base) if file.is_relative() => base.join(file),
                _ => file.clone(),
            };
            registry.load_file(&path)?;
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_default() {
        let config = WorkflowConfig::from_toml_str("").unwrap();
        assert_eq!(config, WorkflowConfig::default());
        let threshold = |stage| config.threshold_for(stage);
        assert_eq!(threshold(Stage::Imer), Some(Threshold::Absolute(75)));
        assert_eq!(threshold(Stage::Uec), Some(Threshold::Percentage(75)));
        assert_eq!(threshold(Stage::Admin), None);
        assert_eq!(config.ledger.extract_window, DEFAULT_EXTRACT_WINDOW);
    }

    #[test]
    fn parses_all_sections() {
        let config = WorkflowConfig::from_toml_str(
            r#"
            catalog_files = ["extra.toml"]

            [thresholds.uec]
            mode = "percentage"
            value = 80

            [thresholds.pimec]
            mode = "absolute"
            value = 70

            [ledger]
            extract_window = 4

            [certification]
            approve_to = "Published"
            "#,
        )
        .unwrap();
        assert_eq!(config.thresholds.uec, Threshold::Percentage(80));
        assert_eq!(config.thresholds.pimec, Threshold::Absolute(70));
        assert_eq!(config.thresholds.imer, Threshold::Absolute(75));
        assert_eq!(config.ledger.extract_window, 4);
        let policy = config.transition_policy();
        assert_eq!(policy.approve_to, WorkflowStatus::Published);
        assert_eq!(config.catalog_files, vec![PathBuf::from("extra.toml")]);
    }

    #[test]
    fn rejects_percentage_over_100() {
        let err = WorkflowConfig::from_toml_str(
            "[thresholds.uec]\nmode = \"percentage\"\nvalue = 120\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_non_terminal_certification_target() {
        let err = WorkflowConfig::from_toml_str(
            "[certification]\napprove_to = \"For Resubmission\"\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("Certified or Published"));
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(matches!(
            WorkflowConfig::from_toml_str("[ledger]\nwindow = 3\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn threshold_option_overrides_stage() {
        let mut config = WorkflowConfig::default();
        let option: ThresholdOption = serde_json::from_value(serde_json::json!({
            "stage": "UEC",
            "thresholdMode": "absolute",
            "thresholdValue": 50
        }))
        .unwrap();
        config.apply_option(&option).unwrap();
        assert_eq!(config.thresholds.uec, Threshold::Absolute(50));

        let admin = ThresholdOption {
            stage: Stage::Admin,
            threshold_mode: ThresholdMode::Absolute,
            threshold_value: 1,
        };
        assert!(config.apply_option(&admin).is_err());
    }
}
