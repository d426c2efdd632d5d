//! Assistant configuration, persisted as TOML in
//! `$XDG_CONFIG_HOME/sprachschalter/config.toml`.
//!
//! Every field has a default, so an empty or partial file is valid. Paths
//! left unset fall back to the XDG layout of [`SchalterPaths`].

use std::path::{Path, PathBuf};

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::classifier::{
    BootstrapOptions, ClassifierOptions, DEFAULT_EVAL_FRACTION, DEFAULT_INTENT_THRESHOLD,
    DEFAULT_SPLIT_SEED, VectorizerParams,
};
use crate::device::DEFAULT_MATCH_THRESHOLD;
use crate::hub::HubConfig;
use crate::linguistic::RemoteConfig;
use crate::paths::SchalterPaths;
use crate::training::TrainingSource;

/// Errors from reading or writing the configuration file.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(schalter::config::read),
        help("Ensure the config file exists and is valid TOML. `schalter config init` writes a default one.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {message}")]
    #[diagnostic(
        code(schalter::config::parse),
        help("Check the TOML syntax. `schalter config show` prints the effective configuration.")
    )]
    Parse { path: String, message: String },

    #[error("failed to write config: {path}")]
    #[diagnostic(
        code(schalter::config::write),
        help("Ensure you have write permissions to the config directory.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid setting {key} = {value}")]
    #[diagnostic(code(schalter::config::invalid), help("{hint}"))]
    Invalid {
        key: String,
        value: String,
        hint: String,
    },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Intent classifier settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierSection {
    /// Minimum cosine similarity for a confident intent.
    #[serde(default = "default_intent_threshold")]
    pub threshold: f32,
    /// Fraction of training examples held out for evaluation.
    #[serde(default = "default_eval_fraction")]
    pub eval_fraction: f32,
    #[serde(default = "default_split_seed")]
    pub split_seed: u64,
    /// Model artifact; defaults to the data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_path: Option<PathBuf>,
    /// Training CSV; defaults to the data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub training_path: Option<PathBuf>,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
}

fn default_intent_threshold() -> f32 {
    DEFAULT_INTENT_THRESHOLD
}
fn default_eval_fraction() -> f32 {
    DEFAULT_EVAL_FRACTION
}
fn default_split_seed() -> u64 {
    DEFAULT_SPLIT_SEED
}
fn default_delimiter() -> char {
    ','
}

impl Default for ClassifierSection {
    fn default() -> Self {
        Self {
            threshold: default_intent_threshold(),
            eval_fraction: default_eval_fraction(),
            split_seed: default_split_seed(),
            model_path: None,
            training_path: None,
            delimiter: default_delimiter(),
        }
    }
}

/// Device resolver settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolverSection {
    #[serde(default = "default_match_threshold")]
    pub threshold: f32,
}

fn default_match_threshold() -> f32 {
    DEFAULT_MATCH_THRESHOLD
}

impl Default for ResolverSection {
    fn default() -> Self {
        Self {
            threshold: default_match_threshold(),
        }
    }
}

/// Where the device list comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceSource {
    /// Live from the Home Assistant hub.
    #[default]
    Hub,
    /// From a JSON snapshot file.
    Snapshot,
}

/// Device registry settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DevicesSection {
    #[serde(default)]
    pub source: DeviceSource,
    /// Snapshot file; defaults to the data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_path: Option<PathBuf>,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantConfig {
    #[serde(default)]
    pub classifier: ClassifierSection,
    #[serde(default)]
    pub resolver: ResolverSection,
    #[serde(default)]
    pub devices: DevicesSection,
    #[serde(default)]
    pub linguistics: RemoteConfig,
    #[serde(default)]
    pub hub: HubConfig,
}

impl AssistantConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise use defaults.
    pub fn load_or_default(path: &Path) -> ConfigResult<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Save to a TOML file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = self.to_toml(path)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// Render as TOML; `path` is only used in error messages.
    pub fn to_toml(&self, path: &Path) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Reject values the pipeline cannot work with.
    pub fn validate(&self) -> ConfigResult<()> {
        let unit = |key: &str, value: f32| {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(ConfigError::Invalid {
                    key: key.into(),
                    value: value.to_string(),
                    hint: "Similarity thresholds are between 0.0 and 1.0.".into(),
                })
            }
        };
        unit("classifier.threshold", self.classifier.threshold)?;
        unit("resolver.threshold", self.resolver.threshold)?;
        if !(0.0..1.0).contains(&self.classifier.eval_fraction) {
            return Err(ConfigError::Invalid {
                key: "classifier.eval_fraction".into(),
                value: self.classifier.eval_fraction.to_string(),
                hint: "Use a fraction in [0, 1), e.g. 0.2.".into(),
            });
        }
        Ok(())
    }

    pub fn model_path(&self, paths: &SchalterPaths) -> PathBuf {
        self.classifier
            .model_path
            .clone()
            .unwrap_or_else(|| paths.model_file())
    }

    pub fn training_source(&self, paths: &SchalterPaths) -> TrainingSource {
        let path = self
            .classifier
            .training_path
            .clone()
            .unwrap_or_else(|| paths.training_file());
        TrainingSource::new(path).with_delimiter(self.classifier.delimiter)
    }

    pub fn snapshot_path(&self, paths: &SchalterPaths) -> PathBuf {
        self.devices
            .snapshot_path
            .clone()
            .unwrap_or_else(|| paths.device_snapshot_file())
    }

    pub fn classifier_options(&self) -> ClassifierOptions {
        ClassifierOptions {
            threshold: self.classifier.threshold,
            params: VectorizerParams::default(),
            split_seed: self.classifier.split_seed,
        }
    }

    pub fn bootstrap_options(&self, paths: &SchalterPaths, force_train: bool) -> BootstrapOptions {
        BootstrapOptions {
            artifact_path: self.model_path(paths),
            training: self.training_source(paths),
            eval_fraction: self.classifier.eval_fraction,
            force_train,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config: AssistantConfig = toml::from_str("").unwrap();
        assert_eq!(config, AssistantConfig::default());
        assert_eq!(config.classifier.threshold, 0.4);
        assert_eq!(config.classifier.eval_fraction, 0.2);
        assert_eq!(config.resolver.threshold, 0.5);
        assert_eq!(config.devices.source, DeviceSource::Hub);
        assert_eq!(config.hub.token_env, "HA_TOKEN");
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config: AssistantConfig = toml::from_str(
            r#"
            [classifier]
            threshold = 0.55
            delimiter = ";"

            [devices]
            source = "snapshot"
            snapshot_path = "/tmp/devices.json"
            "#,
        )
        .unwrap();
        assert_eq!(config.classifier.threshold, 0.55);
        assert_eq!(config.classifier.delimiter, ';');
        assert_eq!(config.classifier.eval_fraction, 0.2);
        assert_eq!(config.devices.source, DeviceSource::Snapshot);

        let paths = SchalterPaths::with_roots("/cfg", "/data");
        assert_eq!(config.snapshot_path(&paths), PathBuf::from("/tmp/devices.json"));
        assert_eq!(config.model_path(&paths), PathBuf::from("/data/models/intent_model.bin"));
        assert_eq!(config.training_source(&paths).delimiter, ';');
    }

    #[test]
    fn config_roundtrip_toml() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("config.toml");
        let mut config = AssistantConfig::default();
        config.resolver.threshold = 0.6;
        config.classifier.model_path = Some(PathBuf::from("/models/m.bin"));
        config.save(&path).unwrap();
        assert_eq!(AssistantConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[resolver]\nthreshold = 1.5\n").unwrap();
        assert!(matches!(
            AssistantConfig::load(&path),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = AssistantConfig::load_or_default(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config, AssistantConfig::default());
    }
}
