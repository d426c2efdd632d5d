//! XDG-compliant path resolution for sprachschalter.
//!
//! Configuration lives under `$XDG_CONFIG_HOME/sprachschalter/`, the model
//! artifact, training data, and device snapshot under
//! `$XDG_DATA_HOME/sprachschalter/`.

use std::path::{Path, PathBuf};

use miette::Diagnostic;
use thiserror::Error;

const APP_DIR: &str = "sprachschalter";

/// Errors from path resolution.
#[derive(Debug, Error, Diagnostic)]
pub enum PathError {
    #[error("cannot determine home directory")]
    #[diagnostic(
        code(schalter::paths::no_home),
        help("Set the HOME environment variable or ensure a valid user profile exists.")
    )]
    NoHome,

    #[error("failed to create directory: {path}")]
    #[diagnostic(
        code(schalter::paths::create_dir),
        help("Check that the parent directory exists and you have write permissions.")
    )]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type PathResult<T> = std::result::Result<T, PathError>;

/// Directories used by sprachschalter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchalterPaths {
    /// `$XDG_CONFIG_HOME/sprachschalter/`
    pub config_dir: PathBuf,
    /// `$XDG_DATA_HOME/sprachschalter/`
    pub data_dir: PathBuf,
}

impl SchalterPaths {
    /// Resolve directories from the XDG environment variables, falling back
    /// to `~/.config` and `~/.local/share`.
    pub fn resolve() -> PathResult<Self> {
        let home = std::env::var("HOME")
            .map(PathBuf::from)
            .map_err(|_| PathError::NoHome)?;

        let config_dir = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".config"))
            .join(APP_DIR);

        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".local/share"))
            .join(APP_DIR);

        Ok(Self {
            config_dir,
            data_dir,
        })
    }

    /// Use explicit roots instead of the environment.
    pub fn with_roots(config_dir: impl Into<PathBuf>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            data_dir: data_dir.into(),
        }
    }

    /// Create the base directories. Idempotent.
    pub fn ensure_dirs(&self) -> PathResult<()> {
        for dir in [
            self.config_dir.clone(),
            self.models_dir(),
            self.training_dir(),
            self.devices_dir(),
        ] {
            create_dir(&dir)?;
        }
        Ok(())
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    pub fn models_dir(&self) -> PathBuf {
        self.data_dir.join("models")
    }

    /// Default location of the intent model artifact.
    pub fn model_file(&self) -> PathBuf {
        self.models_dir().join("intent_model.bin")
    }

    pub fn training_dir(&self) -> PathBuf {
        self.data_dir.join("training")
    }

    /// Default location of the training data.
    pub fn training_file(&self) -> PathBuf {
        self.training_dir().join("training_data.csv")
    }

    pub fn devices_dir(&self) -> PathBuf {
        self.data_dir.join("devices")
    }

    /// Default location of the offline device snapshot.
    pub fn device_snapshot_file(&self) -> PathBuf {
        self.devices_dir().join("deviceList.json")
    }
}

fn create_dir(dir: &Path) -> PathResult<()> {
    std::fs::create_dir_all(dir).map_err(|e| PathError::CreateDir {
        path: dir.display().to_string(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolved_paths_end_in_app_dir() {
        // Reads the real environment; mutating env vars is unsafe in edition 2024.
        let paths = SchalterPaths::resolve().unwrap();
        assert!(paths.config_dir.ends_with(APP_DIR));
        assert!(paths.data_dir.ends_with(APP_DIR));
    }

    #[test]
    fn files_derive_from_roots() {
        let paths = SchalterPaths::with_roots("/cfg/sprachschalter", "/data/sprachschalter");
        assert_eq!(paths.config_file(), PathBuf::from("/cfg/sprachschalter/config.toml"));
        assert_eq!(
            paths.model_file(),
            PathBuf::from("/data/sprachschalter/models/intent_model.bin")
        );
        assert_eq!(
            paths.training_file(),
            PathBuf::from("/data/sprachschalter/training/training_data.csv")
        );
        assert_eq!(
            paths.device_snapshot_file(),
            PathBuf::from("/data/sprachschalter/devices/deviceList.json")
        );
    }

    #[test]
    fn ensure_dirs_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let paths = SchalterPaths::with_roots(dir.path().join("cfg"), dir.path().join("data"));
        paths.ensure_dirs().unwrap();
        paths.ensure_dirs().unwrap();
        assert!(paths.models_dir().is_dir());
        assert!(paths.training_dir().is_dir());
        assert!(paths.config_dir.is_dir());
    }
}
