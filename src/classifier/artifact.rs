//! On-disk model artifact: a bincode snapshot of the classifier state.
//!
//! Layout: magic bytes, format version, then the state (vectorizer parameters
//! and vocabulary, corpus rows and labels, threshold). Writes go to a sibling
//! temp file that is renamed over the target, so readers never observe a
//! half-written artifact.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::ClassifierState;
use crate::error::{ClassifierError, ClassifierResult};

const MAGIC: [u8; 4] = *b"SSIM";
const FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct ArtifactRef<'a> {
    magic: [u8; 4],
    version: u32,
    state: &'a ClassifierState,
}

#[derive(Deserialize)]
struct Artifact {
    magic: [u8; 4],
    version: u32,
    state: ClassifierState,
}

/// Atomically write `state` to `path`, creating parent directories.
pub fn write_artifact(path: &Path, state: &ClassifierState) -> ClassifierResult<()> {
    let bytes = bincode::serialize(&ArtifactRef {
        magic: MAGIC,
        version: FORMAT_VERSION,
        state,
    })
    .map_err(|e| ClassifierError::Serialization {
        message: format!("failed to encode model artifact: {e}"),
    })?;

    let persist_err = |source: std::io::Error| ClassifierError::Persist {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(persist_err)?;
        }
    }

    let tmp = temp_path(path);
    {
        let mut file = std::fs::File::create(&tmp).map_err(persist_err)?;
        file.write_all(&bytes).map_err(persist_err)?;
        file.sync_all().map_err(persist_err)?;
    }
    std::fs::rename(&tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        persist_err(e)
    })?;

    tracing::debug!(path = %path.display(), bytes = bytes.len(), "model artifact written");
    Ok(())
}

/// Read and validate an artifact. Every failure is a `LoadFailure`.
pub fn read_artifact(path: &Path) -> ClassifierResult<ClassifierState> {
    let load_failure = |message: String| ClassifierError::LoadFailure {
        path: path.display().to_string(),
        message,
    };

    let bytes = std::fs::read(path).map_err(|e| load_failure(e.to_string()))?;
    let artifact: Artifact =
        bincode::deserialize(&bytes).map_err(|e| load_failure(format!("decode failed: {e}")))?;

    if artifact.magic != MAGIC {
        return Err(load_failure("not a model artifact".into()));
    }
    if artifact.version != FORMAT_VERSION {
        return Err(load_failure(format!(
            "format version {} (expected {FORMAT_VERSION})",
            artifact.version
        )));
    }
    artifact.state.validate().map_err(load_failure)?;
    Ok(artifact.state)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "artifact".into());
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_path_is_a_sibling() {
        let tmp = temp_path(Path::new("/data/models/intent_model.bin"));
        assert_eq!(tmp, PathBuf::from("/data/models/intent_model.bin.tmp"));
    }

    #[test]
    fn garbage_is_a_load_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("intent_model.bin");
        std::fs::write(&path, b"definitely not bincode").unwrap();
        assert!(matches!(
            read_artifact(&path),
            Err(ClassifierError::LoadFailure { .. })
        ));
    }

    #[test]
    fn missing_file_is_a_load_failure() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            read_artifact(&dir.path().join("absent.bin")),
            Err(ClassifierError::LoadFailure { .. })
        ));
    }
}
