//! Startup policy: reuse a saved model when possible, otherwise train one.

use std::path::PathBuf;

use super::{DEFAULT_EVAL_FRACTION, IntentClassifier, TrainingReport};
use crate::error::ClassifierError;
use crate::training::TrainingSource;

/// Where the model lives and where to train it from.
#[derive(Debug, Clone)]
pub struct BootstrapOptions {
    pub artifact_path: PathBuf,
    pub training: TrainingSource,
    pub eval_fraction: f32,
    /// Train even if an artifact exists.
    pub force_train: bool,
}

impl BootstrapOptions {
    pub fn new(artifact_path: impl Into<PathBuf>, training: TrainingSource) -> Self {
        Self {
            artifact_path: artifact_path.into(),
            training,
            eval_fraction: DEFAULT_EVAL_FRACTION,
            force_train: false,
        }
    }
}

/// How the classifier ended up in its current state.
#[derive(Debug)]
pub enum BootstrapOutcome {
    /// The saved artifact was loaded.
    Loaded,
    /// A new model was trained (forced or no artifact present).
    Trained(TrainingReport),
    /// The artifact failed to load and a replacement was trained.
    Retrained {
        load_error: ClassifierError,
        report: TrainingReport,
    },
    /// No model could be produced; the classifier stays untrained.
    Untrained { error: ClassifierError },
}

impl BootstrapOutcome {
    pub fn is_ready(&self) -> bool {
        !matches!(self, Self::Untrained { .. })
    }
}

/// Bring `classifier` into a trained state according to `options`.
///
/// Freshly trained models are persisted to `options.artifact_path`; a failed
/// write is logged but does not undo the training.
pub fn bootstrap(classifier: &IntentClassifier, options: &BootstrapOptions) -> BootstrapOutcome {
    let path = &options.artifact_path;

    if !options.force_train && path.exists() {
        match classifier.load(path) {
            Ok(()) => return BootstrapOutcome::Loaded,
            Err(load_error) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %load_error,
                    "saved intent model unusable, retraining"
                );
                return match train_and_persist(classifier, options) {
                    Ok(report) => BootstrapOutcome::Retrained { load_error, report },
                    Err(error) => BootstrapOutcome::Untrained { error },
                };
            }
        }
    }

    if options.force_train {
        tracing::info!("training intent model (forced)");
    } else {
        tracing::info!(path = %path.display(), "no saved intent model, training");
    }
    match train_and_persist(classifier, options) {
        Ok(report) => BootstrapOutcome::Trained(report),
        Err(error) => BootstrapOutcome::Untrained { error },
    }
}

fn train_and_persist(
    classifier: &IntentClassifier,
    options: &BootstrapOptions,
) -> Result<TrainingReport, ClassifierError> {
    let examples = options.training.load()?;
    let report = classifier.train(&examples, options.eval_fraction)?;
    if let Err(e) = classifier.persist(&options.artifact_path) {
        tracing::warn!(error = %e, "trained intent model could not be saved");
    }
    Ok(report)
}
