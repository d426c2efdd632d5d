//! Rich diagnostic error types for the sprachschalter pipeline.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text so users know what went wrong and how
//! to fix it. A "no match" is not an error: it is a normal pipeline outcome
//! (see [`crate::pipeline::NoMatch`]).

use miette::Diagnostic;
use thiserror::Error;

use crate::config::ConfigError;
use crate::paths::PathError;

/// Top-level error type.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum SchalterError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Linguistic(#[from] LinguisticError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Classifier(#[from] ClassifierError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Actuator(#[from] ActuatorError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Path(#[from] PathError),
}

// ---------------------------------------------------------------------------
// Linguistic service errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum LinguisticError {
    #[error("linguistic service is not available at {url}")]
    #[diagnostic(
        code(schalter::linguistic::unavailable),
        help(
            "Start the analysis server or point `linguistics.base_url` in the config \
             at a running instance. Use `--offline` to run with the built-in lexicon."
        )
    )]
    Unavailable { url: String },

    #[error("linguistic service request failed: {message}")]
    #[diagnostic(
        code(schalter::linguistic::request_failed),
        help("Check that the analysis server is running and the configured model is installed.")
    )]
    RequestFailed { message: String },

    #[error("failed to parse linguistic service response: {message}")]
    #[diagnostic(
        code(schalter::linguistic::parse_error),
        help("The server returned an unexpected response format. Check its version.")
    )]
    ParseError { message: String },

    #[error("malformed analysis: {message}")]
    #[diagnostic(
        code(schalter::linguistic::malformed),
        help("Every token's head index must point at a token of the same analysis.")
    )]
    MalformedAnalysis { message: String },
}

pub type LinguisticResult<T> = std::result::Result<T, LinguisticError>;

// ---------------------------------------------------------------------------
// Intent classifier errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ClassifierError {
    #[error("training data not found: {path}")]
    #[diagnostic(
        code(schalter::classifier::source_not_found),
        help(
            "Provide a CSV file with a header row and `text,label` columns, \
             or set `classifier.training_path` in the config."
        )
    )]
    SourceNotFound { path: String },

    #[error("failed to read training data: {path}")]
    #[diagnostic(
        code(schalter::classifier::source_read),
        help("Check that the file is readable and UTF-8 encoded.")
    )]
    SourceRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("training corpus is empty")]
    #[diagnostic(
        code(schalter::classifier::empty_corpus),
        help("The training source has no rows with both a non-empty text and label.")
    )]
    EmptyCorpus,

    #[error("training corpus has no intent-bearing tokens")]
    #[diagnostic(
        code(schalter::classifier::empty_vocabulary),
        help(
            "No example contained a verb, auxiliary, adposition, proper noun, or \
             conjunction. Check the training texts and the linguistic service's tagging."
        )
    )]
    EmptyVocabulary,

    #[error("evaluation fraction {value} is outside [0, 1)")]
    #[diagnostic(
        code(schalter::classifier::eval_fraction),
        help("Use a fraction such as 0.2 to hold out 20% of the examples, or 0 to fit on all of them.")
    )]
    InvalidEvalFraction { value: f32 },

    #[error("confidence threshold {value} is not a finite number")]
    #[diagnostic(
        code(schalter::classifier::threshold),
        help("Set `classifier.threshold` to a value such as 0.4.")
    )]
    InvalidThreshold { value: f32 },

    #[error("intent classifier is not trained")]
    #[diagnostic(
        code(schalter::classifier::not_trained),
        help("Run `schalter train` or load a model artifact before predicting.")
    )]
    NotTrained,

    #[error("failed to load model artifact {path}: {message}")]
    #[diagnostic(
        code(schalter::classifier::load_failure),
        help(
            "The artifact is missing, corrupt, or from an incompatible version. \
             Retrain with `schalter train` to replace it."
        )
    )]
    LoadFailure { path: String, message: String },

    #[error("failed to write model artifact {path}")]
    #[diagnostic(
        code(schalter::classifier::persist),
        help("Ensure the model directory is writable and the disk is not full.")
    )]
    Persist {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {message}")]
    #[diagnostic(
        code(schalter::classifier::serde),
        help("The classifier state could not be encoded. This is a bug; please report it.")
    )]
    Serialization { message: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Linguistic(#[from] LinguisticError),
}

pub type ClassifierResult<T> = std::result::Result<T, ClassifierError>;

// ---------------------------------------------------------------------------
// Device registry errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum RegistryError {
    #[error("failed to read device snapshot: {path}")]
    #[diagnostic(
        code(schalter::registry::read),
        help("Check that the device list file exists and is readable.")
    )]
    SnapshotRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse device snapshot {path}: {message}")]
    #[diagnostic(
        code(schalter::registry::parse),
        help(
            "The snapshot must be a JSON array of objects with at least `name` and \
             `domain` (or `type`) fields."
        )
    )]
    SnapshotParse { path: String, message: String },

    #[error("failed to write device snapshot: {path}")]
    #[diagnostic(
        code(schalter::registry::write),
        help("Ensure the snapshot directory is writable.")
    )]
    SnapshotWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to fetch devices from hub: {message}")]
    #[diagnostic(
        code(schalter::registry::fetch),
        help("Check the hub URL, that it is reachable, and that the access token is valid.")
    )]
    Fetch { message: String },
}

pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

// ---------------------------------------------------------------------------
// Actuator errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ActuatorError {
    #[error("no device named \"{name}\" in the hub's device list")]
    #[diagnostic(
        code(schalter::actuator::unresolved_target),
        help("The device may have been renamed or removed. Refresh the device list.")
    )]
    UnresolvedTarget { name: String },

    #[error("action {domain}.{action} was rejected: {message}")]
    #[diagnostic(
        code(schalter::actuator::rejected),
        help("The hub refused the call. Check that the device supports this action.")
    )]
    Rejected {
        domain: String,
        action: String,
        message: String,
    },

    #[error("actuator request failed: {message}")]
    #[diagnostic(
        code(schalter::actuator::request_failed),
        help("Check that the hub is reachable and the access token is valid.")
    )]
    RequestFailed { message: String },
}

pub type ActuatorResult<T> = std::result::Result<T, ActuatorError>;

// ---------------------------------------------------------------------------
// Pipeline errors
// ---------------------------------------------------------------------------

/// Failures of a pipeline run that are not a plain "no match".
#[derive(Debug, Error, Diagnostic)]
pub enum PipelineError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Classifier(#[from] ClassifierError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Actuator(#[from] ActuatorError),
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// Convenience alias for top-level operations.
pub type SchalterResult<T> = std::result::Result<T, SchalterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_codes_survive_wrapping() {
        let err: SchalterError = PipelineError::from(ClassifierError::NotTrained).into();
        let code = err.code().map(|c| c.to_string());
        assert_eq!(code.as_deref(), Some("schalter::classifier::not_trained"));
    }

    #[test]
    fn linguistic_errors_nest_in_classifier_errors() {
        let err: ClassifierError = LinguisticError::Unavailable {
            url: "http://localhost:8010".into(),
        }
        .into();
        assert!(err.to_string().contains("http://localhost:8010"));
        assert_eq!(
            err.code().map(|c| c.to_string()).as_deref(),
            Some("schalter::linguistic::unavailable")
        );
    }

    #[test]
    fn subsystem_errors_propagate_into_top_level() {
        fn fetch() -> SchalterResult<()> {
            Err(RegistryError::Fetch {
                message: "connection refused".into(),
            })?
        }
        fn classify() -> SchalterResult<()> {
            Err(ClassifierError::InvalidThreshold { value: f32::NAN })?
        }

        assert!(matches!(fetch(), Err(SchalterError::Registry(_))));
        let err = classify().unwrap_err();
        assert_eq!(
            err.code().map(|c| c.to_string()).as_deref(),
            Some("schalter::classifier::threshold")
        );
    }
}
