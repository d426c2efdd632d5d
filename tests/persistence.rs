//! Persistence and recovery tests for the intent model.
//!
//! These tests verify that a trained model survives a process restart
//! (persist + load cycle) and that the startup policy recovers from a
//! damaged artifact by retraining.

use std::path::Path;
use std::sync::Arc;

use sprachschalter::classifier::{
    BootstrapOptions, BootstrapOutcome, ClassifierOptions, IntentClassifier, bootstrap,
};
use sprachschalter::config::AssistantConfig;
use sprachschalter::error::ClassifierError;
use sprachschalter::linguistic::ScriptedAnalyzer;
use sprachschalter::paths::SchalterPaths;
use sprachschalter::training::TrainingSource;

const TRAINING_CSV: &str = "\
text;label
Schalte das Licht an;turn_on
Mach das Licht an;turn_on
Schalte die Lampe ein;turn_on
Schalte das Licht aus;turn_off
Mach das Licht aus;turn_off
Mach die Lampe aus;turn_off
\"Dreh das Licht auf; bitte\";turn_on
Dreh das Licht ab;turn_off
";

fn classifier() -> IntentClassifier {
    IntentClassifier::new(
        Arc::new(ScriptedAnalyzer::german_commands()),
        ClassifierOptions::default(),
    )
}

fn write_training(dir: &Path) -> TrainingSource {
    let path = dir.join("training").join("training_data.csv");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, TRAINING_CSV).unwrap();
    TrainingSource::new(path).with_delimiter(';')
}

#[test]
fn trained_model_survives_restart() {
    let dir = tempfile::TempDir::new().unwrap();
    let model = dir.path().join("models").join("intent_model.bin");
    let source = write_training(dir.path());

    // First session: train and persist.
    let expected = {
        let c = classifier();
        let examples = source.load().unwrap();
        assert_eq!(examples.len(), 8);
        let report = c.train(&examples, 0.25).unwrap();
        assert_eq!(report.eval_count, 2);
        assert!(report.stratified);
        c.persist(&model).unwrap();
        c.predict("Mach das Licht aus").unwrap()
    };

    // Second session: load and compare.
    let c = classifier();
    c.load(&model).unwrap();
    assert_eq!(c.predict("Mach das Licht aus").unwrap(), expected);
    assert_eq!(c.threshold(), Some(0.4));
}

#[test]
fn bootstrap_trains_once_then_loads() {
    let dir = tempfile::TempDir::new().unwrap();
    let options = BootstrapOptions::new(
        dir.path().join("models").join("intent_model.bin"),
        write_training(dir.path()),
    );

    assert!(matches!(
        bootstrap(&classifier(), &options),
        BootstrapOutcome::Trained(_)
    ));
    assert!(matches!(
        bootstrap(&classifier(), &options),
        BootstrapOutcome::Loaded
    ));
}

#[test]
fn truncated_artifact_is_replaced_by_retraining() {
    let dir = tempfile::TempDir::new().unwrap();
    let options = BootstrapOptions::new(
        dir.path().join("models").join("intent_model.bin"),
        write_training(dir.path()),
    );
    bootstrap(&classifier(), &options);

    // Cut the artifact in half.
    let bytes = std::fs::read(&options.artifact_path).unwrap();
    std::fs::write(&options.artifact_path, &bytes[..bytes.len() / 2]).unwrap();

    let c = classifier();
    let outcome = bootstrap(&c, &options);
    assert!(
        matches!(
            outcome,
            BootstrapOutcome::Retrained {
                load_error: ClassifierError::LoadFailure { .. },
                ..
            }
        ),
        "unexpected outcome: {outcome:?}"
    );
    assert!(c.is_trained());
    assert!(c.predict("Schalte das Licht an").is_ok());

    // The replacement artifact is complete again.
    let reloaded = classifier();
    reloaded.load(&options.artifact_path).unwrap();
}

#[test]
fn retrain_failure_leaves_classifier_untrained() {
    let dir = tempfile::TempDir::new().unwrap();
    let model = dir.path().join("intent_model.bin");
    std::fs::write(&model, b"not a model").unwrap();
    let options = BootstrapOptions::new(&model, TrainingSource::new(dir.path().join("missing.csv")));

    let c = classifier();
    let outcome = bootstrap(&c, &options);
    assert!(!outcome.is_ready());
    assert!(!c.is_trained());
}

#[test]
fn config_paths_drive_bootstrap() {
    let dir = tempfile::TempDir::new().unwrap();
    let paths = SchalterPaths::with_roots(dir.path().join("config"), dir.path().join("data"));
    write_training(&paths.data_dir);

    let mut config = AssistantConfig::default();
    config.classifier.delimiter = ';';
    config.save(&paths.config_file()).unwrap();
    let config = AssistantConfig::load(&paths.config_file()).unwrap();

    let c = IntentClassifier::new(
        Arc::new(ScriptedAnalyzer::german_commands()),
        config.classifier_options(),
    );
    let outcome = bootstrap(&c, &config.bootstrap_options(&paths, false));
    assert!(outcome.is_ready());
    assert!(paths.model_file().exists());
}
