//! Intent classification by nearest neighbour over a TF-IDF corpus.
//!
//! Utterances are reduced to their intent-bearing lemmas (verbs, auxiliaries,
//! adpositions, proper nouns, coordinating conjunctions). Nouns and
//! determiners are left out: they name the target of a command, not the action.
//! The reduced token sequence is vectorized and compared by cosine similarity
//! against every fitted training example; the closest example's label wins if
//! its similarity clears the confidence threshold.
//!
//! # Lifecycle
//!
//! An [`IntentClassifier`] starts untrained. [`IntentClassifier::train`] or
//! [`IntentClassifier::load`] build a complete [`ClassifierState`] and publish
//! it in one step; [`IntentClassifier::predict`] reads whatever state is
//! published. Training and loading are serialized against each other, and
//! never block predictions longer than the pointer swap.

pub mod artifact;
pub mod bootstrap;
pub mod split;
pub mod tfidf;

use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::{ClassifierError, ClassifierResult};
use crate::linguistic::{Pos, SharedLinguistics};
use crate::training::TrainingExample;

pub use bootstrap::{BootstrapOptions, BootstrapOutcome, bootstrap};
pub use split::{DEFAULT_SPLIT_SEED, Split, train_eval_split};
pub use tfidf::{SparseVector, TfIdfVectorizer, VectorizerParams};

// ── Constants ──────────────────────────────────────────────────────────────

/// Default minimum cosine similarity for a confident prediction.
pub const DEFAULT_INTENT_THRESHOLD: f32 = 0.4;

/// Default fraction of examples held out for evaluation.
pub const DEFAULT_EVAL_FRACTION: f32 = 0.2;

/// Part-of-speech classes that carry the action of a command.
const INTENT_POS: [Pos; 5] = [Pos::Verb, Pos::Aux, Pos::Adp, Pos::Propn, Pos::Cconj];

// ── Corpus ─────────────────────────────────────────────────────────────────

/// Fitted rows and their labels; `labels[i]` belongs to `rows[i]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Corpus {
    rows: Vec<SparseVector>,
    labels: Vec<String>,
}

impl Corpus {
    fn new(rows: Vec<SparseVector>, labels: Vec<String>) -> Self {
        debug_assert_eq!(rows.len(), labels.len());
        Self { rows, labels }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Row with the highest cosine similarity to `query`.
    ///
    /// Stable scan with strict `>`: on ties the earliest row wins.
    pub fn nearest(&self, query: &SparseVector) -> Option<(usize, f32)> {
        let mut best: Option<(usize, f32)> = None;
        for (i, row) in self.rows.iter().enumerate() {
            let score = query.cosine(row);
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((i, score)),
            }
        }
        best
    }
}

// ── ClassifierState ────────────────────────────────────────────────────────

/// Everything needed to answer predictions; persisted as the model artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierState {
    vectorizer: TfIdfVectorizer,
    corpus: Corpus,
    threshold: f32,
}

impl ClassifierState {
    pub fn vectorizer(&self) -> &TfIdfVectorizer {
        &self.vectorizer
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Check invariants of a state read from disk.
    fn validate(&self) -> Result<(), String> {
        if self.corpus.rows.len() != self.corpus.labels.len() {
            return Err(format!(
                "{} rows but {} labels",
                self.corpus.rows.len(),
                self.corpus.labels.len()
            ));
        }
        if self.corpus.is_empty() {
            return Err("corpus is empty".into());
        }
        if !self.threshold.is_finite() {
            return Err(format!("invalid threshold {}", self.threshold));
        }
        if !self.vectorizer.is_consistent() {
            return Err("vectorizer vocabulary and idf table disagree".into());
        }
        Ok(())
    }
}

// ── Results ────────────────────────────────────────────────────────────────

/// Outcome of a prediction. `label` is `None` when the best match scored
/// below the threshold; that is a low-confidence answer, not an error.
#[derive(Debug, Clone, PartialEq)]
pub struct IntentPrediction {
    pub label: Option<String>,
    pub score: f32,
}

impl IntentPrediction {
    /// Whether the best score cleared the threshold.
    pub fn is_confident(&self) -> bool {
        self.label.is_some()
    }
}

/// A held-out example the fitted corpus got wrong.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationMiss {
    pub text: String,
    pub expected: String,
    pub predicted: String,
    pub score: f32,
}

/// Diagnostics from one training run.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub fit_count: usize,
    pub eval_count: usize,
    pub stratified: bool,
    /// Fraction of held-out examples whose nearest neighbour had the right
    /// label; `None` when nothing was held out.
    pub accuracy: Option<f32>,
    pub misses: Vec<EvaluationMiss>,
    pub vocabulary_len: usize,
}

/// Tunables applied when training.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierOptions {
    pub threshold: f32,
    pub params: VectorizerParams,
    pub split_seed: u64,
}

impl Default for ClassifierOptions {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_INTENT_THRESHOLD,
            params: VectorizerParams::default(),
            split_seed: DEFAULT_SPLIT_SEED,
        }
    }
}

// ── IntentClassifier ───────────────────────────────────────────────────────

/// Shared, read-mostly intent classifier.
pub struct IntentClassifier {
    linguistics: SharedLinguistics,
    options: ClassifierOptions,
    state: RwLock<Option<Arc<ClassifierState>>>,
    /// Serializes `train` and `load`.
    writer: Mutex<()>,
}

impl IntentClassifier {
    /// Create an untrained classifier.
    pub fn new(linguistics: SharedLinguistics, options: ClassifierOptions) -> Self {
        Self {
            linguistics,
            options,
            state: RwLock::new(None),
            writer: Mutex::new(()),
        }
    }

    pub fn is_trained(&self) -> bool {
        self.current().is_some()
    }

    /// The published state, if any.
    pub fn current(&self) -> Option<Arc<ClassifierState>> {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Threshold of the published state.
    pub fn threshold(&self) -> Option<f32> {
        self.current().map(|s| s.threshold)
    }

    fn publish(&self, state: ClassifierState) {
        let mut slot = self
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(Arc::new(state));
    }

    /// Lowercased lemmas of the intent-bearing tokens of `text`.
    pub fn intent_tokens(&self, text: &str, params: &VectorizerParams) -> ClassifierResult<Vec<String>> {
        let prepared = if params.lowercase {
            text.to_lowercase()
        } else {
            text.to_string()
        };
        let analysis = self.linguistics.analyze(&prepared)?;
        Ok(analysis
            .tokens
            .iter()
            .filter(|t| INTENT_POS.contains(&t.pos))
            .map(|t| t.lemma.to_lowercase())
            .collect())
    }

    /// Fit a new state on `examples` and publish it.
    ///
    /// `eval_fraction` of the examples (rounded up) is held out; those are
    /// scored against the fitted corpus for the report but never added to it.
    pub fn train(
        &self,
        examples: &[TrainingExample],
        eval_fraction: f32,
    ) -> ClassifierResult<TrainingReport> {
        if examples.is_empty() {
            return Err(ClassifierError::EmptyCorpus);
        }
        if !(0.0..1.0).contains(&eval_fraction) {
            return Err(ClassifierError::InvalidEvalFraction {
                value: eval_fraction,
            });
        }

        let _writer = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let params = self.options.params.clone();
        let labels: Vec<String> = examples.iter().map(|e| e.label.clone()).collect();
        let split = train_eval_split(&labels, eval_fraction, self.options.split_seed);

        tracing::info!(
            examples = examples.len(),
            fit = split.fit.len(),
            eval = split.eval.len(),
            stratified = split.stratified,
            "training intent classifier"
        );

        let fit_docs = split
            .fit
            .iter()
            .map(|&i| self.intent_tokens(&examples[i].text, &params))
            .collect::<ClassifierResult<Vec<_>>>()?;
        let fit_labels: Vec<String> = split.fit.iter().map(|&i| labels[i].clone()).collect();

        let (vectorizer, rows) = TfIdfVectorizer::fit_transform(params.clone(), &fit_docs);
        if vectorizer.vocabulary_len() == 0 {
            return Err(ClassifierError::EmptyVocabulary);
        }
        let corpus = Corpus::new(rows, fit_labels);

        let mut misses = Vec::new();
        let mut correct = 0usize;
        for &i in &split.eval {
            let example = &examples[i];
            let query = vectorizer.transform(&self.intent_tokens(&example.text, &params)?);
            let Some((best, score)) = corpus.nearest(&query) else {
                continue;
            };
            let predicted = &corpus.labels[best];
            if *predicted == example.label {
                correct += 1;
            } else {
                tracing::debug!(
                    text = %example.text,
                    predicted = %predicted,
                    expected = %example.label,
                    score,
                    "evaluation miss"
                );
                misses.push(EvaluationMiss {
                    text: example.text.clone(),
                    expected: example.label.clone(),
                    predicted: predicted.clone(),
                    score,
                });
            }
        }
        let accuracy = if split.eval.is_empty() {
            None
        } else {
            Some(correct as f32 / split.eval.len() as f32)
        };

        let report = TrainingReport {
            fit_count: split.fit.len(),
            eval_count: split.eval.len(),
            stratified: split.stratified,
            accuracy,
            misses,
            vocabulary_len: vectorizer.vocabulary_len(),
        };

        self.publish(ClassifierState {
            vectorizer,
            corpus,
            threshold: self.options.threshold,
        });

        match report.accuracy {
            Some(acc) => tracing::info!(
                fit = report.fit_count,
                eval = report.eval_count,
                accuracy = format_args!("{:.2}%", acc * 100.0),
                "intent classifier trained"
            ),
            None => tracing::info!(fit = report.fit_count, "intent classifier trained without held-out set"),
        }

        Ok(report)
    }

    /// Write the published state to `path`.
    pub fn persist(&self, path: &Path) -> ClassifierResult<()> {
        let state = self.current().ok_or(ClassifierError::NotTrained)?;
        artifact::write_artifact(path, &state)?;
        tracing::info!(path = %path.display(), "intent model saved");
        Ok(())
    }

    /// Replace the published state with the artifact at `path`.
    ///
    /// On failure the previously published state (if any) is left in place.
    pub fn load(&self, path: &Path) -> ClassifierResult<()> {
        let _writer = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let state = artifact::read_artifact(path)?;
        tracing::info!(
            path = %path.display(),
            rows = state.corpus.len(),
            threshold = state.threshold,
            "intent model loaded"
        );
        self.publish(state);
        Ok(())
    }

    /// Republish the current state with a new confidence threshold.
    pub fn set_threshold(&self, threshold: f32) -> ClassifierResult<()> {
        if !threshold.is_finite() {
            return Err(ClassifierError::InvalidThreshold { value: threshold });
        }
        let _writer = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let current = self.current().ok_or(ClassifierError::NotTrained)?;
        let state = ClassifierState {
            threshold,
            ..ClassifierState::clone(&current)
        };
        tracing::debug!(threshold, "intent threshold updated");
        self.publish(state);
        Ok(())
    }

    /// Classify `utterance`.
    pub fn predict(&self, utterance: &str) -> ClassifierResult<IntentPrediction> {
        let state = self.current().ok_or(ClassifierError::NotTrained)?;
        let tokens = self.intent_tokens(utterance, state.vectorizer.params())?;
        let query = state.vectorizer.transform(&tokens);

        let Some((best, score)) = state.corpus.nearest(&query) else {
            return Ok(IntentPrediction {
                label: None,
                score: 0.0,
            });
        };

        let label = if score < state.threshold {
            None
        } else {
            Some(state.corpus.labels[best].clone())
        };
        tracing::debug!(utterance, ?tokens, label = ?label, score, "intent prediction");
        Ok(IntentPrediction { label, score })
    }
}

impl std::fmt::Debug for IntentClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntentClassifier")
            .field("trained", &self.is_trained())
            .field("options", &self.options)
            .finish()
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linguistic::ScriptedAnalyzer;

    fn classifier() -> IntentClassifier {
        let analyzer = ScriptedAnalyzer::german_commands()
            .with_lexeme("licht", "Licht", Pos::Noun)
            .with_lexeme("lampe", "Lampe", Pos::Noun)
            .with_lexeme("heizung", "Heizung", Pos::Noun);
        IntentClassifier::new(Arc::new(analyzer), ClassifierOptions::default())
    }

    fn examples() -> Vec<TrainingExample> {
        [
            ("Licht an", "turn_on"),
            ("Mach das Licht an", "turn_on"),
            ("Schalte die Lampe ein", "turn_on"),
            ("Mach die Lampe aus", "turn_off"),
            ("Schalte das Licht aus", "turn_off"),
            ("Mach das Licht aus", "turn_off"),
        ]
        .iter()
        .map(|(t, l)| TrainingExample::new(t, l).unwrap())
        .collect()
    }

    #[test]
    fn predict_before_training_fails() {
        let c = classifier();
        assert!(!c.is_trained());
        assert!(matches!(
            c.predict("Licht an"),
            Err(ClassifierError::NotTrained)
        ));
    }

    #[test]
    fn exact_training_example_is_recalled() {
        let c = classifier();
        let report = c.train(&examples(), 0.0).unwrap();
        assert_eq!(report.fit_count, 6);
        assert_eq!(report.accuracy, None);

        let prediction = c.predict("Licht an").unwrap();
        assert_eq!(prediction.label.as_deref(), Some("turn_on"));
        assert!((prediction.score - 1.0).abs() < 1e-5);
    }

    #[test]
    fn nouns_do_not_influence_the_intent() {
        let c = classifier();
        c.train(&examples(), 0.0).unwrap();
        let with_lamp = c.predict("Mach die Lampe aus").unwrap();
        let with_heating = c.predict("Mach die Heizung aus").unwrap();
        assert_eq!(with_lamp, with_heating);
        assert_eq!(with_lamp.label.as_deref(), Some("turn_off"));
    }

    #[test]
    fn low_similarity_yields_no_label() {
        let c = classifier();
        c.train(&examples(), 0.0).unwrap();
        let prediction = c.predict("Wie spät ist es").unwrap();
        assert_eq!(prediction.label, None);
        assert!(prediction.score < DEFAULT_INTENT_THRESHOLD);
    }

    #[test]
    fn score_equal_to_threshold_is_accepted() {
        let c = classifier();
        c.train(&examples(), 0.0).unwrap();
        let score = c.predict("Mach das Licht").unwrap().score;
        assert!(score > 0.0 && score < 1.0, "score {score}");

        c.set_threshold(score).unwrap();
        let at = c.predict("Mach das Licht").unwrap();
        assert_eq!(at.score, score);
        assert!(at.is_confident());
        assert!(at.label.is_some());

        c.set_threshold(f32::from_bits(score.to_bits() + 1)).unwrap();
        let above = c.predict("Mach das Licht").unwrap();
        assert_eq!(above.label, None);
        assert!(!above.is_confident());
    }

    #[test]
    fn set_threshold_requires_a_model_and_a_finite_value() {
        let c = classifier();
        assert!(matches!(c.set_threshold(0.5), Err(ClassifierError::NotTrained)));
        c.train(&examples(), 0.0).unwrap();
        assert!(matches!(
            c.set_threshold(f32::NAN),
            Err(ClassifierError::InvalidThreshold { .. })
        ));
        assert_eq!(c.threshold(), Some(DEFAULT_INTENT_THRESHOLD));
    }

    #[test]
    fn empty_examples_are_rejected() {
        let c = classifier();
        assert!(matches!(c.train(&[], 0.2), Err(ClassifierError::EmptyCorpus)));
        assert!(!c.is_trained());
    }

    #[test]
    fn eval_fraction_out_of_range_is_rejected() {
        let c = classifier();
        assert!(matches!(
            c.train(&examples(), 1.0),
            Err(ClassifierError::InvalidEvalFraction { .. })
        ));
    }

    #[test]
    fn examples_without_intent_tokens_have_no_vocabulary() {
        let c = classifier();
        let nouns = vec![TrainingExample::new("Licht", "turn_on").unwrap()];
        assert!(matches!(
            c.train(&nouns, 0.0),
            Err(ClassifierError::EmptyVocabulary)
        ));
    }

    #[test]
    fn held_out_examples_are_not_searchable() {
        let c = classifier();
        let report = c.train(&examples(), 0.34).unwrap();
        assert_eq!(report.eval_count, 3);
        assert_eq!(report.fit_count, 3);
        assert!(report.stratified);
        assert_eq!(c.current().unwrap().corpus().len(), 3);
        assert!(report.accuracy.is_some());
    }

    #[test]
    fn nearest_prefers_first_row_on_ties() {
        let row = SparseVector::from_entries(vec![(0, 1.0)]);
        let corpus = Corpus::new(
            vec![row.clone(), row.clone()],
            vec!["first".into(), "second".into()],
        );
        assert_eq!(corpus.nearest(&row).map(|(i, _)| i), Some(0));
    }

    #[test]
    fn persisted_model_predicts_identically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models").join("intent_model.bin");

        let trained = classifier();
        trained.train(&examples(), 0.0).unwrap();
        trained.persist(&path).unwrap();

        let loaded = classifier();
        loaded.load(&path).unwrap();
        assert_eq!(trained.current(), loaded.current());
        assert_eq!(
            trained.predict("Schalte das Licht aus").unwrap(),
            loaded.predict("Schalte das Licht aus").unwrap()
        );
    }

    #[test]
    fn failed_load_keeps_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("intent_model.bin");
        std::fs::write(&path, b"corrupt").unwrap();

        let c = classifier();
        c.train(&examples(), 0.0).unwrap();
        assert!(matches!(
            c.load(&path),
            Err(ClassifierError::LoadFailure { .. })
        ));
        assert!(c.is_trained());
    }

    #[test]
    fn persist_without_state_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            classifier().persist(&dir.path().join("m.bin")),
            Err(ClassifierError::NotTrained)
        ));
    }
}
