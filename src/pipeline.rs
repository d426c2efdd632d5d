//! From utterance to dispatched action.
//!
//! ```text
//! utterance ─┬─ IntentClassifier ──────────────────────── action label ─┐
//!            └─ DeviceNameExtractor ── DeviceResolver ── device ────────┴─ ActionRequest ── Actuator
//! ```
//!
//! The classifier and the extractor look at the same utterance
//! independently. Any stage coming up empty ends the run with a [`NoMatch`]
//! naming that stage; the actuator is only called with a complete request.

use std::sync::Arc;

use crate::action::{ActionRequest, ActuationReceipt, Actuator};
use crate::classifier::{IntentClassifier, IntentPrediction};
use crate::device::{DeviceNameExtractor, DeviceRecord, DeviceResolver, MatchScores, MatchSignal};
use crate::error::{LinguisticResult, PipelineResult};
use crate::linguistic::SharedLinguistics;

/// Pipeline stage that produced a no-match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Classifier,
    Extractor,
    Resolver,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Classifier => f.write_str("intent classifier"),
            Self::Extractor => f.write_str("device extractor"),
            Self::Resolver => f.write_str("device resolver"),
        }
    }
}

/// Why a stage produced nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum NoMatchReason {
    /// Best intent similarity was below the classifier threshold.
    LowConfidence { score: f32 },
    /// The utterance has no object, subject, or predicate phrase.
    NoPhrase,
    /// The linguistic service failed while extracting the device phrase.
    AnalysisFailed { message: String },
    /// The device registry is empty.
    EmptyRegistry,
    /// No device scored at or above the resolver threshold.
    NoDevice {
        phrase: String,
        best_semantic: f32,
        best_edit: f32,
    },
}

/// A normal "could not understand" result.
#[derive(Debug, Clone, PartialEq)]
pub struct NoMatch {
    pub stage: Stage,
    pub reason: NoMatchReason,
}

impl NoMatch {
    fn new(stage: Stage, reason: NoMatchReason) -> Self {
        Self { stage, reason }
    }
}

impl std::fmt::Display for NoMatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: ", self.stage)?;
        match &self.reason {
            NoMatchReason::LowConfidence { score } => {
                write!(f, "intent unclear (best similarity {score:.2})")
            }
            NoMatchReason::NoPhrase => f.write_str("no device mentioned"),
            NoMatchReason::AnalysisFailed { message } => write!(f, "analysis failed: {message}"),
            NoMatchReason::EmptyRegistry => f.write_str("no devices known"),
            NoMatchReason::NoDevice {
                phrase,
                best_semantic,
                best_edit,
            } => write!(
                f,
                "no device matches \"{phrase}\" (semantic {best_semantic:.2}, edit {best_edit:.2})"
            ),
        }
    }
}

/// The device the resolver picked, detached from the registry snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedDevice {
    pub device: DeviceRecord,
    pub signal: MatchSignal,
    pub score: f32,
}

/// Everything the pipeline learned about an utterance, without side effects.
#[derive(Debug, Clone, PartialEq)]
pub struct Interpretation {
    pub prediction: IntentPrediction,
    /// Extracted device phrase; empty if none was found.
    pub phrase: String,
    pub scores: MatchScores,
    pub resolved: Option<ResolvedDevice>,
    /// The request to dispatch, or the first stage that came up empty.
    pub decision: Result<ActionRequest, NoMatch>,
}

/// Result of a full pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    NoMatch(NoMatch),
    Dispatched {
        request: ActionRequest,
        receipt: ActuationReceipt,
    },
}

/// The command-understanding pipeline.
pub struct Pipeline {
    classifier: Arc<IntentClassifier>,
    extractor: DeviceNameExtractor,
    resolver: DeviceResolver,
    actuator: Arc<dyn Actuator>,
}

impl Pipeline {
    pub fn new(
        classifier: Arc<IntentClassifier>,
        extractor: DeviceNameExtractor,
        resolver: DeviceResolver,
        actuator: Arc<dyn Actuator>,
    ) -> Self {
        Self {
            classifier,
            extractor,
            resolver,
            actuator,
        }
    }

    /// Wire up extractor and resolver over one shared linguistic service.
    pub fn with_service(
        linguistics: SharedLinguistics,
        classifier: Arc<IntentClassifier>,
        resolver_threshold: f32,
        actuator: Arc<dyn Actuator>,
    ) -> Self {
        Self::new(
            classifier,
            DeviceNameExtractor::new(Arc::clone(&linguistics)),
            DeviceResolver::new(linguistics).with_threshold(resolver_threshold),
            actuator,
        )
    }

    pub fn classifier(&self) -> &IntentClassifier {
        &self.classifier
    }

    /// Run every stage on `utterance` and decide, without dispatching.
    pub fn interpret(&self, utterance: &str, devices: &[DeviceRecord]) -> PipelineResult<Interpretation> {
        let prediction = self.classifier.predict(utterance)?;

        let extraction = self.extractor.try_extract(utterance);
        let phrase = extraction.as_ref().map(String::clone).unwrap_or_default();

        let scores = self.resolver.score(&phrase, devices);
        let resolved = self.resolver.select(scores, devices).map(|r| ResolvedDevice {
            device: r.device.clone(),
            signal: r.signal,
            score: r.score,
        });

        let decision = decide(&prediction, &extraction, &phrase, devices, &scores, resolved.as_ref());
        match &decision {
            Ok(request) => tracing::debug!(utterance, %request, "utterance interpreted"),
            Err(no_match) => tracing::debug!(utterance, %no_match, "no match"),
        }

        Ok(Interpretation {
            prediction,
            phrase,
            scores,
            resolved,
            decision,
        })
    }

    /// Interpret `utterance` and hand the resulting request to the actuator.
    pub fn process(&self, utterance: &str, devices: &[DeviceRecord]) -> PipelineResult<PipelineOutcome> {
        let interpretation = self.interpret(utterance, devices)?;
        let request = match interpretation.decision {
            Ok(request) => request,
            Err(no_match) => {
                tracing::info!(utterance, %no_match, "command not understood");
                return Ok(PipelineOutcome::NoMatch(no_match));
            }
        };

        let receipt = self.actuator.execute(&request)?;
        tracing::info!(utterance, %request, "command dispatched");
        Ok(PipelineOutcome::Dispatched { request, receipt })
    }
}

fn decide(
    prediction: &IntentPrediction,
    extraction: &LinguisticResult<String>,
    phrase: &str,
    devices: &[DeviceRecord],
    scores: &MatchScores,
    resolved: Option<&ResolvedDevice>,
) -> Result<ActionRequest, NoMatch> {
    let Some(action) = &prediction.label else {
        return Err(NoMatch::new(
            Stage::Classifier,
            NoMatchReason::LowConfidence {
                score: prediction.score,
            },
        ));
    };
    if let Err(e) = extraction {
        return Err(NoMatch::new(
            Stage::Extractor,
            NoMatchReason::AnalysisFailed {
                message: e.to_string(),
            },
        ));
    }
    if phrase.is_empty() {
        return Err(NoMatch::new(Stage::Extractor, NoMatchReason::NoPhrase));
    }
    if devices.is_empty() {
        return Err(NoMatch::new(Stage::Resolver, NoMatchReason::EmptyRegistry));
    }
    match resolved {
        Some(r) => Ok(ActionRequest::for_device(&r.device, action.as_str())),
        None => Err(NoMatch::new(
            Stage::Resolver,
            NoMatchReason::NoDevice {
                phrase: phrase.to_string(),
                best_semantic: scores.best_semantic,
                best_edit: scores.best_edit,
            },
        )),
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("classifier", &self.classifier)
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionTarget, RecordingActuator};
    use crate::classifier::ClassifierOptions;
    use crate::device::DeviceDomain;
    use crate::linguistic::{Pos, ScriptedAnalyzer};
    use crate::training::TrainingExample;

    fn analyzer() -> ScriptedAnalyzer {
        ScriptedAnalyzer::german_commands().with_parse(
            "Mach die Standlampe aus",
            &[
                ("Mach", "machen", Pos::Verb, "ROOT", 0),
                ("die", "der", Pos::Det, "nk", 2),
                ("Standlampe", "Standlampe", Pos::Noun, "oa", 0),
                ("aus", "aus", Pos::Adp, "svp", 0),
            ],
        )
    }

    fn pipeline(analyzer: ScriptedAnalyzer, actuator: Arc<RecordingActuator>) -> Pipeline {
        let service: SharedLinguistics = Arc::new(analyzer);
        let classifier = IntentClassifier::new(Arc::clone(&service), ClassifierOptions::default());
        let examples: Vec<_> = [
            ("Mach das Licht an", "turn_on"),
            ("Mach das Licht aus", "turn_off"),
        ]
        .iter()
        .filter_map(|(t, l)| TrainingExample::new(t, l))
        .collect();
        classifier.train(&examples, 0.0).unwrap();
        Pipeline::with_service(service, Arc::new(classifier), 0.5, actuator)
    }

    fn devices() -> Vec<DeviceRecord> {
        vec![
            DeviceRecord::new("Deckenlampe", DeviceDomain::Light).with_entity_id("light.deckenlampe"),
            DeviceRecord::new("Standlampe", DeviceDomain::Light).with_entity_id("light.standlampe"),
        ]
    }

    #[test]
    fn command_is_dispatched() {
        let actuator = Arc::new(RecordingActuator::new());
        let p = pipeline(analyzer(), Arc::clone(&actuator));
        let outcome = p.process("Mach die Standlampe aus", &devices()).unwrap();
        let PipelineOutcome::Dispatched { request, .. } = outcome else {
            panic!("expected dispatch, got {outcome:?}");
        };
        assert_eq!(request.action(), "turn_off");
        assert_eq!(request.target(), &ActionTarget::EntityId("light.standlampe".into()));
        assert_eq!(actuator.requests(), vec![request]);
    }

    #[test]
    fn missing_phrase_stops_at_extractor() {
        let actuator = Arc::new(RecordingActuator::new());
        let p = pipeline(analyzer(), Arc::clone(&actuator));
        let outcome = p.process("Mach es aus", &devices()).unwrap();
        assert_eq!(
            outcome,
            PipelineOutcome::NoMatch(NoMatch::new(Stage::Extractor, NoMatchReason::NoPhrase))
        );
        assert!(actuator.requests().is_empty());
    }

    #[test]
    fn empty_registry_stops_at_resolver() {
        let actuator = Arc::new(RecordingActuator::new());
        let p = pipeline(analyzer(), Arc::clone(&actuator));
        let interpretation = p.interpret("Mach die Standlampe aus", &[]).unwrap();
        assert_eq!(interpretation.phrase, "Standlampe");
        assert_eq!(
            interpretation.decision,
            Err(NoMatch::new(Stage::Resolver, NoMatchReason::EmptyRegistry))
        );
    }

    #[test]
    fn interpret_does_not_dispatch() {
        let actuator = Arc::new(RecordingActuator::new());
        let p = pipeline(analyzer(), Arc::clone(&actuator));
        let interpretation = p.interpret("Mach die Standlampe aus", &devices()).unwrap();
        assert!(interpretation.decision.is_ok());
        assert_eq!(
            interpretation.resolved.map(|r| r.device.name),
            Some("Standlampe".to_string())
        );
        assert!(actuator.requests().is_empty());
    }

    #[test]
    fn no_match_messages_name_the_stage() {
        let no_match = NoMatch::new(
            Stage::Resolver,
            NoMatchReason::NoDevice {
                phrase: "Kühlschrank".into(),
                best_semantic: 0.1,
                best_edit: 0.25,
            },
        );
        assert_eq!(
            no_match.to_string(),
            "device resolver: no device matches \"Kühlschrank\" (semantic 0.10, edit 0.25)"
        );
    }
}
