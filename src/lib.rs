// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # sprachschalter
//!
//! Turns short German smart-home commands ("Schalte das Deckenlicht im
//! Wohnzimmer ein") into structured device actions (`light.turn_on` on
//! `light.deckenlicht`).
//!
//! ## Architecture
//!
//! - **Linguistics** (`linguistic`): the `LinguisticService` trait (parsing,
//!   similarity) with a remote HTTP client and a scripted in-memory analyzer
//! - **Intent classifier** (`classifier`): TF-IDF nearest neighbour over
//!   intent-bearing lemmas, with a persisted model artifact
//! - **Devices** (`device`): device records, registries, phrase extraction
//!   from the dependency parse, and fuzzy name resolution
//! - **Actions** (`action`): immutable action requests and actuators
//! - **Hub** (`hub`): Home Assistant REST registry and actuator
//! - **Pipeline** (`pipeline`): utterance → action request → actuator
//!
//! ## Library usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use sprachschalter::action::DryRunActuator;
//! use sprachschalter::classifier::{ClassifierOptions, IntentClassifier};
//! use sprachschalter::device::{DeviceDomain, DeviceRecord};
//! use sprachschalter::linguistic::{ScriptedAnalyzer, SharedLinguistics};
//! use sprachschalter::pipeline::Pipeline;
//! use sprachschalter::training::TrainingSource;
//!
//! let service: SharedLinguistics = Arc::new(ScriptedAnalyzer::german_commands());
//! let classifier = IntentClassifier::new(Arc::clone(&service), ClassifierOptions::default());
//! let examples = TrainingSource::new("training_data.csv").load().unwrap();
//! classifier.train(&examples, 0.2).unwrap();
//!
//! let pipeline = Pipeline::with_service(service, Arc::new(classifier), 0.5, Arc::new(DryRunActuator));
//! let devices = vec![DeviceRecord::new("Standlampe", DeviceDomain::Light)];
//! let outcome = pipeline.process("Mach die Standlampe aus", &devices).unwrap();
//! ```

pub mod action;
pub mod classifier;
pub mod config;
pub mod device;
pub mod error;
pub mod hub;
pub mod linguistic;
pub mod paths;
pub mod pipeline;
pub mod training;
