//! Benchmarks for intent prediction and device resolution.

use std::sync::Arc;

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use sprachschalter::classifier::{ClassifierOptions, IntentClassifier};
use sprachschalter::device::{DeviceDomain, DeviceRecord, DeviceResolver};
use sprachschalter::device::resolve::edit_distance;
use sprachschalter::linguistic::{ScriptedAnalyzer, SharedLinguistics};
use sprachschalter::training::TrainingExample;

const VERBS: [&str; 4] = ["Schalte", "Mach", "Dreh", "Stell"];
const PARTICLES: [(&str, &str); 3] = [("an", "turn_on"), ("aus", "turn_off"), ("ein", "turn_on")];
const ROOMS: [&str; 5] = ["Wohnzimmer", "Küche", "Flur", "Bad", "Schlafzimmer"];

fn service() -> SharedLinguistics {
    Arc::new(ScriptedAnalyzer::german_commands())
}

fn examples() -> Vec<TrainingExample> {
    let mut examples = Vec::new();
    for verb in VERBS {
        for (particle, label) in PARTICLES {
            for room in ROOMS {
                let text = format!("{verb} das Licht im {room} {particle}");
                examples.extend(TrainingExample::new(&text, label));
            }
        }
    }
    examples
}

fn devices() -> Vec<DeviceRecord> {
    let mut devices = Vec::new();
    for room in ROOMS {
        for kind in ["Deckenlampe", "Stehlampe", "Steckdose", "Leselicht"] {
            devices.push(DeviceRecord::new(format!("{room} {kind}"), DeviceDomain::Light));
        }
    }
    devices
}

fn bench_predict(c: &mut Criterion) {
    let classifier = IntentClassifier::new(service(), ClassifierOptions::default());
    classifier.train(&examples(), 0.0).unwrap();

    c.bench_function("predict_60_examples", |bench| {
        bench.iter(|| black_box(classifier.predict("Mach bitte das Licht in der Küche aus").unwrap()))
    });
}

fn bench_train(c: &mut Criterion) {
    let examples = examples();
    c.bench_function("train_60_examples", |bench| {
        bench.iter(|| {
            let classifier = IntentClassifier::new(service(), ClassifierOptions::default());
            black_box(classifier.train(&examples, 0.2).unwrap())
        })
    });
}

fn bench_resolve(c: &mut Criterion) {
    let resolver = DeviceResolver::new(service());
    let devices = devices();

    c.bench_function("resolve_20_devices", |bench| {
        bench.iter(|| black_box(resolver.resolve("Küche Stehlampe", &devices).map(|r| r.score)))
    });
}

fn bench_edit_distance(c: &mut Criterion) {
    c.bench_function("edit_distance_compound", |bench| {
        bench.iter(|| black_box(edit_distance("wohnzimmer deckenleuchte", "wohnzimmer deckenlampe")))
    });
}

criterion_group!(benches, bench_predict, bench_train, bench_resolve, bench_edit_distance);
criterion_main!(benches);
