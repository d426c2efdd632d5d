//! Locate the device phrase in a command by walking its dependency parse.
//!
//! The device is named by the grammatical object of the command ("Schalte
//! *das Deckenlicht* im Wohnzimmer ein"). Every token attached through an
//! object, subject, or predicate role yields a candidate phrase built from its
//! subtree with articles, pronouns, punctuation, prepositions, and anything
//! governed by a preposition removed. That last rule strips locatives such as
//! "im Wohnzimmer". Objects outrank subjects and predicates.

use crate::error::LinguisticResult;
use crate::linguistic::{Analysis, DepRole, Pos, SharedLinguistics};

/// Parts of speech never part of a device name.
const EXCLUDED_POS: [Pos; 4] = [Pos::Det, Pos::Pron, Pos::Punct, Pos::Adp];

#[derive(Debug, Clone, PartialEq, Eq)]
struct Candidate {
    phrase: String,
    priority: u8,
}

/// Extracts the device phrase of an utterance.
#[derive(Clone)]
pub struct DeviceNameExtractor {
    linguistics: SharedLinguistics,
}

impl DeviceNameExtractor {
    pub fn new(linguistics: SharedLinguistics) -> Self {
        Self { linguistics }
    }

    /// The device phrase of `utterance`, or an empty string if there is none.
    ///
    /// Analysis failures are logged and reported as "no phrase".
    pub fn extract(&self, utterance: &str) -> String {
        match self.try_extract(utterance) {
            Ok(phrase) => phrase,
            Err(e) => {
                tracing::warn!(utterance, error = %e, "device phrase extraction failed");
                String::new()
            }
        }
    }

    /// Like [`extract`](Self::extract), but surfaces analysis failures.
    pub fn try_extract(&self, utterance: &str) -> LinguisticResult<String> {
        let analysis = self.linguistics.analyze(utterance)?;
        let phrase = phrase_from_analysis(&analysis);
        tracing::debug!(utterance, phrase = %phrase, "device phrase extracted");
        Ok(phrase)
    }
}

impl std::fmt::Debug for DeviceNameExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceNameExtractor").finish_non_exhaustive()
    }
}

/// Pick the best candidate phrase from a parsed utterance.
pub fn phrase_from_analysis(analysis: &Analysis) -> String {
    let mut candidates: Vec<Candidate> = analysis
        .tokens
        .iter()
        .enumerate()
        .filter(|(_, token)| token.dep.is_object_role())
        .filter_map(|(index, token)| {
            let phrase = candidate_phrase(analysis, index);
            if phrase.is_empty() {
                return None;
            }
            let priority = match token.dep {
                DepRole::DirectObject | DepRole::Object => 0,
                _ => 1,
            };
            Some(Candidate { phrase, priority })
        })
        .collect();

    // Stable: among equal priorities the earliest candidate stays first.
    candidates.sort_by_key(|c| c.priority);
    candidates
        .into_iter()
        .next()
        .map(|c| c.phrase)
        .unwrap_or_default()
}

fn candidate_phrase(analysis: &Analysis, root: usize) -> String {
    analysis
        .subtree(root)
        .into_iter()
        .filter(|&i| !EXCLUDED_POS.contains(&analysis.tokens[i].pos))
        .filter(|&i| !matches!(analysis.head_of(i), Some(head) if head.pos == Pos::Adp))
        .map(|i| analysis.tokens[i].text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}
