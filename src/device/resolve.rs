//! Fuzzy matching of an extracted phrase against the device list.
//!
//! Two signals are computed for every device: semantic similarity from the
//! linguistic service and a normalized edit similarity. Each keeps its own
//! running maximum. A semantic match at or above the threshold always wins;
//! the edit signal is consulted only when the semantic one falls short.

use unicode_normalization::UnicodeNormalization;

use super::DeviceRecord;
use crate::linguistic::SharedLinguistics;

/// Default minimum similarity for accepting a device.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.5;

/// Canonical form used for comparing names: NFC, lowercase, `-` and `_`
/// replaced by spaces, surrounding whitespace trimmed.
pub fn normalize(name: &str) -> String {
    name.nfc()
        .collect::<String>()
        .to_lowercase()
        .replace(['-', '_'], " ")
        .trim()
        .to_string()
}

/// Levenshtein distance counted in characters.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// `1 - distance / longer length`; 1.0 for two empty strings.
pub fn edit_similarity(a: &str, b: &str) -> f32 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - edit_distance(a, b) as f32 / max_len as f32
}

/// Which signal decided a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchSignal {
    Semantic,
    Edit,
}

impl std::fmt::Display for MatchSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Semantic => f.write_str("semantic"),
            Self::Edit => f.write_str("edit"),
        }
    }
}

/// Running maxima over a device list. Indices point into the scored slice.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MatchScores {
    pub best_semantic: f32,
    pub semantic_index: Option<usize>,
    pub best_edit: f32,
    pub edit_index: Option<usize>,
}

/// An accepted match.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution<'a> {
    pub device: &'a DeviceRecord,
    pub signal: MatchSignal,
    pub score: f32,
    pub scores: MatchScores,
}

/// Matches phrases to devices.
#[derive(Clone)]
pub struct DeviceResolver {
    linguistics: SharedLinguistics,
    threshold: f32,
}

impl DeviceResolver {
    pub fn new(linguistics: SharedLinguistics) -> Self {
        Self {
            linguistics,
            threshold: DEFAULT_MATCH_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Score every device against `phrase` without deciding.
    ///
    /// Both maxima start at 0.0 and only move on a strictly greater score, so
    /// the earliest device wins ties and a device scoring 0.0 is never chosen.
    pub fn score(&self, phrase: &str, devices: &[DeviceRecord]) -> MatchScores {
        let target = normalize(phrase);
        let mut scores = MatchScores::default();
        if target.is_empty() {
            return scores;
        }

        for (index, device) in devices.iter().enumerate() {
            let candidate = normalize(&device.name);
            if candidate.is_empty() {
                continue;
            }

            let semantic = self.semantic_similarity(&target, &candidate);
            if semantic > scores.best_semantic {
                scores.best_semantic = semantic;
                scores.semantic_index = Some(index);
            }

            let edit = edit_similarity(&candidate, &target);
            if edit > scores.best_edit {
                scores.best_edit = edit;
                scores.edit_index = Some(index);
            }
        }
        scores
    }

    /// The best device for `phrase`, or `None` if nothing is close enough.
    pub fn resolve<'a>(&self, phrase: &str, devices: &'a [DeviceRecord]) -> Option<Resolution<'a>> {
        if devices.is_empty() || normalize(phrase).is_empty() {
            tracing::debug!(phrase, devices = devices.len(), "nothing to resolve");
            return None;
        }
        self.select(self.score(phrase, devices), devices)
    }

    /// Apply the threshold to scores computed by [`score`](Self::score) over
    /// the same `devices`. The semantic signal is checked first.
    pub fn select<'a>(&self, scores: MatchScores, devices: &'a [DeviceRecord]) -> Option<Resolution<'a>> {
        let decision = if scores.best_semantic >= self.threshold {
            scores
                .semantic_index
                .map(|i| (i, MatchSignal::Semantic, scores.best_semantic))
        } else if scores.best_edit >= self.threshold {
            scores.edit_index.map(|i| (i, MatchSignal::Edit, scores.best_edit))
        } else {
            None
        };

        let Some((index, signal, score)) = decision else {
            tracing::debug!(
                best_semantic = format_args!("{:.2}", scores.best_semantic),
                best_edit = format_args!("{:.2}", scores.best_edit),
                "no device above threshold"
            );
            return None;
        };
        let device = devices.get(index)?;
        tracing::debug!(
            device = %device.name,
            %signal,
            score = format_args!("{score:.2}"),
            "device resolved"
        );
        Some(Resolution {
            device,
            signal,
            score,
            scores,
        })
    }

    fn semantic_similarity(&self, target: &str, candidate: &str) -> f32 {
        if target == candidate {
            return 1.0;
        }
        match self.linguistics.similarity(target, candidate) {
            Ok(score) if score.is_finite() => score.clamp(0.0, 1.0),
            Ok(score) => {
                tracing::warn!(phrase = target, device = candidate, score, "non-finite similarity, treating as 0");
                0.0
            }
            Err(e) => {
                tracing::warn!(phrase = target, device = candidate, error = %e, "similarity lookup failed, treating as 0");
                0.0
            }
        }
    }
}

impl std::fmt::Debug for DeviceResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceResolver")
            .field("threshold", &self.threshold)
            .finish_non_exhaustive()
    }
}
