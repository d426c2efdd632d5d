//! Sparse TF-IDF vectorizer over pre-tokenized documents.
//!
//! Feature extraction:
//! - n-grams over the token sequence (default unigrams + bigrams, joined by a space)
//! - term frequency with sublinear scaling: `1 + ln(tf)`
//! - smoothed inverse document frequency: `ln((1 + n) / (1 + df)) + 1`
//! - L2 row normalization
//!
//! N-grams absent from the fitted vocabulary are ignored at transform time.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

/// Parameters fixed at fit time and persisted with the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorizerParams {
    /// Lowercase raw text before analysis.
    pub lowercase: bool,
    /// Inclusive n-gram range.
    pub ngram_range: (usize, usize),
    pub sublinear_tf: bool,
    pub use_idf: bool,
    pub smooth_idf: bool,
}

impl Default for VectorizerParams {
    fn default() -> Self {
        Self {
            lowercase: true,
            ngram_range: (1, 2),
            sublinear_tf: true,
            use_idf: true,
            smooth_idf: true,
        }
    }
}

/// A sparse vector with entries sorted by feature index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    entries: Vec<(u32, f32)>,
}

impl SparseVector {
    /// Build from `(index, value)` pairs; zero values are dropped.
    pub fn from_entries(mut entries: Vec<(u32, f32)>) -> Self {
        entries.retain(|&(_, v)| v != 0.0);
        entries.sort_by_key(|&(i, _)| i);
        Self { entries }
    }

    pub fn entries(&self) -> &[(u32, f32)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn norm(&self) -> f32 {
        self.entries.iter().map(|&(_, v)| v * v).sum::<f32>().sqrt()
    }

    pub fn dot(&self, other: &SparseVector) -> f32 {
        let (mut i, mut j) = (0, 0);
        let mut sum = 0.0;
        while i < self.entries.len() && j < other.entries.len() {
            let (ia, va) = self.entries[i];
            let (ib, vb) = other.entries[j];
            match ia.cmp(&ib) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    sum += va * vb;
                    i += 1;
                    j += 1;
                }
            }
        }
        sum
    }

    /// Cosine similarity; 0.0 if either vector is all zeros.
    pub fn cosine(&self, other: &SparseVector) -> f32 {
        let denom = self.norm() * other.norm();
        if denom == 0.0 {
            return 0.0;
        }
        (self.dot(other) / denom).clamp(-1.0, 1.0)
    }

    fn normalize(&mut self) {
        let norm = self.norm();
        if norm > 0.0 {
            for (_, v) in &mut self.entries {
                *v /= norm;
            }
        }
    }
}

/// Expand a token sequence into its n-grams, shortest first.
pub fn ngrams(tokens: &[String], (min_n, max_n): (usize, usize)) -> Vec<String> {
    let mut grams = Vec::new();
    for n in min_n.max(1)..=max_n {
        if n > tokens.len() {
            break;
        }
        for window in tokens.windows(n) {
            grams.push(window.join(" "));
        }
    }
    grams
}

/// TF-IDF vectorizer with a fitted vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TfIdfVectorizer {
    params: VectorizerParams,
    vocabulary: HashMap<String, u32>,
    idf: Vec<f32>,
}

impl TfIdfVectorizer {
    /// Fit on tokenized documents and return the vectorizer plus the
    /// transformed rows, one per document.
    ///
    /// Features are indexed in lexicographic order of their n-gram text.
    pub fn fit_transform(
        params: VectorizerParams,
        documents: &[Vec<String>],
    ) -> (Self, Vec<SparseVector>) {
        let doc_grams: Vec<Vec<String>> = documents
            .iter()
            .map(|tokens| ngrams(tokens, params.ngram_range))
            .collect();

        let features: BTreeSet<&str> = doc_grams.iter().flatten().map(String::as_str).collect();
        let vocabulary: HashMap<String, u32> = features
            .iter()
            .enumerate()
            .map(|(i, f)| ((*f).to_string(), i as u32))
            .collect();

        let mut df = vec![0u32; vocabulary.len()];
        for grams in &doc_grams {
            let unique: BTreeSet<&str> = grams.iter().map(String::as_str).collect();
            for gram in unique {
                if let Some(&idx) = vocabulary.get(gram) {
                    df[idx as usize] += 1;
                }
            }
        }

        let n = documents.len() as f32;
        let idf = df
            .iter()
            .map(|&d| {
                if !params.use_idf {
                    1.0
                } else if params.smooth_idf {
                    ((1.0 + n) / (1.0 + d as f32)).ln() + 1.0
                } else {
                    (n / d as f32).ln() + 1.0
                }
            })
            .collect();

        let vectorizer = Self {
            params,
            vocabulary,
            idf,
        };
        let rows = doc_grams.iter().map(|g| vectorizer.weigh(g)).collect();
        (vectorizer, rows)
    }

    /// Vectorize one tokenized document with the fitted vocabulary.
    pub fn transform(&self, tokens: &[String]) -> SparseVector {
        self.weigh(&ngrams(tokens, self.params.ngram_range))
    }

    fn weigh(&self, grams: &[String]) -> SparseVector {
        let mut counts: BTreeMap<u32, u32> = BTreeMap::new();
        for gram in grams {
            if let Some(&idx) = self.vocabulary.get(gram) {
                *counts.entry(idx).or_default() += 1;
            }
        }

        let entries = counts
            .into_iter()
            .map(|(idx, count)| {
                let tf = if self.params.sublinear_tf {
                    1.0 + (count as f32).ln()
                } else {
                    count as f32
                };
                (idx, tf * self.idf[idx as usize])
            })
            .collect();

        let mut vector = SparseVector::from_entries(entries);
        vector.normalize();
        vector
    }

    pub fn params(&self) -> &VectorizerParams {
        &self.params
    }

    pub fn vocabulary_len(&self) -> usize {
        self.vocabulary.len()
    }

    /// Check the internal invariants of a deserialized vectorizer.
    pub(crate) fn is_consistent(&self) -> bool {
        self.idf.len() == self.vocabulary.len()
            && self
                .vocabulary
                .values()
                .all(|&idx| (idx as usize) < self.idf.len())
            && self.idf.iter().all(|v| v.is_finite())
    }
}
