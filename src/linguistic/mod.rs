//! Linguistic analysis service: the seam between the command pipeline and
//! whatever NLP backend tokenizes, tags, and parses utterances.
//!
//! The pipeline never embeds a language model. Every component receives a
//! shared [`SharedLinguistics`] handle at construction time, so trained
//! artifacts stay independent of the backend.
//!
//! - [`LinguisticService`]: the trait (analysis + similarity)
//! - [`Analysis`] / [`Token`]: one parsed utterance
//! - [`Pos`] / [`DepRole`]: coarse tag sets the pipeline reasons about
//! - [`ServiceCell`]: guarded one-time initialization of the process-wide instance

pub mod remote;
pub mod scripted;

use std::ops::Range;
use std::sync::{Arc, Mutex, OnceLock};

use serde::{Deserialize, Serialize};

use crate::error::{LinguisticError, LinguisticResult};

pub use remote::{RemoteAnalyzer, RemoteConfig};
pub use scripted::ScriptedAnalyzer;

/// Reference-counted handle to the linguistic service shared by all components.
pub type SharedLinguistics = Arc<dyn LinguisticService>;

// ── Tags ────────────────────────────────────────────────────────────────

/// Universal part-of-speech tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Pos {
    Adj,
    Adp,
    Adv,
    Aux,
    Cconj,
    Det,
    Intj,
    Noun,
    Num,
    Part,
    Pron,
    Propn,
    Punct,
    Sconj,
    Sym,
    Verb,
    X,
    Space,
}

impl Pos {
    /// Parse a universal POS label (`"VERB"`, `"adp"`, ...). Unknown labels map to `X`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_uppercase().as_str() {
            "ADJ" => Self::Adj,
            "ADP" => Self::Adp,
            "ADV" => Self::Adv,
            "AUX" => Self::Aux,
            "CCONJ" | "CONJ" => Self::Cconj,
            "DET" => Self::Det,
            "INTJ" => Self::Intj,
            "NOUN" => Self::Noun,
            "NUM" => Self::Num,
            "PART" => Self::Part,
            "PRON" => Self::Pron,
            "PROPN" => Self::Propn,
            "PUNCT" => Self::Punct,
            "SCONJ" => Self::Sconj,
            "SYM" => Self::Sym,
            "VERB" => Self::Verb,
            "SPACE" => Self::Space,
            _ => Self::X,
        }
    }

    pub fn as_label(&self) -> &'static str {
        match self {
            Self::Adj => "ADJ",
            Self::Adp => "ADP",
            Self::Adv => "ADV",
            Self::Aux => "AUX",
            Self::Cconj => "CCONJ",
            Self::Det => "DET",
            Self::Intj => "INTJ",
            Self::Noun => "NOUN",
            Self::Num => "NUM",
            Self::Part => "PART",
            Self::Pron => "PRON",
            Self::Propn => "PROPN",
            Self::Punct => "PUNCT",
            Self::Sconj => "SCONJ",
            Self::Sym => "SYM",
            Self::Verb => "VERB",
            Self::X => "X",
            Self::Space => "SPACE",
        }
    }
}

impl std::fmt::Display for Pos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Dependency roles the pipeline distinguishes.
///
/// Covers both the TIGER labels emitted by German models (`oa`, `sb`, `pd`)
/// and Universal Dependencies labels (`obj`, `dobj`, `nsubj`). Anything else
/// is carried through as [`DepRole::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DepRole {
    /// Accusative / direct object (`oa`, `dobj`).
    DirectObject,
    /// Structural object without case marking (`obj`).
    Object,
    /// Subject (`sb`, `nsubj`).
    Subject,
    /// Predicate complement (`pd`).
    Predicative,
    /// Sentence root.
    Root,
    /// Any other relation, keeping the raw label.
    Other(String),
}

impl DepRole {
    pub fn from_label(label: &str) -> Self {
        let lower = label.trim().to_ascii_lowercase();
        match lower.as_str() {
            "oa" | "dobj" => Self::DirectObject,
            "obj" => Self::Object,
            "sb" | "nsubj" => Self::Subject,
            "pd" => Self::Predicative,
            "root" => Self::Root,
            _ => Self::Other(lower),
        }
    }

    /// Roles through which the target noun phrase of a command attaches.
    pub fn is_object_role(&self) -> bool {
        matches!(
            self,
            Self::DirectObject | Self::Object | Self::Subject | Self::Predicative
        )
    }
}

// ── Analysis ────────────────────────────────────────────────────────────

/// One token of an analysed utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    /// Surface form as it appeared in the input.
    pub text: String,
    pub lemma: String,
    pub pos: Pos,
    pub dep: DepRole,
    /// Index of the syntactic head. Roots point at themselves.
    pub head: usize,
}

/// A parsed utterance: tokens in input order plus sentence boundaries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub tokens: Vec<Token>,
    /// Token index ranges, one per sentence.
    pub sentences: Vec<Range<usize>>,
}

impl Analysis {
    pub fn new(tokens: Vec<Token>) -> Self {
        let sentences = if tokens.is_empty() {
            Vec::new()
        } else {
            vec![0..tokens.len()]
        };
        Self { tokens, sentences }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// The head token of `index`, if the head index is in range.
    pub fn head_of(&self, index: usize) -> Option<&Token> {
        let head = self.tokens.get(index)?.head;
        self.tokens.get(head)
    }

    /// Whether `ancestor` dominates `index` (a token dominates itself).
    ///
    /// Walks at most `len()` head links, so malformed cyclic parses terminate.
    pub fn dominates(&self, ancestor: usize, index: usize) -> bool {
        let mut current = index;
        for _ in 0..=self.tokens.len() {
            if current == ancestor {
                return true;
            }
            match self.tokens.get(current) {
                Some(token) if token.head != current => current = token.head,
                _ => return false,
            }
        }
        false
    }

    /// Indices of `index` and all of its descendants, in input order.
    pub fn subtree(&self, index: usize) -> Vec<usize> {
        (0..self.tokens.len())
            .filter(|&i| self.dominates(index, i))
            .collect()
    }

    /// Check that every head index points inside the token list.
    pub fn validate(&self) -> LinguisticResult<()> {
        let len = self.tokens.len();
        for (i, token) in self.tokens.iter().enumerate() {
            if token.head >= len {
                return Err(LinguisticError::MalformedAnalysis {
                    message: format!("token {i} ('{}') has head {} of {len}", token.text, token.head),
                });
            }
        }
        Ok(())
    }
}

// ── LinguisticService trait ─────────────────────────────────────────────

/// An NLP backend able to parse short utterances and compare phrases.
pub trait LinguisticService: Send + Sync {
    /// Tokenize, lemmatize, tag, and dependency-parse `text`.
    fn analyze(&self, text: &str) -> LinguisticResult<Analysis>;

    /// Semantic similarity of two short strings in \[0.0, 1.0\].
    fn similarity(&self, a: &str, b: &str) -> LinguisticResult<f32>;
}

// ── ServiceCell ─────────────────────────────────────────────────────────

/// Holds the process-wide linguistic service, created at most once.
///
/// Initialization may fail (backend unreachable); a failed attempt leaves the
/// cell empty so a later call can retry. Concurrent first calls are
/// serialized, and only one initializer runs.
#[derive(Default)]
pub struct ServiceCell {
    service: OnceLock<SharedLinguistics>,
    init: Mutex<()>,
}

impl ServiceCell {
    pub const fn new() -> Self {
        Self {
            service: OnceLock::new(),
            init: Mutex::new(()),
        }
    }

    /// Return the shared service, running `init` if none has been created yet.
    pub fn get_or_try_init<F>(&self, init: F) -> LinguisticResult<SharedLinguistics>
    where
        F: FnOnce() -> LinguisticResult<SharedLinguistics>,
    {
        if let Some(service) = self.service.get() {
            return Ok(Arc::clone(service));
        }

        let _guard = self.init.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(service) = self.service.get() {
            return Ok(Arc::clone(service));
        }

        let service = init()?;
        // Cannot already be set: every writer holds `init`.
        let _ = self.service.set(Arc::clone(&service));
        tracing::debug!("linguistic service initialized");
        Ok(service)
    }

    /// The service, if it has been initialized.
    pub fn get(&self) -> Option<SharedLinguistics> {
        self.service.get().map(Arc::clone)
    }
}

impl std::fmt::Debug for ServiceCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceCell")
            .field("initialized", &self.service.get().is_some())
            .finish()
    }
}
