//! In-memory linguistic service with hand-annotated parses.
//!
//! `ScriptedAnalyzer` answers from tables filled in by the caller: full
//! dependency parses for known utterances, a lexicon of lemma/POS entries for
//! everything else, and a similarity table. Used by the test suite and by the
//! CLI's `--offline` mode where no analysis server is running.

use std::collections::HashMap;

use super::{Analysis, DepRole, LinguisticService, Pos, Token};
use crate::error::{LinguisticError, LinguisticResult};

/// Trailing characters split off into their own `PUNCT` tokens.
const PUNCTUATION: &[char] = &['.', ',', '!', '?', ';', ':'];

#[derive(Debug, Clone)]
struct Lexeme {
    lemma: String,
    pos: Pos,
}

/// Table-driven [`LinguisticService`].
#[derive(Debug, Clone, Default)]
pub struct ScriptedAnalyzer {
    /// Lowercased utterance → full parse.
    parses: HashMap<String, Analysis>,
    /// Lowercased surface form → lemma + POS.
    lexicon: HashMap<String, Lexeme>,
    /// Ordered lowercased pair → similarity.
    similarities: HashMap<(String, String), f32>,
    fail_analysis: bool,
    fail_similarity: bool,
}

impl ScriptedAnalyzer {
    /// An analyzer that knows nothing: every word is tagged `X`.
    pub fn new() -> Self {
        Self::default()
    }

    /// A small German command lexicon: command verbs, separable particles,
    /// articles, and contracted prepositions.
    pub fn german_commands() -> Self {
        let mut analyzer = Self::new();
        for (surface, lemma, pos) in [
            ("schalte", "schalten", Pos::Verb),
            ("schalt", "schalten", Pos::Verb),
            ("mach", "machen", Pos::Verb),
            ("mache", "machen", Pos::Verb),
            ("dreh", "drehen", Pos::Verb),
            ("drehe", "drehen", Pos::Verb),
            ("stell", "stellen", Pos::Verb),
            ("stelle", "stellen", Pos::Verb),
            ("aktiviere", "aktivieren", Pos::Verb),
            ("deaktiviere", "deaktivieren", Pos::Verb),
            ("bitte", "bitte", Pos::Adv),
            ("an", "an", Pos::Adp),
            ("aus", "aus", Pos::Adp),
            ("ein", "ein", Pos::Adp),
            ("auf", "auf", Pos::Adp),
            ("ab", "ab", Pos::Adp),
            ("im", "in", Pos::Adp),
            ("in", "in", Pos::Adp),
            ("am", "an", Pos::Adp),
            ("um", "um", Pos::Adp),
            ("und", "und", Pos::Cconj),
            ("oder", "oder", Pos::Cconj),
            ("der", "der", Pos::Det),
            ("die", "der", Pos::Det),
            ("das", "der", Pos::Det),
            ("den", "der", Pos::Det),
            ("dem", "der", Pos::Det),
            ("es", "es", Pos::Pron),
            ("sie", "sie", Pos::Pron),
        ] {
            analyzer = analyzer.with_lexeme(surface, lemma, pos);
        }
        analyzer
    }

    /// Register a lemma and POS for a surface form (case-insensitive).
    pub fn with_lexeme(mut self, surface: &str, lemma: &str, pos: Pos) -> Self {
        self.lexicon.insert(
            surface.to_lowercase(),
            Lexeme {
                lemma: lemma.to_string(),
                pos,
            },
        );
        self
    }

    /// Register a full parse for `text` (case-insensitive lookup).
    ///
    /// Each entry is `(surface, lemma, pos, dependency label, head index)`.
    pub fn with_parse(mut self, text: &str, tokens: &[(&str, &str, Pos, &str, usize)]) -> Self {
        let tokens = tokens
            .iter()
            .map(|(surface, lemma, pos, dep, head)| Token {
                text: (*surface).to_string(),
                lemma: (*lemma).to_string(),
                pos: *pos,
                dep: DepRole::from_label(dep),
                head: *head,
            })
            .collect();
        self.parses.insert(key(text), Analysis::new(tokens));
        self
    }

    /// Register a symmetric similarity score for a pair of strings.
    pub fn with_similarity(mut self, a: &str, b: &str, score: f32) -> Self {
        self.similarities.insert((key(a), key(b)), score);
        self.similarities.insert((key(b), key(a)), score);
        self
    }

    /// Make every `analyze` call fail, as an unreachable backend would.
    pub fn failing_analysis(mut self) -> Self {
        self.fail_analysis = true;
        self
    }

    /// Make every `similarity` call fail.
    pub fn failing_similarity(mut self) -> Self {
        self.fail_similarity = true;
        self
    }

    fn lexical_analysis(&self, text: &str) -> Analysis {
        let mut tokens = Vec::new();
        let mut sentences = Vec::new();
        let mut sentence_start = 0;

        for word in text.split_whitespace() {
            let core = word.trim_end_matches(PUNCTUATION);
            let trailing = &word[core.len()..];

            if !core.is_empty() {
                let (lemma, pos) = match self.lexicon.get(&core.to_lowercase()) {
                    Some(lex) => (lex.lemma.clone(), lex.pos),
                    None => (core.to_lowercase(), Pos::X),
                };
                let index = tokens.len();
                tokens.push(Token {
                    text: core.to_string(),
                    lemma,
                    pos,
                    dep: DepRole::Other("dep".into()),
                    head: index,
                });
            }

            for mark in trailing.chars() {
                let index = tokens.len();
                tokens.push(Token {
                    text: mark.to_string(),
                    lemma: mark.to_string(),
                    pos: Pos::Punct,
                    dep: DepRole::Other("punct".into()),
                    head: index,
                });
                if matches!(mark, '.' | '!' | '?') {
                    sentences.push(sentence_start..tokens.len());
                    sentence_start = tokens.len();
                }
            }
        }

        if sentence_start < tokens.len() {
            sentences.push(sentence_start..tokens.len());
        }

        Analysis { tokens, sentences }
    }
}

fn key(text: &str) -> String {
    text.trim().to_lowercase()
}

impl LinguisticService for ScriptedAnalyzer {
    fn analyze(&self, text: &str) -> LinguisticResult<Analysis> {
        if self.fail_analysis {
            return Err(LinguisticError::RequestFailed {
                message: "scripted analysis failure".into(),
            });
        }
        match self.parses.get(&key(text)) {
            Some(analysis) => Ok(analysis.clone()),
            None => Ok(self.lexical_analysis(text)),
        }
    }

    fn similarity(&self, a: &str, b: &str) -> LinguisticResult<f32> {
        if self.fail_similarity {
            return Err(LinguisticError::RequestFailed {
                message: "scripted similarity failure".into(),
            });
        }
        let (a, b) = (key(a), key(b));
        if a == b {
            return Ok(1.0);
        }
        Ok(self.similarities.get(&(a, b)).copied().unwrap_or(0.0))
    }
}
