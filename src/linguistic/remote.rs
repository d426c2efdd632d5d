//! HTTP client for a spaCy-style analysis server.
//!
//! The server exposes three endpoints:
//!
//! - `GET  {base}/health` liveness probe, used once at initialization
//! - `POST {base}/analyze` `{"text": ...}` → tokens with lemma/POS/dep/head
//! - `POST {base}/similarity` `{"a": ..., "b": ...}` → `{"similarity": f}`

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{Analysis, DepRole, LinguisticService, Pos, Token};
use crate::error::{LinguisticError, LinguisticResult};

/// Connection settings for [`RemoteAnalyzer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the analysis server.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Model the server should use, forwarded with every request.
    #[serde(default = "default_model")]
    pub model: String,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:8010".into()
}
fn default_model() -> String {
    "de_core_news_lg".into()
}
fn default_timeout_secs() -> u64 {
    10
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireToken {
    text: String,
    lemma: String,
    pos: String,
    dep: String,
    head: usize,
}

#[derive(Debug, Deserialize)]
struct WireAnalysis {
    tokens: Vec<WireToken>,
    #[serde(default)]
    sentences: Vec<(usize, usize)>,
}

#[derive(Debug, Deserialize)]
struct WireSimilarity {
    similarity: f32,
}

impl From<WireAnalysis> for Analysis {
    fn from(wire: WireAnalysis) -> Self {
        let tokens: Vec<Token> = wire
            .tokens
            .into_iter()
            .map(|t| Token {
                text: t.text,
                lemma: t.lemma,
                pos: Pos::from_label(&t.pos),
                dep: DepRole::from_label(&t.dep),
                head: t.head,
            })
            .collect();
        let sentences = if wire.sentences.is_empty() && !tokens.is_empty() {
            vec![0..tokens.len()]
        } else {
            wire.sentences.into_iter().map(|(s, e)| s..e).collect()
        };
        Analysis { tokens, sentences }
    }
}

/// [`LinguisticService`] backed by a remote analysis server.
pub struct RemoteAnalyzer {
    config: RemoteConfig,
    agent: ureq::Agent,
}

impl RemoteAnalyzer {
    /// Create a client without contacting the server.
    pub fn new(config: RemoteConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build();
        Self { config, agent }
    }

    /// Create a client and verify the server answers its health probe.
    pub fn connect(config: RemoteConfig) -> LinguisticResult<Self> {
        let analyzer = Self::new(config);
        analyzer.probe()?;
        tracing::info!(
            url = %analyzer.config.base_url,
            model = %analyzer.config.model,
            "connected to linguistic service"
        );
        Ok(analyzer)
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    fn probe(&self) -> LinguisticResult<()> {
        let url = format!("{}/health", self.config.base_url);
        match self.agent.get(&url).call() {
            Ok(resp) if resp.status() == 200 => Ok(()),
            Ok(_) | Err(_) => Err(LinguisticError::Unavailable {
                url: self.config.base_url.clone(),
            }),
        }
    }

    fn post(&self, endpoint: &str, body: serde_json::Value) -> LinguisticResult<ureq::Response> {
        let url = format!("{}/{endpoint}", self.config.base_url);
        self.agent
            .post(&url)
            .set("Content-Type", "application/json")
            .send_json(body)
            .map_err(|e| match e {
                ureq::Error::Status(code, _) => LinguisticError::RequestFailed {
                    message: format!("{url} returned status {code}"),
                },
                ureq::Error::Transport(t) => LinguisticError::RequestFailed {
                    message: t.to_string(),
                },
            })
    }
}

impl LinguisticService for RemoteAnalyzer {
    fn analyze(&self, text: &str) -> LinguisticResult<Analysis> {
        let resp = self.post(
            "analyze",
            serde_json::json!({
                "text": text,
                "model": self.config.model,
            }),
        )?;
        let wire: WireAnalysis = resp.into_json().map_err(|e| LinguisticError::ParseError {
            message: e.to_string(),
        })?;
        let analysis = Analysis::from(wire);
        analysis.validate()?;
        Ok(analysis)
    }

    fn similarity(&self, a: &str, b: &str) -> LinguisticResult<f32> {
        let resp = self.post(
            "similarity",
            serde_json::json!({
                "a": a,
                "b": b,
                "model": self.config.model,
            }),
        )?;
        let wire: WireSimilarity = resp.into_json().map_err(|e| LinguisticError::ParseError {
            message: e.to_string(),
        })?;
        Ok(wire.similarity)
    }
}

impl std::fmt::Debug for RemoteAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteAnalyzer")
            .field("base_url", &self.config.base_url)
            .field("model", &self.config.model)
            .finish()
    }
}
