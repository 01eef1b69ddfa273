use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub mod framing;
pub mod invocation;

pub use invocation::{parse_event, InvocationResult, RequestError};

/// Model version reported when inference failed and the fixed payload was returned.
pub const ERROR_MODEL_VERSION: &str = "error";
/// Model version reported by the placeholder backend.
pub const PLACEHOLDER_MODEL_VERSION: &str = "placeholder-v0.1.0";
pub const FALLBACK_RISK_SCORE: f64 = 0.5;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskRequest {
    pub url: String,
    pub domain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Ml,
    RuleBased,
    Fallback,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Ml => "ml",
            Source::RuleBased => "rule_based",
            Source::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Threats {
    pub phishing: f64,
    pub malware: f64,
    pub social: f64,
}

impl Threats {
    pub fn new(phishing: f64, malware: f64, social: f64) -> Self {
        Self {
            phishing,
            malware,
            social,
        }
    }

    /// Moderate phishing suspicion with nothing else known.
    pub fn fallback() -> Self {
        Self::new(FALLBACK_RISK_SCORE, 0.0, 0.0)
    }

    pub fn entries(&self) -> [(&'static str, f64); 3] {
        [
            ("phishing", self.phishing),
            ("malware", self.malware),
            ("social", self.social),
        ]
    }

    pub fn max(&self) -> f64 {
        self.phishing.max(self.malware).max(self.social)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RiskResponse {
    pub risk_score: f64,
    pub threats: Threats,
    pub confidence: f64,
    pub source: Source,
    pub model_version: String,
    pub processing_time: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RiskResponse {
    /// The fixed moderate-risk payload returned when handling failed after validation.
    pub fn failure(processing_time: u64, error: impl Into<String>) -> Self {
        Self {
            risk_score: FALLBACK_RISK_SCORE,
            threats: Threats::fallback(),
            confidence: 0.0,
            source: Source::Fallback,
            model_version: ERROR_MODEL_VERSION.to_string(),
            processing_time,
            message: None,
            error: Some(error.into()),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
}
