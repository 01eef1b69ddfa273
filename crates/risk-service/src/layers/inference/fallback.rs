use super::{Assessment, InferenceBackend};
use crate::error::BackendError;
use async_trait::async_trait;
use protocol::{RiskRequest, Source, Threats, FALLBACK_RISK_SCORE, PLACEHOLDER_MODEL_VERSION};

pub(crate) const PLACEHOLDER_MESSAGE: &str =
    "Placeholder response: no inference backend is configured";

/// Answers every request with the same moderate, zero-confidence verdict.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct FallbackBackend;

#[async_trait]
impl InferenceBackend for FallbackBackend {
    fn source(&self) -> Source {
        Source::Fallback
    }

    fn version(&self) -> &str {
        PLACEHOLDER_MODEL_VERSION
    }

    async fn infer(&self, _request: &RiskRequest) -> Result<Assessment, BackendError> {
        Ok(Assessment {
            risk_score: FALLBACK_RISK_SCORE,
            threats: Threats::fallback(),
            confidence: 0.0,
            source: Source::Fallback,
            model_version: PLACEHOLDER_MODEL_VERSION.to_string(),
            message: Some(PLACEHOLDER_MESSAGE.to_string()),
        })
    }
}
