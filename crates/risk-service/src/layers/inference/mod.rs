pub(crate) mod artifact;
pub(crate) mod fallback;
pub(crate) mod features;
pub(crate) mod model;
pub(crate) mod rules;

use crate::error::BackendError;
use crate::layers::policy::config::{BackendMode, Config};
use async_trait::async_trait;
use protocol::{RiskRequest, RiskResponse, Source, Threats};
use std::sync::Arc;

use self::artifact::FileArtifactStore;
use self::fallback::FallbackBackend;
use self::model::ModelBackend;
use self::rules::RuleBasedBackend;

/// A backend's verdict before timing is attached.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Assessment {
    pub(crate) risk_score: f64,
    pub(crate) threats: Threats,
    pub(crate) confidence: f64,
    pub(crate) source: Source,
    pub(crate) model_version: String,
    pub(crate) message: Option<String>,
}

impl Assessment {
    /// Rejects anything a caller could not safely consume.
    pub(crate) fn check(&self) -> Result<(), BackendError> {
        check_unit("riskScore", self.risk_score)?;
        check_unit("confidence", self.confidence)?;
        for (name, value) in self.threats.entries() {
            check_unit(name, value)?;
        }
        if self.model_version.trim().is_empty() {
            return Err(BackendError::Malformed("modelVersion is empty".to_string()));
        }
        Ok(())
    }

    pub(crate) fn into_response(self, processing_time: u64) -> RiskResponse {
        RiskResponse {
            risk_score: self.risk_score,
            threats: self.threats,
            confidence: self.confidence,
            source: self.source,
            model_version: self.model_version,
            processing_time,
            message: self.message,
            error: None,
        }
    }
}

fn check_unit(name: &str, value: f64) -> Result<(), BackendError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(BackendError::Malformed(format!(
            "{name} must be within [0, 1], got {value}"
        )))
    }
}

#[async_trait]
pub(crate) trait InferenceBackend: Send + Sync {
    fn source(&self) -> Source;

    fn version(&self) -> &str;

    async fn infer(&self, request: &RiskRequest) -> Result<Assessment, BackendError>;
}

/// Picks the one backend that serves every request of this process.
///
/// A model that cannot be loaded degrades the process to the rule-based backend;
/// invalid rule configuration is a startup error.
pub(crate) async fn select_backend(config: &Config) -> anyhow::Result<Arc<dyn InferenceBackend>> {
    let backend: Arc<dyn InferenceBackend> = match config.backend.mode {
        BackendMode::Fallback => Arc::new(FallbackBackend),
        BackendMode::RuleBased => Arc::new(RuleBasedBackend::from_config(&config.rules)?),
        BackendMode::Ml => {
            let store = FileArtifactStore::new(&config.model.artifact_dir);
            match ModelBackend::load(&store, &config.model, &config.rules).await {
                Ok(backend) => Arc::new(backend),
                Err(err) => {
                    tracing::warn!(
                        event = "backend.model.unavailable",
                        version = %config.model.version,
                        artifact_dir = %config.model.artifact_dir.display(),
                        error = %err,
                        "model could not be loaded, using rule-based backend"
                    );
                    Arc::new(RuleBasedBackend::from_config(&config.rules)?)
                }
            }
        }
    };
    tracing::info!(
        event = "backend.selected",
        source = backend.source().as_str(),
        version = %backend.version(),
    );
    Ok(backend)
}
