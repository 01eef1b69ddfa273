use super::artifact::{ArtifactStore, LinearHead, ModelArtifact};
use super::features::{Feature, Features};
use super::{Assessment, InferenceBackend};
use crate::error::{ArtifactError, BackendError};
use crate::layers::policy::config::{ModelConfig, RulesConfig};
use crate::layers::policy::lexicon::Lexicon;
use async_trait::async_trait;
use protocol::{RiskRequest, Source, Threats};

#[derive(Debug, Clone)]
struct CompiledHead {
    bias: f64,
    weights: Vec<(Feature, f64)>,
}

impl CompiledHead {
    fn compile(name: &'static str, head: &LinearHead) -> Result<Self, ArtifactError> {
        if !head.bias.is_finite() {
            return Err(ArtifactError::NonFinite { head: name });
        }
        let mut weights = Vec::with_capacity(head.weights.len());
        for (feature_name, weight) in &head.weights {
            let feature =
                Feature::from_name(feature_name).ok_or_else(|| ArtifactError::UnknownFeature {
                    head: name,
                    feature: feature_name.clone(),
                })?;
            if !weight.is_finite() {
                return Err(ArtifactError::NonFinite { head: name });
            }
            weights.push((feature, *weight));
        }
        Ok(Self {
            bias: head.bias,
            weights,
        })
    }

    fn probability(&self, features: &Features) -> f64 {
        let logit = self.weights.iter().fold(self.bias, |acc, (feature, weight)| {
            acc + weight * features.get(*feature)
        });
        sigmoid(logit)
    }
}

/// Logistic heads over the lexical feature vector, loaded once at startup.
#[derive(Debug, Clone)]
pub(crate) struct ModelBackend {
    version: String,
    lexicon: Lexicon,
    phishing: CompiledHead,
    malware: CompiledHead,
    social: CompiledHead,
    risk: Option<CompiledHead>,
}

impl ModelBackend {
    pub(crate) async fn load(
        store: &dyn ArtifactStore,
        model: &ModelConfig,
        rules: &RulesConfig,
    ) -> anyhow::Result<Self> {
        let artifact = tokio::time::timeout(model.load_timeout, store.load_model(&model.version))
            .await
            .map_err(|_| ArtifactError::Timeout(model.load_timeout))??;
        if artifact.version != model.version {
            tracing::warn!(
                event = "backend.model.version_mismatch",
                requested = %model.version,
                artifact = %artifact.version,
            );
        }
        let lexicon = Lexicon::from_config(rules)?;
        let backend = Self::from_artifact(&artifact, lexicon)?;
        tracing::info!(
            event = "backend.model.loaded",
            version = %backend.version,
            phishing_weights = backend.phishing.weights.len(),
            malware_weights = backend.malware.weights.len(),
            social_weights = backend.social.weights.len(),
            risk_head = backend.risk.is_some(),
        );
        Ok(backend)
    }

    fn from_artifact(artifact: &ModelArtifact, lexicon: Lexicon) -> Result<Self, ArtifactError> {
        let risk = match &artifact.risk {
            Some(head) => Some(CompiledHead::compile("risk", head)?),
            None => None,
        };
        Ok(Self {
            version: artifact.version.clone(),
            lexicon,
            phishing: CompiledHead::compile("phishing", &artifact.phishing)?,
            malware: CompiledHead::compile("malware", &artifact.malware)?,
            social: CompiledHead::compile("social", &artifact.social)?,
            risk,
        })
    }

    pub(crate) fn evaluate(&self, request: &RiskRequest) -> Result<Assessment, BackendError> {
        let features = Features::extract(request, &self.lexicon);
        let threats = Threats::new(
            self.phishing.probability(&features),
            self.malware.probability(&features),
            self.social.probability(&features),
        );
        let risk_score = match &self.risk {
            Some(head) => head.probability(&features),
            None => threats.max(),
        };
        if !risk_score.is_finite() || threats.entries().iter().any(|(_, p)| !p.is_finite()) {
            return Err(BackendError::Model(format!(
                "non-finite output for features {:?}",
                features.named()
            )));
        }
        let confidence = threats
            .entries()
            .iter()
            .map(|(_, p)| (2.0 * p - 1.0).abs())
            .sum::<f64>()
            / threats.entries().len() as f64;
        Ok(Assessment {
            risk_score,
            threats,
            confidence,
            source: Source::Ml,
            model_version: self.version.clone(),
            message: None,
        })
    }
}

#[async_trait]
impl InferenceBackend for ModelBackend {
    fn source(&self) -> Source {
        Source::Ml
    }

    fn version(&self) -> &str {
        &self.version
    }

    async fn infer(&self, request: &RiskRequest) -> Result<Assessment, BackendError> {
        self.evaluate(request)
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}
