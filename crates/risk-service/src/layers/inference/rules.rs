use super::features::{Feature, Features};
use super::{Assessment, InferenceBackend};
use crate::error::BackendError;
use crate::layers::policy::config::RulesConfig;
use crate::layers::policy::domain_list::{DomainList, ListVerdict};
use crate::layers::policy::lexicon::Lexicon;
use async_trait::async_trait;
use protocol::{RiskRequest, Source, Threats};

const LISTED_CONFIDENCE: f64 = 0.95;
const BASE_CONFIDENCE: f64 = 0.5;
const CONFIDENCE_PER_SIGNAL: f64 = 0.08;
const MAX_HEURISTIC_CONFIDENCE: f64 = 0.9;

/// A feature that fires once its value reaches `threshold`, contributing
/// `weight * value` to each threat head.
struct Signal {
    feature: Feature,
    threshold: f64,
    phishing: f64,
    malware: f64,
    social: f64,
}

const fn signal(feature: Feature, threshold: f64, phishing: f64, malware: f64, social: f64) -> Signal {
    Signal {
        feature,
        threshold,
        phishing,
        malware,
        social,
    }
}

const SIGNALS: &[Signal] = &[
    signal(Feature::Unparseable, 1.0, 0.30, 0.10, 0.00),
    signal(Feature::IpHost, 1.0, 0.35, 0.25, 0.00),
    signal(Feature::AtSymbol, 1.0, 0.30, 0.00, 0.05),
    signal(Feature::HostMismatch, 1.0, 0.30, 0.05, 0.00),
    signal(Feature::NotHttps, 1.0, 0.10, 0.05, 0.00),
    signal(Feature::Typosquat, 1.0, 0.45, 0.00, 0.10),
    signal(Feature::Homograph, 1.0, 0.45, 0.00, 0.10),
    signal(Feature::BrandImpersonation, 1.0, 0.50, 0.00, 0.15),
    signal(Feature::PhishingKeywords, 0.33, 0.35, 0.00, 0.10),
    signal(Feature::SocialKeywords, 0.33, 0.05, 0.00, 0.50),
    signal(Feature::RiskyTld, 1.0, 0.20, 0.25, 0.05),
    signal(Feature::Shortener, 1.0, 0.10, 0.20, 0.25),
    signal(Feature::MalwareExtension, 1.0, 0.05, 0.60, 0.00),
    signal(Feature::DigitRatio, 0.3, 0.15, 0.05, 0.00),
    signal(Feature::DomainEntropy, 0.8, 0.15, 0.15, 0.00),
    signal(Feature::SubdomainDepth, 0.33, 0.15, 0.05, 0.00),
    signal(Feature::HyphenCount, 0.5, 0.10, 0.00, 0.05),
    signal(Feature::EncodedChars, 0.3, 0.10, 0.10, 0.00),
    signal(Feature::DomainLength, 1.0, 0.10, 0.00, 0.00),
    signal(Feature::UrlLength, 1.0, 0.05, 0.05, 0.00),
];

#[derive(Debug, Clone)]
pub(crate) struct RuleBasedBackend {
    version: String,
    domains: DomainList,
    lexicon: Lexicon,
}

impl RuleBasedBackend {
    pub(crate) fn from_config(config: &RulesConfig) -> anyhow::Result<Self> {
        Ok(Self {
            version: config.version.clone(),
            domains: DomainList::from_config(config),
            lexicon: Lexicon::from_config(config)?,
        })
    }

    pub(crate) fn evaluate(&self, request: &RiskRequest) -> Assessment {
        let features = Features::extract(request, &self.lexicon);
        let (threats, fired) = score(&features);
        match self.domains.verdict(&request.domain) {
            ListVerdict::Denied(entry) => self.assessment(
                Threats::new(1.0, 1.0, threats.social),
                LISTED_CONFIDENCE,
                Some(format!("domain matched deny list entry {entry}")),
            ),
            ListVerdict::Allowed(entry) => self.assessment(
                Threats::default(),
                LISTED_CONFIDENCE,
                Some(format!("domain matched allow list entry {entry}")),
            ),
            ListVerdict::Unlisted => {
                let confidence = (BASE_CONFIDENCE + CONFIDENCE_PER_SIGNAL * fired as f64)
                    .min(MAX_HEURISTIC_CONFIDENCE);
                self.assessment(threats, confidence, None)
            }
        }
    }

    fn assessment(&self, threats: Threats, confidence: f64, message: Option<String>) -> Assessment {
        Assessment {
            risk_score: threats.max(),
            threats,
            confidence,
            source: Source::RuleBased,
            model_version: self.version.clone(),
            message,
        }
    }
}

#[async_trait]
impl InferenceBackend for RuleBasedBackend {
    fn source(&self) -> Source {
        Source::RuleBased
    }

    fn version(&self) -> &str {
        &self.version
    }

    async fn infer(&self, request: &RiskRequest) -> Result<Assessment, BackendError> {
        Ok(self.evaluate(request))
    }
}

fn score(features: &Features) -> (Threats, usize) {
    let mut threats = Threats::default();
    let mut fired = 0;
    for signal in SIGNALS {
        let value = features.get(signal.feature);
        if value <= 0.0 || value < signal.threshold {
            continue;
        }
        fired += 1;
        threats.phishing += signal.phishing * value;
        threats.malware += signal.malware * value;
        threats.social += signal.social * value;
    }
    let threats = Threats::new(
        threats.phishing.clamp(0.0, 1.0),
        threats.malware.clamp(0.0, 1.0),
        threats.social.clamp(0.0, 1.0),
    );
    (threats, fired)
}
