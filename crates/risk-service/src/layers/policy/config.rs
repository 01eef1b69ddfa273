use anyhow::Context;
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Default)]
pub(crate) struct Config {
    #[serde(default)]
    pub(crate) backend: BackendConfig,
    #[serde(default)]
    pub(crate) rules: RulesConfig,
    #[serde(default)]
    pub(crate) model: ModelConfig,
}

impl Config {
    pub(crate) fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub(crate) enum BackendMode {
    #[default]
    Fallback,
    RuleBased,
    Ml,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct BackendConfig {
    #[serde(default)]
    pub(crate) mode: BackendMode,
    #[serde(
        default = "default_inference_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub(crate) inference_timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            mode: BackendMode::default(),
            inference_timeout: default_inference_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RulesConfig {
    #[serde(default = "default_rules_version")]
    pub(crate) version: String,
    #[serde(default)]
    pub(crate) allowed_domains: Vec<String>,
    #[serde(default)]
    pub(crate) denied_domains: Vec<String>,
    #[serde(default = "default_risky_tlds")]
    pub(crate) risky_tlds: Vec<String>,
    #[serde(default = "default_shorteners")]
    pub(crate) shorteners: Vec<String>,
    #[serde(default = "default_phishing_keywords")]
    pub(crate) phishing_keywords: Vec<String>,
    #[serde(default = "default_social_keywords")]
    pub(crate) social_keywords: Vec<String>,
    #[serde(default = "default_typosquat_patterns")]
    pub(crate) typosquat_patterns: Vec<String>,
    #[serde(default = "default_malware_extensions")]
    pub(crate) malware_extensions: Vec<String>,
    /// Regexes matched against the lowercased domain.
    #[serde(default = "default_brand_patterns")]
    pub(crate) brand_patterns: Vec<String>,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            version: default_rules_version(),
            allowed_domains: Vec::new(),
            denied_domains: Vec::new(),
            risky_tlds: default_risky_tlds(),
            shorteners: default_shorteners(),
            phishing_keywords: default_phishing_keywords(),
            social_keywords: default_social_keywords(),
            typosquat_patterns: default_typosquat_patterns(),
            malware_extensions: default_malware_extensions(),
            brand_patterns: default_brand_patterns(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ModelConfig {
    #[serde(default = "default_artifact_dir")]
    pub(crate) artifact_dir: PathBuf,
    #[serde(default = "default_model_version")]
    pub(crate) version: String,
    #[serde(
        default = "default_load_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub(crate) load_timeout: Duration,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            artifact_dir: default_artifact_dir(),
            version: default_model_version(),
            load_timeout: default_load_timeout(),
        }
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(raw.trim()).map_err(serde::de::Error::custom)
}

fn default_inference_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_load_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_rules_version() -> String {
    "rules-v1.0.0".to_string()
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_model_version() -> String {
    "v1.0.0".to_string()
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

fn default_risky_tlds() -> Vec<String> {
    strings(&[
        ".tk", ".ml", ".ga", ".cf", ".gq", ".click", ".download", ".stream", ".zip", ".top",
        ".xyz", ".work", ".loan",
    ])
}

fn default_shorteners() -> Vec<String> {
    strings(&[
        "bit.ly",
        "tinyurl.com",
        "t.co",
        "goo.gl",
        "ow.ly",
        "is.gd",
        "buff.ly",
        "cutt.ly",
        "rebrand.ly",
        "shorturl.at",
    ])
}

fn default_phishing_keywords() -> Vec<String> {
    strings(&[
        "login", "signin", "verify", "account", "secure", "update", "banking", "confirm",
        "password", "suspended", "unlock", "validate", "wallet",
    ])
}

fn default_social_keywords() -> Vec<String> {
    strings(&[
        "winner", "prize", "free", "gift", "refund", "urgent", "bonus", "claim", "lottery",
        "giveaway", "reward",
    ])
}

fn default_typosquat_patterns() -> Vec<String> {
    strings(&[
        "g00gle", "goog1e", "gooogle", "googel", "mircosoft", "microsofy", "micrsoft", "amazom",
        "amaz0n", "arnazon", "facebok", "faceboook", "faceb00k", "payp4l", "paypa1", "paipal",
    ])
}

fn default_malware_extensions() -> Vec<String> {
    strings(&[
        ".exe", ".scr", ".apk", ".msi", ".bat", ".cmd", ".jar", ".vbs", ".ps1", ".dmg", ".rar",
        ".iso",
    ])
}

fn default_brand_patterns() -> Vec<String> {
    strings(&[
        r"(apple|icloud).*\.(tk|ml|ga|cf)$",
        r"(paypal|ebay|amazon|google|microsoft|facebook).*support",
        r"(secure|verify|update).*[.-](paypal|amazon|google|apple)",
        r"\d+[.-](paypal|amazon|google|apple|microsoft)",
    ])
}
