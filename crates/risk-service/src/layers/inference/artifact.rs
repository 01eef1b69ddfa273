//! Model artifacts and where they come from.

use crate::error::ArtifactError;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Serialized form of a linear model: one logistic head per threat, keyed by
/// feature name.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub(crate) struct ModelArtifact {
    pub(crate) version: String,
    pub(crate) phishing: LinearHead,
    pub(crate) malware: LinearHead,
    pub(crate) social: LinearHead,
    /// Optional dedicated head for the overall score.
    #[serde(default)]
    pub(crate) risk: Option<LinearHead>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub(crate) struct LinearHead {
    #[serde(default)]
    pub(crate) bias: f64,
    #[serde(default)]
    pub(crate) weights: BTreeMap<String, f64>,
}

#[async_trait]
pub(crate) trait ArtifactStore: Send + Sync {
    async fn load_model(&self, version: &str) -> Result<ModelArtifact, ArtifactError>;
}

/// Reads `<dir>/<version>.json`.
#[derive(Debug, Clone)]
pub(crate) struct FileArtifactStore {
    dir: PathBuf,
}

impl FileArtifactStore {
    pub(crate) fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn artifact_path(&self, version: &str) -> Result<PathBuf, ArtifactError> {
        let valid = !version.is_empty()
            && version
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
            && !version.starts_with('.');
        if !valid {
            return Err(ArtifactError::InvalidVersion(version.to_string()));
        }
        Ok(self.dir.join(format!("{version}.json")))
    }
}

#[async_trait]
impl ArtifactStore for FileArtifactStore {
    async fn load_model(&self, version: &str) -> Result<ModelArtifact, ArtifactError> {
        let path = self.artifact_path(version)?;
        let display = path.display().to_string();
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(ArtifactError::NotFound(display));
            }
            Err(source) => {
                return Err(ArtifactError::Io {
                    path: display,
                    source,
                })
            }
        };
        serde_json::from_slice(&raw).map_err(|source| ArtifactError::Decode {
            path: display,
            source,
        })
    }
}

#[cfg(test)]
pub(crate) mod test_utils {
    use std::fs;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    pub(crate) fn temp_dir(prefix: &str) -> PathBuf {
        let mut dir = std::env::temp_dir();
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        dir.push(format!("{prefix}-{nanos}"));
        fs::create_dir_all(&dir).expect("create temp dir");
        dir
    }

    pub(crate) fn sample_artifact_json(version: &str) -> String {
        serde_json::json!({
            "version": version,
            "phishing": {
                "bias": -3.0,
                "weights": {
                    "typosquat": 3.0,
                    "brand_impersonation": 3.0,
                    "phishing_keywords": 2.5,
                    "host_mismatch": 2.0,
                    "ip_host": 2.0,
                    "not_https": 0.8
                }
            },
            "malware": {
                "bias": -3.5,
                "weights": {"malware_extension": 4.5, "ip_host": 1.5, "risky_tld": 1.0}
            },
            "social": {
                "bias": -3.0,
                "weights": {"social_keywords": 4.0, "shortener": 1.5}
            }
        })
        .to_string()
    }
}
