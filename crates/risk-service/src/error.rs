use protocol::RequestError;
use std::time::Duration;
use thiserror::Error;

/// Failure of an inference backend while serving one request.
#[derive(Debug, Error)]
pub(crate) enum BackendError {
    #[error("inference timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error("inference backend panicked: {0}")]
    Panicked(String),
    #[error("inference backend returned malformed data: {0}")]
    Malformed(String),
    #[error("model evaluation failed: {0}")]
    Model(String),
}

/// Failure to obtain a model artifact from the artifact store.
#[derive(Debug, Error)]
pub(crate) enum ArtifactError {
    #[error("model version {0:?} is not a valid artifact name")]
    InvalidVersion(String),
    #[error("model artifact {0} not found")]
    NotFound(String),
    #[error("failed to read model artifact {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode model artifact {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("model head {head} references unknown feature {feature:?}")]
    UnknownFeature { head: &'static str, feature: String },
    #[error("model head {head} has a non-finite parameter")]
    NonFinite { head: &'static str },
    #[error("loading model artifact timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
}

/// Everything that can go wrong between receiving an event and shaping the reply.
#[derive(Debug, Error)]
pub(crate) enum ServiceError {
    #[error("url and domain are required")]
    Validation,
    #[error("{0}")]
    Serialization(String),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl From<RequestError> for ServiceError {
    fn from(err: RequestError) -> Self {
        if err.is_validation() {
            ServiceError::Validation
        } else {
            ServiceError::Serialization(err.to_string())
        }
    }
}
