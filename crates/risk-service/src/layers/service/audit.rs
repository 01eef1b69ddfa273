use crate::layers::service::handler::InvocationContext;
use protocol::{InvocationResult, RiskResponse};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Best-effort per-invocation records under one directory. Write failures are
/// logged and never reach the caller.
#[derive(Debug, Clone)]
pub(crate) struct AuditLog {
    output_dir: Arc<PathBuf>,
}

impl AuditLog {
    pub(crate) fn create(output_dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let output_dir = output_dir.into();
        std::fs::create_dir_all(&output_dir)?;
        Ok(Self {
            output_dir: Arc::new(output_dir),
        })
    }

    pub(crate) fn spawn_event_record(&self, context: &InvocationContext, event: &Value) {
        let record = EventRecord {
            id: context.request_id.clone(),
            peer: context.peer.clone(),
            received_at_ms: system_time_ms(SystemTime::now()),
            event: event.clone(),
        };
        let output_dir = Arc::clone(&self.output_dir);
        tokio::spawn(async move {
            if let Err(err) = write_event_record(&output_dir, &record).await {
                tracing::warn!(error = %err, id = %record.id, "failed to write event record");
            }
        });
    }

    pub(crate) fn spawn_result_record(&self, context: &InvocationContext, result: &InvocationResult) {
        let record = ResultRecord::from_result(&context.request_id, result, SystemTime::now());
        let output_dir = Arc::clone(&self.output_dir);
        tokio::spawn(async move {
            if let Err(err) = write_result_record(&output_dir, &record).await {
                tracing::warn!(error = %err, id = %record.id, "failed to write result record");
            }
        });
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct EventRecord {
    id: String,
    peer: Option<String>,
    received_at_ms: u64,
    event: Value,
}

#[derive(Debug, Serialize)]
pub(crate) struct ResultRecord {
    id: String,
    finished_at_ms: u64,
    status_code: u16,
    success: bool,
    source: Option<String>,
    risk_score: Option<f64>,
    model_version: Option<String>,
    processing_time_ms: Option<u64>,
    error: Option<String>,
}

impl ResultRecord {
    pub(crate) fn from_result(id: &str, result: &InvocationResult, finished_at: SystemTime) -> Self {
        let response: Option<RiskResponse> = result.decode_body().ok();
        let error = match &response {
            Some(response) if response.is_failure() => response.error.clone(),
            Some(_) => None,
            None => result.error_body().map(|body| body.error),
        };
        Self {
            id: id.to_string(),
            finished_at_ms: system_time_ms(finished_at),
            status_code: result.status_code,
            success: result.is_success(),
            source: response
                .as_ref()
                .map(|response| response.source.as_str().to_string()),
            risk_score: response.as_ref().map(|response| response.risk_score),
            model_version: response
                .as_ref()
                .map(|response| response.model_version.clone()),
            processing_time_ms: response.as_ref().map(|response| response.processing_time),
            error,
        }
    }
}

pub(crate) async fn write_event_record(output_dir: &Path, record: &EventRecord) -> anyhow::Result<()> {
    let path = output_dir.join(format!("{}.event.json", record.id));
    let payload = serde_json::to_vec_pretty(record)?;
    tokio::fs::write(path, payload).await?;
    Ok(())
}

pub(crate) async fn write_result_record(
    output_dir: &Path,
    record: &ResultRecord,
) -> anyhow::Result<()> {
    let path = output_dir.join(format!("{}.result.json", record.id));
    let payload = serde_json::to_vec_pretty(record)?;
    tokio::fs::write(path, payload).await?;
    Ok(())
}

fn system_time_ms(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as u64)
        .unwrap_or(0)
}
