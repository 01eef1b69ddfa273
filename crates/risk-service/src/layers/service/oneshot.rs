use crate::layers::service::handler::{event_from_bytes, InvocationContext, RiskService};
use anyhow::Context;
use protocol::InvocationResult;
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// `-` reads the event from stdin.
pub(crate) async fn read_event_source(source: &Path) -> anyhow::Result<Vec<u8>> {
    if source.as_os_str() == "-" {
        let mut raw = Vec::new();
        tokio::io::stdin()
            .read_to_end(&mut raw)
            .await
            .context("failed to read event from stdin")?;
        return Ok(raw);
    }
    tokio::fs::read(source)
        .await
        .with_context(|| format!("failed to read event {}", source.display()))
}

pub(crate) async fn invoke_once(service: &RiskService, raw: &[u8]) -> InvocationResult {
    let context = InvocationContext::new().with_peer("cli");
    service.handle(event_from_bytes(raw), &context).await
}

pub(crate) async fn run_once(service: &RiskService, source: &Path) -> anyhow::Result<InvocationResult> {
    let raw = read_event_source(source).await?;
    let result = invoke_once(service, &raw).await;
    let mut payload = serde_json::to_vec_pretty(&result)?;
    payload.push(b'\n');
    let mut stdout = tokio::io::stdout();
    stdout.write_all(&payload).await?;
    stdout.flush().await?;
    Ok(result)
}
