mod cli;
mod error;
mod layers;

use crate::cli::Args;
use crate::layers::inference::select_backend;
use crate::layers::policy::config::Config;
use crate::layers::service::{init_tracing, run_once, serve_http, spawn_accept_loop, AuditLog, RiskService};
use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let _file_guard = init_tracing(&args.log_dir, args.log_to_stderr)?;

    let config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::default(),
    };
    let backend = select_backend(&config).await?;
    let mut service = RiskService::new(backend, config.backend.inference_timeout);
    if let Some(audit_dir) = &args.audit_dir {
        let audit = AuditLog::create(audit_dir)
            .with_context(|| format!("failed to create audit dir {}", audit_dir.display()))?;
        service = service.with_audit(audit);
    }

    if let Some(source) = &args.event {
        run_once(&service, source).await?;
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    let listener = TcpListener::bind(&args.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", args.listen_addr))?;
    let accept_loop = spawn_accept_loop(listener, service.clone(), shutdown.clone());

    let http = match &args.http_addr {
        Some(addr) => {
            let listener = TcpListener::bind(addr)
                .await
                .with_context(|| format!("failed to bind http addr {addr}"))?;
            Some(tokio::spawn(serve_http(listener, service, shutdown.clone())))
        }
        None => None,
    };

    tokio::signal::ctrl_c().await?;
    tracing::info!(event = "service.shutdown", "shutdown signal received");
    shutdown.cancel();

    accept_loop.await.context("tcp accept loop failed")?;
    if let Some(http) = http {
        http.await.context("http server task failed")??;
    }
    Ok(())
}
