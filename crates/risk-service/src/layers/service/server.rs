use crate::layers::service::handler::{
    event_from_bytes, rejected_input, InvocationContext, RiskService,
};
use anyhow::Context;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tokio_util::sync::CancellationToken;

pub(crate) fn frame_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(protocol::framing::MAX_FRAME_LENGTH)
        .new_codec()
}

/// One event per frame in, one [`protocol::InvocationResult`] per frame out.
pub(crate) fn spawn_accept_loop(
    listener: TcpListener,
    service: RiskService,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(event = "tcp.listener.bound", addr = %addr);
    }
    tokio::spawn(async move {
        loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, addr)) => {
                    let service = service.clone();
                    let shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        if let Err(err) = handle_connection(stream, addr, service, shutdown).await
                        {
                            tracing::error!(
                                event = "tcp.conn.error",
                                peer = %addr,
                                error = %err,
                                "connection handler failed"
                            );
                        }
                    });
                }
                Err(err) => {
                    tracing::error!(error = %err, "listener accept failed");
                }
            }
        }
        tracing::info!(event = "tcp.listener.closed");
    })
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    service: RiskService,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    tracing::debug!(event = "tcp.conn.accepted", peer = %addr);
    let mut framed = Framed::new(stream, frame_codec());
    loop {
        let frame = tokio::select! {
            _ = shutdown.cancelled() => break,
            frame = framed.next() => frame,
        };
        let Some(frame) = frame else {
            break;
        };
        let bytes = match frame {
            Ok(bytes) => bytes,
            Err(err) => {
                // The stream cannot be resynchronized; answer once, then close.
                tracing::warn!(event = "tcp.frame.rejected", peer = %addr, error = %err);
                let result = rejected_input(format!("invalid frame: {err}"));
                let payload = serde_json::to_vec(&result)?;
                let _ = framed.send(Bytes::from(payload)).await;
                return Err(err).context("frame read");
            }
        };
        let event = event_from_bytes(&bytes);
        let context = InvocationContext::new().with_peer(addr.to_string());
        let result = service.handle(event, &context).await;
        let payload = serde_json::to_vec(&result)?;
        framed.send(Bytes::from(payload)).await?;
    }
    tracing::debug!(event = "tcp.conn.closed", peer = %addr);
    Ok(())
}
