use crate::layers::service::handler::{event_from_bytes, InvocationContext, RiskService};
use anyhow::Context;
use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use protocol::InvocationResult;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Caller-supplied budget in milliseconds; becomes the invocation deadline.
pub(crate) const TIMEOUT_HEADER: &str = "x-timeout-ms";

pub(crate) fn router(service: RiskService) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/invoke", post(invoke))
        .route("/risk", post(risk))
        .with_state(service)
        .layer(middleware::from_fn(log_http_request))
}

pub(crate) async fn serve_http(
    listener: TcpListener,
    service: RiskService,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let addr = listener.local_addr().context("http listener address")?;
    tracing::info!(event = "http.listener.bound", addr = %addr);
    let app = router(service).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("http server failed")?;
    tracing::info!(event = "http.listener.closed");
    Ok(())
}

async fn health() -> &'static str {
    "ok"
}

/// Envelope in the body, always HTTP 200.
async fn invoke(
    State(service): State<RiskService>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<InvocationResult> {
    let context = context_for(peer, &headers);
    Json(service.handle(event_from_bytes(&body), &context).await)
}

/// Envelope mapped onto the HTTP response itself.
async fn risk(
    State(service): State<RiskService>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let context = context_for(peer, &headers);
    into_http_response(service.handle(event_from_bytes(&body), &context).await)
}

fn context_for(peer: SocketAddr, headers: &HeaderMap) -> InvocationContext {
    let context = InvocationContext::new().with_peer(peer.to_string());
    let budget = headers
        .get(TIMEOUT_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok());
    match budget {
        Some(ms) => context.with_deadline(Instant::now() + Duration::from_millis(ms)),
        None => context,
    }
}

pub(crate) fn into_http_response(result: InvocationResult) -> Response {
    let status = StatusCode::from_u16(result.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = (status, result.body).into_response();
    let headers = response.headers_mut();
    for (name, value) in &result.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => tracing::warn!(header = %name, "dropping invalid response header"),
        }
    }
    response
}

async fn log_http_request(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let host = req
        .headers()
        .get("host")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("-")
        .to_string();
    let response = next.run(req).await;
    let status = response.status();
    tracing::info!(
        method = %method,
        uri = %uri,
        host = %host,
        status = %status,
        "http request"
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::inference::fallback::FallbackBackend;
    use crate::layers::service::handler::test_backends::SlowBackend;
    use axum::http::header::CONTENT_TYPE;
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn service() -> RiskService {
        RiskService::new(Arc::new(FallbackBackend), Duration::from_secs(2))
    }

    fn peer() -> ConnectInfo<SocketAddr> {
        ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000)))
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[test]
    fn invoke_returns_envelope() {
        let rt = tokio::runtime::Runtime::new().expect("runtime");
        rt.block_on(async {
            let Json(result) = invoke(
                State(service()),
                peer(),
                HeaderMap::new(),
                Bytes::from(json!({"url": "https://a.io", "domain": "a.io"}).to_string()),
            )
            .await;
            assert_eq!(result.status_code, 200);
            let body: Value = result.decode_body().expect("body");
            assert_eq!(body["modelVersion"], "placeholder-v0.1.0");
        });
    }

    #[test]
    fn risk_maps_envelope_to_http() {
        let rt = tokio::runtime::Runtime::new().expect("runtime");
        rt.block_on(async {
            let response = risk(
                State(service()),
                peer(),
                HeaderMap::new(),
                Bytes::from_static(b"{\"url\":\"https://a.io\"}"),
            )
            .await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            assert_eq!(
                response.headers().get(CONTENT_TYPE).map(|v| v.as_bytes()),
                Some(&b"application/json"[..])
            );
            assert_eq!(
                body_json(response).await,
                json!({"error": "url and domain are required"})
            );
        });
    }

    #[test]
    fn timeout_header_bounds_inference() {
        let service = RiskService::new(
            Arc::new(SlowBackend(Duration::from_secs(30))),
            Duration::from_secs(10),
        );
        let mut headers = HeaderMap::new();
        headers.insert(TIMEOUT_HEADER, HeaderValue::from_static("30"));
        let rt = tokio::runtime::Runtime::new().expect("runtime");
        rt.block_on(async {
            let response = risk(
                State(service),
                peer(),
                headers,
                Bytes::from(json!({"url": "https://a.io", "domain": "a.io"}).to_string()),
            )
            .await;
            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
            let body = body_json(response).await;
            assert_eq!(body["source"], "fallback");
            assert!(body["error"].as_str().expect("error").contains("timed out"));
        });
    }

    #[test]
    fn invalid_status_becomes_500() {
        let result = InvocationResult::json(42, "{}".to_string());
        let response = into_http_response(result);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn serves_health_over_tcp() {
        let rt = tokio::runtime::Runtime::new().expect("runtime");
        rt.block_on(async {
            use tokio::io::{AsyncReadExt, AsyncWriteExt};

            let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
            let addr = listener.local_addr().expect("local addr");
            let shutdown = CancellationToken::new();
            let server = tokio::spawn(serve_http(listener, service(), shutdown.clone()));

            let mut stream = tokio::net::TcpStream::connect(addr).await.expect("connect");
            stream
                .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
                .await
                .expect("write request");
            let mut raw = String::new();
            stream.read_to_string(&mut raw).await.expect("read response");
            assert!(raw.starts_with("HTTP/1.1 200"), "{raw}");
            assert!(raw.ends_with("ok"), "{raw}");

            shutdown.cancel();
            server.await.expect("join").expect("serve");
        });
    }
}
