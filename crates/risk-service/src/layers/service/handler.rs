use crate::error::{BackendError, ServiceError};
use crate::layers::inference::{Assessment, InferenceBackend};
use crate::layers::service::audit::AuditLog;
use futures_util::FutureExt;
use protocol::invocation::{STATUS_INTERNAL_ERROR, STATUS_OK};
use protocol::{parse_event, InvocationResult, RiskRequest, RiskResponse};
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Fallback body used only if the failure payload itself cannot be serialized.
const STATIC_FAILURE_BODY: &str = r#"{"riskScore":0.5,"threats":{"phishing":0.5,"malware":0.0,"social":0.0},"confidence":0.0,"source":"fallback","modelVersion":"error","processingTime":0,"error":"failed to serialize response"}"#;

/// Per-invocation facts supplied by whoever calls the handler.
#[derive(Debug, Clone)]
pub(crate) struct InvocationContext {
    pub(crate) request_id: String,
    pub(crate) peer: Option<String>,
    deadline: Option<Instant>,
}

impl InvocationContext {
    pub(crate) fn new() -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            peer: None,
            deadline: None,
        }
    }

    pub(crate) fn with_peer(mut self, peer: impl Into<String>) -> Self {
        self.peer = Some(peer.into());
        self
    }

    pub(crate) fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub(crate) fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// The tighter of `limit` and the caller's remaining time.
    fn bound(&self, limit: Duration) -> Duration {
        match self.remaining() {
            Some(remaining) => remaining.min(limit),
            None => limit,
        }
    }
}

/// Turns one invocation event into one envelope. Nothing escapes [`RiskService::handle`]:
/// validation failures answer 400 and every other fault becomes the fixed 500 payload.
#[derive(Clone)]
pub(crate) struct RiskService {
    backend: Arc<dyn InferenceBackend>,
    inference_timeout: Duration,
    audit: Option<AuditLog>,
}

impl RiskService {
    pub(crate) fn new(backend: Arc<dyn InferenceBackend>, inference_timeout: Duration) -> Self {
        Self {
            backend,
            inference_timeout,
            audit: None,
        }
    }

    pub(crate) fn with_audit(mut self, audit: AuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    pub(crate) async fn handle(&self, event: Value, context: &InvocationContext) -> InvocationResult {
        tracing::info!(
            event = "risk.event.received",
            id = %context.request_id,
            peer = context.peer.as_deref().unwrap_or("-"),
            payload = %event,
        );
        if let Some(audit) = &self.audit {
            audit.spawn_event_record(context, &event);
        }

        let started_at = Instant::now();
        let result = match self.evaluate(&event, context).await {
            Ok(assessment) => success(assessment, started_at),
            Err(ServiceError::Validation) => {
                tracing::info!(
                    event = "risk.request.rejected",
                    id = %context.request_id,
                    reason = "missing url or domain",
                );
                InvocationResult::bad_request()
            }
            Err(err) => {
                tracing::warn!(
                    event = "risk.backend.failed",
                    id = %context.request_id,
                    source = self.backend.source().as_str(),
                    error = %err,
                );
                failure(&err, started_at)
            }
        };

        tracing::info!(
            event = "risk.response.sent",
            id = %context.request_id,
            status = result.status_code,
            body = %result.body,
        );
        if let Some(audit) = &self.audit {
            audit.spawn_result_record(context, &result);
        }
        result
    }

    async fn evaluate(
        &self,
        event: &Value,
        context: &InvocationContext,
    ) -> Result<Assessment, ServiceError> {
        let request = parse_event(event)?;
        let timeout = context.bound(self.inference_timeout);
        let assessment = self.infer_bounded(&request, timeout).await?;
        assessment.check()?;
        Ok(assessment)
    }

    async fn infer_bounded(
        &self,
        request: &RiskRequest,
        timeout: Duration,
    ) -> Result<Assessment, BackendError> {
        let guarded = AssertUnwindSafe(self.backend.infer(request)).catch_unwind();
        match tokio::time::timeout(timeout, guarded).await {
            Err(_) => Err(BackendError::Timeout(timeout)),
            Ok(Err(panic)) => Err(BackendError::Panicked(panic_message(panic.as_ref()))),
            Ok(Ok(result)) => result,
        }
    }
}

/// Raw transport bytes as an event. Bytes that are not JSON become an event whose
/// `body` is the text, so they fail decoding inside the handler like any bad body.
pub(crate) fn event_from_bytes(bytes: &[u8]) -> Value {
    match serde_json::from_slice(bytes) {
        Ok(event) => event,
        Err(err) => {
            tracing::warn!(event = "risk.event.undecodable", error = %err);
            serde_json::json!({ "body": String::from_utf8_lossy(bytes) })
        }
    }
}

/// Envelope for transport input that never became an event, such as an
/// oversized frame. Same fixed payload as any other failure.
pub(crate) fn rejected_input(reason: impl Into<String>) -> InvocationResult {
    failure(&ServiceError::Serialization(reason.into()), Instant::now())
}

fn success(assessment: Assessment, started_at: Instant) -> InvocationResult {
    let response = assessment.into_response(elapsed_ms(started_at));
    match serde_json::to_string(&response) {
        Ok(body) => InvocationResult::json(STATUS_OK, body),
        Err(err) => failure(&ServiceError::Serialization(err.to_string()), started_at),
    }
}

fn failure(err: &ServiceError, started_at: Instant) -> InvocationResult {
    let response = RiskResponse::failure(elapsed_ms(started_at), err.to_string());
    let body =
        serde_json::to_string(&response).unwrap_or_else(|_| STATIC_FAILURE_BODY.to_string());
    InvocationResult::json(STATUS_INTERNAL_ERROR, body)
}

fn elapsed_ms(started_at: Instant) -> u64 {
    u64::try_from(started_at.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
pub(crate) mod test_backends {
    use crate::error::BackendError;
    use crate::layers::inference::{Assessment, InferenceBackend};
    use async_trait::async_trait;
    use protocol::{RiskRequest, Source, Threats};
    use std::time::Duration;

    pub(crate) struct FailingBackend;

    #[async_trait]
    impl InferenceBackend for FailingBackend {
        fn source(&self) -> Source {
            Source::Ml
        }

        fn version(&self) -> &str {
            "broken"
        }

        async fn infer(&self, _request: &RiskRequest) -> Result<Assessment, BackendError> {
            Err(BackendError::Model("weights tensor missing".to_string()))
        }
    }

    pub(crate) struct PanickingBackend;

    #[async_trait]
    impl InferenceBackend for PanickingBackend {
        fn source(&self) -> Source {
            Source::Ml
        }

        fn version(&self) -> &str {
            "panics"
        }

        async fn infer(&self, _request: &RiskRequest) -> Result<Assessment, BackendError> {
            panic!("feature vector index out of bounds");
        }
    }

    pub(crate) struct SlowBackend(pub(crate) Duration);

    #[async_trait]
    impl InferenceBackend for SlowBackend {
        fn source(&self) -> Source {
            Source::Ml
        }

        fn version(&self) -> &str {
            "slow"
        }

        async fn infer(&self, _request: &RiskRequest) -> Result<Assessment, BackendError> {
            tokio::time::sleep(self.0).await;
            Ok(Assessment {
                risk_score: 0.1,
                threats: Threats::new(0.1, 0.0, 0.0),
                confidence: 0.9,
                source: Source::Ml,
                model_version: "slow".to_string(),
                message: None,
            })
        }
    }

    pub(crate) struct OutOfRangeBackend;

    #[async_trait]
    impl InferenceBackend for OutOfRangeBackend {
        fn source(&self) -> Source {
            Source::Ml
        }

        fn version(&self) -> &str {
            "overflow"
        }

        async fn infer(&self, _request: &RiskRequest) -> Result<Assessment, BackendError> {
            Ok(Assessment {
                risk_score: 1.7,
                threats: Threats::new(1.7, 0.0, 0.0),
                confidence: 0.9,
                source: Source::Ml,
                model_version: "overflow".to_string(),
                message: None,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_backends::{FailingBackend, OutOfRangeBackend, PanickingBackend, SlowBackend};
    use super::*;
    use crate::layers::inference::fallback::FallbackBackend;
    use crate::layers::inference::rules::RuleBasedBackend;
    use crate::layers::policy::config::RulesConfig;
    use protocol::invocation::{CONTENT_TYPE_HEADER, JSON_CONTENT_TYPE, MISSING_FIELDS_MESSAGE};
    use protocol::Source;
    use serde_json::json;

    fn service(backend: Arc<dyn InferenceBackend>) -> RiskService {
        RiskService::new(backend, Duration::from_secs(2))
    }

    fn run(service: &RiskService, event: Value) -> InvocationResult {
        let rt = tokio::runtime::Runtime::new().expect("runtime");
        rt.block_on(service.handle(event, &InvocationContext::new()))
    }

    fn body(result: &InvocationResult) -> Value {
        result.decode_body().expect("json body")
    }

    fn assert_complete_in_range(body: &Value) {
        for field in ["riskScore", "confidence"] {
            let value = body[field].as_f64().expect(field);
            assert!((0.0..=1.0).contains(&value), "{field} = {value}");
        }
        for head in ["phishing", "malware", "social"] {
            let value = body["threats"][head].as_f64().expect(head);
            assert!((0.0..=1.0).contains(&value), "{head} = {value}");
        }
        assert!(body["source"].is_string());
        assert!(body["modelVersion"].is_string());
        assert!(body["processingTime"].is_u64());
    }

    fn assert_fallback_failure(result: &InvocationResult) -> Value {
        assert_eq!(result.status_code, 500);
        let body = body(result);
        assert_complete_in_range(&body);
        assert_eq!(body["riskScore"], 0.5);
        assert_eq!(body["threats"]["phishing"], 0.5);
        assert_eq!(body["threats"]["malware"], 0.0);
        assert_eq!(body["threats"]["social"], 0.0);
        assert_eq!(body["confidence"], 0.0);
        assert_eq!(body["source"], "fallback");
        assert_eq!(body["modelVersion"], "error");
        assert!(!body["error"].as_str().expect("error").is_empty());
        body
    }

    #[test]
    fn valid_request_answers_200() {
        let result = run(
            &service(Arc::new(FallbackBackend)),
            json!({"url": "https://example.com", "domain": "example.com"}),
        );
        assert_eq!(result.status_code, 200);
        assert_eq!(
            result.headers.get(CONTENT_TYPE_HEADER).map(String::as_str),
            Some(JSON_CONTENT_TYPE)
        );
        let body = body(&result);
        assert_complete_in_range(&body);
        assert_eq!(body["source"], "fallback");
        assert_eq!(body["modelVersion"], "placeholder-v0.1.0");
        assert!(body["message"].is_string());
        assert!(body.get("error").is_none());
    }

    #[test]
    fn empty_event_answers_400() {
        let result = run(&service(Arc::new(FallbackBackend)), json!({}));
        assert_eq!(result.status_code, 400);
        assert_eq!(body(&result), json!({"error": MISSING_FIELDS_MESSAGE}));
    }

    #[test]
    fn missing_domain_answers_400() {
        let result = run(
            &service(Arc::new(FallbackBackend)),
            json!({"url": "https://x.com"}),
        );
        assert_eq!(result.status_code, 400);
        assert!(body(&result).get("riskScore").is_none());
    }

    #[test]
    fn validation_runs_before_backend() {
        let result = run(&service(Arc::new(PanickingBackend)), json!({"domain": "x.com"}));
        assert_eq!(result.status_code, 400);
    }

    #[test]
    fn encoded_body_is_decoded() {
        let result = run(
            &service(Arc::new(FallbackBackend)),
            json!({"body": "{\"url\":\"https://example.com\",\"domain\":\"example.com\"}"}),
        );
        assert_eq!(result.status_code, 200);
    }

    #[test]
    fn undecodable_body_answers_fallback_500() {
        let result = run(
            &service(Arc::new(FallbackBackend)),
            json!({"body": "{not json"}),
        );
        let body = assert_fallback_failure(&result);
        assert!(body["error"]
            .as_str()
            .expect("error")
            .contains("invalid request body"));
    }

    #[test]
    fn backend_error_answers_fallback_500() {
        let result = run(
            &service(Arc::new(FailingBackend)),
            json!({"url": "https://example.com", "domain": "example.com"}),
        );
        let body = assert_fallback_failure(&result);
        assert!(body["error"]
            .as_str()
            .expect("error")
            .contains("weights tensor missing"));
    }

    #[test]
    fn backend_panic_answers_fallback_500() {
        let result = run(
            &service(Arc::new(PanickingBackend)),
            json!({"url": "https://example.com", "domain": "example.com"}),
        );
        let body = assert_fallback_failure(&result);
        assert!(body["error"]
            .as_str()
            .expect("error")
            .contains("index out of bounds"));
    }

    #[test]
    fn slow_backend_times_out() {
        let service = RiskService::new(
            Arc::new(SlowBackend(Duration::from_secs(30))),
            Duration::from_millis(50),
        );
        let result = run(
            &service,
            json!({"url": "https://example.com", "domain": "example.com"}),
        );
        let body = assert_fallback_failure(&result);
        assert!(body["error"].as_str().expect("error").contains("timed out"));
    }

    #[test]
    fn caller_deadline_shortens_timeout() {
        let service = service(Arc::new(SlowBackend(Duration::from_secs(30))));
        let context =
            InvocationContext::new().with_deadline(Instant::now() + Duration::from_millis(50));
        let rt = tokio::runtime::Runtime::new().expect("runtime");
        let result = rt.block_on(service.handle(
            json!({"url": "https://example.com", "domain": "example.com"}),
            &context,
        ));
        assert_fallback_failure(&result);
    }

    #[test]
    fn out_of_range_output_answers_fallback_500() {
        let result = run(
            &service(Arc::new(OutOfRangeBackend)),
            json!({"url": "https://example.com", "domain": "example.com"}),
        );
        let body = assert_fallback_failure(&result);
        assert!(body["error"].as_str().expect("error").contains("malformed"));
    }

    #[test]
    fn identical_requests_give_identical_verdicts() {
        let backend = RuleBasedBackend::from_config(&RulesConfig::default()).expect("rules");
        let service = service(Arc::new(backend));
        let event = json!({
            "url": "http://secure-paypa1-login.tk/verify",
            "domain": "secure-paypa1-login.tk",
            "metadata": {"client": "extension"}
        });
        let first = body(&run(&service, event.clone()));
        let second = body(&run(&service, event));
        for field in ["riskScore", "threats", "confidence", "source", "modelVersion"] {
            assert_eq!(first[field], second[field], "{field} differs");
        }
        assert_eq!(first["source"], Source::RuleBased.as_str());
    }

    #[test]
    fn non_json_bytes_become_a_body_event() {
        let event = event_from_bytes(b"url=https://x.com");
        assert_eq!(event, json!({"body": "url=https://x.com"}));
        let event = event_from_bytes(br#"{"url":"a","domain":"b"}"#);
        assert_eq!(event["domain"], "b");
    }

    #[test]
    fn rejected_input_is_the_fallback_envelope() {
        let result = rejected_input("frame size too big");
        let body = assert_fallback_failure(&result);
        assert_eq!(body["error"], "frame size too big");
    }

    #[test]
    fn remaining_never_underflows() {
        let context = InvocationContext::new().with_deadline(Instant::now());
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(context.remaining(), Some(Duration::ZERO));
        assert_eq!(
            InvocationContext::new().bound(Duration::from_secs(1)),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn static_failure_body_is_well_formed() {
        let body: Value = serde_json::from_str(STATIC_FAILURE_BODY).expect("static body");
        assert_complete_in_range(&body);
        assert_eq!(body["modelVersion"], "error");
    }
}
