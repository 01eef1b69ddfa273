//! Function-style invocation envelope.
//!
//! An event either carries the request as a serialized JSON string under `body`,
//! or is the request object itself. [`parse_event`] resolves that once into a
//! typed [`RiskRequest`].

use crate::{ErrorBody, RiskRequest};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

pub const MISSING_FIELDS_MESSAGE: &str = "url and domain are required";
pub const CONTENT_TYPE_HEADER: &str = "Content-Type";
pub const JSON_CONTENT_TYPE: &str = "application/json";

pub const STATUS_OK: u16 = 200;
pub const STATUS_BAD_REQUEST: u16 = 400;
pub const STATUS_INTERNAL_ERROR: u16 = 500;

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("url and domain are required")]
    MissingField,
    #[error("invalid request body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("request must be a JSON object, got {0}")]
    NotAnObject(&'static str),
}

impl RequestError {
    /// Validation failures answer 400; everything else is a serialization fault.
    pub fn is_validation(&self) -> bool {
        matches!(self, RequestError::MissingField)
    }
}

#[derive(Debug, Clone, Copy)]
pub enum RequestSource<'a> {
    /// `body` holds a JSON document that still has to be decoded.
    Encoded(&'a str),
    /// The event is already the request object.
    Structured(&'a Value),
}

pub fn request_source(event: &Value) -> RequestSource<'_> {
    match event.get("body") {
        Some(Value::String(raw)) => RequestSource::Encoded(raw),
        _ => RequestSource::Structured(event),
    }
}

pub fn parse_event(event: &Value) -> Result<RiskRequest, RequestError> {
    match request_source(event) {
        RequestSource::Encoded(raw) => {
            let decoded: Value = serde_json::from_str(raw)?;
            request_from_value(&decoded)
        }
        RequestSource::Structured(value) => request_from_value(value),
    }
}

fn request_from_value(value: &Value) -> Result<RiskRequest, RequestError> {
    let object = value
        .as_object()
        .ok_or_else(|| RequestError::NotAnObject(json_kind(value)))?;
    let url = required_str(object, "url");
    let domain = required_str(object, "domain");
    let (Some(url), Some(domain)) = (url, domain) else {
        return Err(RequestError::MissingField);
    };
    let metadata = object.get("metadata").and_then(Value::as_object).cloned();
    Ok(RiskRequest {
        url: url.to_string(),
        domain: domain.to_string(),
        metadata,
    })
}

fn required_str<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    object
        .get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResult {
    pub status_code: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl InvocationResult {
    pub fn json(status_code: u16, body: String) -> Self {
        let headers = BTreeMap::from([(
            CONTENT_TYPE_HEADER.to_string(),
            JSON_CONTENT_TYPE.to_string(),
        )]);
        Self {
            status_code,
            headers,
            body,
        }
    }

    pub fn bad_request() -> Self {
        let body = serde_json::json!({ "error": MISSING_FIELDS_MESSAGE }).to_string();
        Self::json(STATUS_BAD_REQUEST, body)
    }

    pub fn is_success(&self) -> bool {
        self.status_code == STATUS_OK
    }

    pub fn decode_body<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_str(&self.body)
    }

    pub fn error_body(&self) -> Option<ErrorBody> {
        self.decode_body().ok()
    }
}
