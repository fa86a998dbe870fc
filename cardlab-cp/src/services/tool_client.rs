//! Uniform client for the external tool-calling service.
//!
//! Every capability call goes through the same envelope: the toolhost
//! answers `{success: bool, error?: string, <capability fields>}`. The
//! envelope is validated exactly once here; callers see a typed
//! `Result<_, ToolError>` and never inspect raw JSON. Binary image payloads
//! are base64-encoded on the way out and decoded on the way back, so the
//! engine never assumes the transport's native type.
//!
//! This module does not narrate; callers narrate before and after calls.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use cardlab_common::config::ToolhostConfig;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::models::{GradeRecord, Identification, ListingDescription};

/// Named external capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    CheckOrientation,
    RotateImage,
    RemoveBackground,
    IdentifyCard,
    GradeCard,
    EnhanceImage,
    GenerateDescription,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::CheckOrientation => "check_orientation",
            Capability::RotateImage => "rotate_image",
            Capability::RemoveBackground => "remove_background",
            Capability::IdentifyCard => "identify_card",
            Capability::GradeCard => "grade_card",
            Capability::EnhanceImage => "enhance_image",
            Capability::GenerateDescription => "generate_description",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tool call errors. These never propagate past a step boundary; the side
/// processor records them and continues with the remaining plan.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool call timed out after {0:?}")]
    TimedOut(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("tool reported error: {0}")]
    Remote(String),

    #[error("malformed tool response: {0}")]
    Malformed(String),
}

/// Transport for capability calls. The HTTP implementation talks to the
/// toolhost; tests substitute scripted invokers.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    /// Invoke a capability and return the raw response envelope.
    async fn call(&self, capability: Capability, params: Value) -> Result<Value, ToolError>;
}

/// HTTP transport: POST `{method, params}` to `{base_url}/tools/call`.
pub struct HttpToolClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpToolClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ToolError> {
        // No client-level timeout: the ToolSuite enforces per-call ceilings.
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| ToolError::Transport(e.to_string()))?;
        Ok(Self { http, base_url: base_url.into() })
    }
}

#[async_trait]
impl ToolInvoker for HttpToolClient {
    async fn call(&self, capability: Capability, params: Value) -> Result<Value, ToolError> {
        let url = format!("{}/tools/call", self.base_url.trim_end_matches('/'));
        tracing::debug!(capability = %capability, "Calling toolhost");

        let response = self
            .http
            .post(&url)
            .json(&json!({ "method": capability.as_str(), "params": params }))
            .send()
            .await
            .map_err(|e| ToolError::Transport(e.to_string()))?;

        response
            .json::<Value>()
            .await
            .map_err(|e| ToolError::Malformed(e.to_string()))
    }
}

/// Typed capability surface over a `ToolInvoker`.
///
/// Applies per-call timeouts (grading gets the longer ceiling) and envelope
/// validation uniformly, whatever the underlying transport.
#[derive(Clone)]
pub struct ToolSuite {
    invoker: Arc<dyn ToolInvoker>,
    call_timeout: Duration,
    grading_timeout: Duration,
}

impl ToolSuite {
    pub fn new(invoker: Arc<dyn ToolInvoker>, config: &ToolhostConfig) -> Self {
        Self {
            invoker,
            call_timeout: Duration::from_secs(config.call_timeout_secs),
            grading_timeout: Duration::from_secs(config.grading_timeout_secs),
        }
    }

    /// Construct with explicit timeouts (used by tests).
    pub fn with_timeouts(
        invoker: Arc<dyn ToolInvoker>,
        call_timeout: Duration,
        grading_timeout: Duration,
    ) -> Self {
        Self { invoker, call_timeout, grading_timeout }
    }

    /// Invoke a capability and validate the response envelope.
    async fn invoke(
        &self,
        capability: Capability,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, ToolError> {
        let envelope = tokio::time::timeout(timeout, self.invoker.call(capability, params))
            .await
            .map_err(|_| ToolError::TimedOut(timeout))??;

        if let Some(error) = envelope.get("error").and_then(Value::as_str) {
            if !error.is_empty() {
                return Err(ToolError::Remote(error.to_string()));
            }
        }
        if !envelope.get("success").and_then(Value::as_bool).unwrap_or(false) {
            return Err(ToolError::Remote(format!(
                "{} reported failure without detail",
                capability
            )));
        }
        Ok(envelope)
    }

    pub async fn check_orientation(&self, image: &[u8]) -> Result<OrientationReport, ToolError> {
        let envelope = self
            .invoke(
                Capability::CheckOrientation,
                json!({ "image_bytes": BASE64.encode(image) }),
                self.call_timeout,
            )
            .await?;
        from_envelope(&envelope)
    }

    pub async fn rotate_image(&self, image: &[u8], angle: f32) -> Result<Vec<u8>, ToolError> {
        let envelope = self
            .invoke(
                Capability::RotateImage,
                json!({
                    "image_bytes": BASE64.encode(image),
                    "angle": angle,
                    "expand": true,
                    "fillcolor": "white",
                }),
                self.call_timeout,
            )
            .await?;
        decode_image_field(&envelope, "rotated_image")
    }

    pub async fn remove_background(&self, image: &[u8]) -> Result<Vec<u8>, ToolError> {
        let envelope = self
            .invoke(
                Capability::RemoveBackground,
                json!({ "image_bytes": BASE64.encode(image) }),
                self.call_timeout,
            )
            .await?;
        decode_image_field(&envelope, "processed_image")
    }

    pub async fn identify_card(&self, image: &[u8]) -> Result<Identification, ToolError> {
        let envelope = self
            .invoke(
                Capability::IdentifyCard,
                json!({ "image_bytes": BASE64.encode(image) }),
                self.call_timeout,
            )
            .await?;
        typed_field(&envelope, "identification")
    }

    /// Grading uses the longer timeout ceiling; it is the slowest capability.
    pub async fn grade_card(&self, image: &[u8]) -> Result<GradeRecord, ToolError> {
        let envelope = self
            .invoke(
                Capability::GradeCard,
                json!({ "image_bytes": BASE64.encode(image) }),
                self.grading_timeout,
            )
            .await?;
        typed_field(&envelope, "grade")
    }

    pub async fn enhance_image(&self, image: &[u8]) -> Result<Vec<u8>, ToolError> {
        let envelope = self
            .invoke(
                Capability::EnhanceImage,
                json!({ "image_bytes": BASE64.encode(image) }),
                self.call_timeout,
            )
            .await?;
        decode_image_field(&envelope, "enhanced_image")
    }

    pub async fn generate_description(
        &self,
        identification: Option<&Identification>,
        grade: Option<&GradeRecord>,
        confidence: f32,
        needs_review: bool,
    ) -> Result<ListingDescription, ToolError> {
        let envelope = self
            .invoke(
                Capability::GenerateDescription,
                json!({
                    "id_result": identification,
                    "grade_result": grade,
                    "confidence": confidence,
                    "needs_review": needs_review,
                }),
                self.call_timeout,
            )
            .await?;
        typed_field(&envelope, "description")
    }
}

/// Orientation report for an image.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct OrientationReport {
    #[serde(default)]
    pub needs_rotation: bool,
    #[serde(default)]
    pub rotation_angle: Option<f32>,
}

fn from_envelope<T: DeserializeOwned>(envelope: &Value) -> Result<T, ToolError> {
    serde_json::from_value(envelope.clone()).map_err(|e| ToolError::Malformed(e.to_string()))
}

fn typed_field<T: DeserializeOwned>(envelope: &Value, field: &str) -> Result<T, ToolError> {
    let value = envelope
        .get(field)
        .ok_or_else(|| ToolError::Malformed(format!("missing field '{}'", field)))?;
    serde_json::from_value(value.clone()).map_err(|e| ToolError::Malformed(e.to_string()))
}

fn decode_image_field(envelope: &Value, field: &str) -> Result<Vec<u8>, ToolError> {
    let encoded = envelope
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::Malformed(format!("missing field '{}'", field)))?;
    BASE64
        .decode(encoded)
        .map_err(|e| ToolError::Malformed(format!("field '{}' is not valid base64: {}", field, e)))
}
