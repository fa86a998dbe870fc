//! Shared test helpers: scripted tool invokers and app state construction.

#![allow(dead_code)]

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use cardlab_common::config::CardLabConfig;
use cardlab_cp::services::tool_client::{Capability, ToolError, ToolInvoker, ToolSuite};
use cardlab_cp::AppState;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Per-capability behavior override for the scripted invoker.
pub enum Behavior {
    /// Return this envelope verbatim
    Envelope(Value),
    /// Return a failure envelope carrying this error message
    Fail(String),
    /// Never answer; the caller's timeout fires
    Stall,
}

/// Tool invoker with plausible default answers, per-capability overrides,
/// and a journal of every capability invoked.
pub struct ScriptedInvoker {
    calls: Mutex<Vec<Capability>>,
    behaviors: Mutex<HashMap<&'static str, Behavior>>,
}

impl ScriptedInvoker {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            behaviors: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_behavior(self, capability: Capability, behavior: Behavior) -> Self {
        self.behaviors.lock().unwrap().insert(capability.as_str(), behavior);
        self
    }

    /// Capabilities invoked so far, in call order.
    pub fn calls(&self) -> Vec<Capability> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, capability: Capability) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == capability).count()
    }

    fn default_envelope(capability: Capability) -> Value {
        match capability {
            Capability::CheckOrientation => json!({ "success": true, "needs_rotation": false }),
            Capability::RotateImage => {
                json!({ "success": true, "rotated_image": BASE64.encode(b"rotated") })
            }
            Capability::RemoveBackground => {
                json!({ "success": true, "processed_image": BASE64.encode(b"clean") })
            }
            Capability::IdentifyCard => json!({
                "success": true,
                "identification": {
                    "best": { "name": "Charizard", "set_name": "Base Set", "number": "4/102" },
                    "confidence": 0.95,
                },
            }),
            Capability::GradeCard => json!({
                "success": true,
                "grade": {
                    "corners": 8.0,
                    "edges": 8.5,
                    "surface": 9.0,
                    "centering": 8.0,
                    "final": 8.5,
                    "condition": "Near Mint",
                },
            }),
            Capability::EnhanceImage => {
                json!({ "success": true, "enhanced_image": BASE64.encode(b"shiny") })
            }
            Capability::GenerateDescription => json!({
                "success": true,
                "description": {
                    "title": "Charizard - Base Set",
                    "description": "A classic card in lovely shape.",
                },
            }),
        }
    }
}

#[async_trait]
impl ToolInvoker for ScriptedInvoker {
    async fn call(&self, capability: Capability, _params: Value) -> Result<Value, ToolError> {
        self.calls.lock().unwrap().push(capability);

        let scripted = {
            let behaviors = self.behaviors.lock().unwrap();
            match behaviors.get(capability.as_str()) {
                Some(Behavior::Envelope(envelope)) => Some(envelope.clone()),
                Some(Behavior::Fail(message)) => {
                    Some(json!({ "success": false, "error": message }))
                }
                Some(Behavior::Stall) => None,
                None => Some(Self::default_envelope(capability)),
            }
        };

        match scripted {
            Some(envelope) => Ok(envelope),
            None => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(json!({ "success": true }))
            }
        }
    }
}

/// App state wired to the given invoker with short, test-friendly timeouts.
pub fn test_state(invoker: Arc<ScriptedInvoker>) -> AppState {
    test_state_with_timeouts(invoker, Duration::from_secs(5), Duration::from_secs(5))
}

pub fn test_state_with_timeouts(
    invoker: Arc<ScriptedInvoker>,
    call_timeout: Duration,
    grading_timeout: Duration,
) -> AppState {
    let tools = Arc::new(ToolSuite::with_timeouts(invoker, call_timeout, grading_timeout));
    AppState::new(CardLabConfig::default(), tools)
}

/// JSON body for a start request with `count` identical valid pairs.
pub fn start_body(count: usize) -> Value {
    let pair = json!({
        "front_image": BASE64.encode(b"front image bytes"),
        "back_image": BASE64.encode(b"back image bytes"),
    });
    json!({ "pairs": vec![pair; count] })
}

pub fn encode(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}
