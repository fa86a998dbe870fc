//! Step plan creation.
//!
//! The plan is deterministic: fixed dependency order, enabled flags taken
//! from the caller's capability selections, orientation checking always on.
//! When a remote planner endpoint is configured we ask it for rationale
//! text, but any failure or unparseable answer falls back silently to the
//! default plan; planning problems are never user-visible errors.

use cardlab_common::config::PlannerConfig;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;

use crate::models::{ProcessingOptions, StepDescriptor, StepName, StepPlan};

const REMOTE_PLAN_TIMEOUT: Duration = Duration::from_secs(20);

pub struct ProcessingPlanner {
    http: reqwest::Client,
    remote: Option<PlannerConfig>,
}

/// Shape we ask the remote planner to produce.
#[derive(Debug, Deserialize)]
struct RemotePlan {
    steps: Vec<RemoteStep>,
    #[serde(default)]
    reasoning: String,
}

#[derive(Debug, Deserialize)]
struct RemoteStep {
    name: StepName,
    #[serde(default)]
    rationale: String,
}

impl ProcessingPlanner {
    pub fn new(remote: Option<PlannerConfig>) -> Self {
        Self { http: reqwest::Client::new(), remote }
    }

    /// Build the step plan for a batch.
    pub async fn build_plan(&self, options: &ProcessingOptions, pair_count: usize) -> StepPlan {
        if let Some(config) = &self.remote {
            match self.request_remote_plan(config, options, pair_count).await {
                Ok(remote) => return Self::apply_remote_rationale(options, remote),
                Err(reason) => {
                    tracing::debug!(reason = %reason, "Remote planner unavailable; using default plan");
                }
            }
        }
        Self::default_plan(options)
    }

    /// The deterministic default plan.
    ///
    /// Fixed order: check_orientation → remove_background → identify_card →
    /// grade_card → enhance_image → generate_description. Orientation is a
    /// prerequisite and is enabled regardless of the caller's selections.
    pub fn default_plan(options: &ProcessingOptions) -> StepPlan {
        let descriptor = |name: StepName| StepDescriptor {
            name,
            enabled: Self::step_enabled(name, options),
            rationale: Self::default_rationale(name).to_string(),
        };

        StepPlan {
            steps: StepName::ORDERED.iter().copied().map(descriptor).collect(),
            reasoning: "Process each card step by step for the best results".to_string(),
        }
    }

    fn step_enabled(name: StepName, options: &ProcessingOptions) -> bool {
        match name {
            StepName::CheckOrientation => true,
            StepName::RemoveBackground => options.remove_background,
            StepName::IdentifyCard => options.identify,
            StepName::GradeCard => options.grade,
            StepName::EnhanceImage => options.enhance,
            StepName::GenerateDescription => options.generate_description,
        }
    }

    fn default_rationale(name: StepName) -> &'static str {
        match name {
            StepName::CheckOrientation => "Check if the card needs rotation to portrait",
            StepName::RemoveBackground => "Clean up the card image",
            StepName::IdentifyCard => "Find out what card it is",
            StepName::GradeCard => "Check the card's condition",
            StepName::EnhanceImage => "Make the image look better",
            StepName::GenerateDescription => "Create a listing draft",
        }
    }

    /// Adopt rationale strings from a remote plan while keeping the fixed
    /// order and enable flags authoritative. A remote plan can reword steps;
    /// it cannot reorder them, drop them, or flip what the user selected.
    fn apply_remote_rationale(options: &ProcessingOptions, remote: RemotePlan) -> StepPlan {
        let mut rationales: HashMap<StepName, String> = remote
            .steps
            .into_iter()
            .filter(|s| !s.rationale.is_empty())
            .map(|s| (s.name, s.rationale))
            .collect();

        let mut plan = Self::default_plan(options);
        for step in &mut plan.steps {
            if let Some(rationale) = rationales.remove(&step.name) {
                step.rationale = rationale;
            }
        }
        if !remote.reasoning.is_empty() {
            plan.reasoning = remote.reasoning;
        }
        plan
    }

    /// Ask the configured chat-completions endpoint for a plan.
    async fn request_remote_plan(
        &self,
        config: &PlannerConfig,
        options: &ProcessingOptions,
        pair_count: usize,
    ) -> Result<RemotePlan, String> {
        let prompt = format!(
            "You are planning a trading-card processing batch of {} card pair(s). \
             User selections: {}. Reply with JSON only: \
             {{\"steps\": [{{\"name\": \"<step>\", \"rationale\": \"<short friendly sentence>\"}}], \
             \"reasoning\": \"<one sentence>\"}}. \
             Valid step names: check_orientation, remove_background, identify_card, \
             grade_card, enhance_image, generate_description.",
            pair_count,
            serde_json::to_string(options).unwrap_or_default(),
        );

        let body = json!({
            "model": config.model,
            "messages": [
                { "role": "system", "content": "You write short, friendly processing plans." },
                { "role": "user", "content": prompt },
            ],
            "temperature": 0.3,
        });

        let response = self
            .http
            .post(&config.endpoint)
            .bearer_auth(&config.api_key)
            .timeout(REMOTE_PLAN_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let payload: serde_json::Value = response.json().await.map_err(|e| e.to_string())?;
        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| "response carried no message content".to_string())?;

        serde_json::from_str::<RemotePlan>(content).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_plan_has_fixed_order() {
        let plan = ProcessingPlanner::default_plan(&ProcessingOptions::default());
        let names: Vec<StepName> = plan.steps.iter().map(|s| s.name).collect();
        assert_eq!(names, StepName::ORDERED.to_vec());
    }

    #[test]
    fn orientation_always_enabled() {
        let everything_off = ProcessingOptions {
            remove_background: false,
            identify: false,
            grade: false,
            enhance: false,
            generate_description: false,
        };
        let plan = ProcessingPlanner::default_plan(&everything_off);

        let orientation = &plan.steps[0];
        assert_eq!(orientation.name, StepName::CheckOrientation);
        assert!(orientation.enabled);
        assert!(plan.steps[1..].iter().all(|s| !s.enabled));
    }

    #[test]
    fn enabled_flags_follow_selections() {
        let options = ProcessingOptions {
            remove_background: true,
            identify: false,
            grade: true,
            enhance: true,
            generate_description: false,
        };
        let plan = ProcessingPlanner::default_plan(&options);
        let enabled: Vec<StepName> =
            plan.steps.iter().filter(|s| s.enabled).map(|s| s.name).collect();
        assert_eq!(
            enabled,
            vec![
                StepName::CheckOrientation,
                StepName::RemoveBackground,
                StepName::GradeCard,
                StepName::EnhanceImage,
            ]
        );
    }

    #[test]
    fn remote_rationale_cannot_flip_flags_or_order() {
        let options = ProcessingOptions {
            remove_background: false,
            ..ProcessingOptions::default()
        };
        let remote = RemotePlan {
            steps: vec![
                RemoteStep {
                    name: StepName::RemoveBackground,
                    rationale: "Strip the background away".to_string(),
                },
                RemoteStep {
                    name: StepName::IdentifyCard,
                    rationale: "Work out which card this is".to_string(),
                },
            ],
            reasoning: "A friendlier plan".to_string(),
        };

        let plan = ProcessingPlanner::apply_remote_rationale(&options, remote);

        let names: Vec<StepName> = plan.steps.iter().map(|s| s.name).collect();
        assert_eq!(names, StepName::ORDERED.to_vec());
        // Disabled stays disabled even though the remote mentioned it
        assert!(!plan.steps[1].enabled);
        assert_eq!(plan.steps[1].rationale, "Strip the background away");
        assert_eq!(plan.steps[2].rationale, "Work out which card this is");
        assert_eq!(plan.reasoning, "A friendlier plan");
    }

    #[tokio::test]
    async fn no_remote_config_means_default_plan() {
        let planner = ProcessingPlanner::new(None);
        let plan = planner.build_plan(&ProcessingOptions::default(), 3).await;
        assert_eq!(plan.steps.len(), 6);
        assert!(plan.steps[0].enabled);
    }

    #[tokio::test]
    async fn unreachable_remote_falls_back_silently() {
        let planner = ProcessingPlanner::new(Some(PlannerConfig {
            endpoint: "http://127.0.0.1:1/never".to_string(),
            api_key: "key".to_string(),
            model: "test".to_string(),
        }));
        let plan = planner.build_plan(&ProcessingOptions::default(), 1).await;
        // Identical to the default plan
        assert_eq!(plan.steps.len(), 6);
        assert_eq!(plan.steps[0].name, StepName::CheckOrientation);
        assert_eq!(plan.reasoning, "Process each card step by step for the best results");
    }
}
