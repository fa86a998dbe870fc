//! Step plan types.
//!
//! A plan is built once per batch and shared read-only by every side
//! processor invocation within that batch.

use serde::{Deserialize, Serialize};

/// Named pipeline step, in fixed dependency order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    CheckOrientation,
    RemoveBackground,
    IdentifyCard,
    GradeCard,
    EnhanceImage,
    GenerateDescription,
}

impl StepName {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepName::CheckOrientation => "check_orientation",
            StepName::RemoveBackground => "remove_background",
            StepName::IdentifyCard => "identify_card",
            StepName::GradeCard => "grade_card",
            StepName::EnhanceImage => "enhance_image",
            StepName::GenerateDescription => "generate_description",
        }
    }

    /// All steps in dependency order.
    pub const ORDERED: [StepName; 6] = [
        StepName::CheckOrientation,
        StepName::RemoveBackground,
        StepName::IdentifyCard,
        StepName::GradeCard,
        StepName::EnhanceImage,
        StepName::GenerateDescription,
    ];
}

impl std::fmt::Display for StepName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step in a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDescriptor {
    pub name: StepName,
    pub enabled: bool,
    pub rationale: String,
}

/// Ordered, enable-flagged sequence of steps to run per side.
/// Immutable once built for a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepPlan {
    pub steps: Vec<StepDescriptor>,
    pub reasoning: String,
}

impl StepPlan {
    /// Human-readable list of enabled step names, for narration.
    pub fn enabled_names(&self) -> Vec<&'static str> {
        self.steps
            .iter()
            .filter(|s| s.enabled)
            .map(|s| s.name.as_str())
            .collect()
    }
}
