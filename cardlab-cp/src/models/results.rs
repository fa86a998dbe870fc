//! Result types accumulated by the pipeline.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Best-match card from the identification capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardMatch {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
}

/// Identification record returned for a front image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best: Option<CardMatch>,
    #[serde(default)]
    pub confidence: f32,
}

impl Identification {
    /// Display name for narration; "Unknown" when no match came back.
    pub fn display_name(&self) -> &str {
        self.best.as_ref().map(|m| m.name.as_str()).unwrap_or("Unknown")
    }

    /// Low-confidence or absent matches require human follow-up.
    pub fn needs_review(&self, threshold: f32) -> bool {
        self.best.is_none() || self.confidence < threshold
    }
}

/// Condition grade for one side, or the combined pair grade.
///
/// Sub-scores are optional: the grading capability omits scores it could not
/// assess, and the combination rule propagates whichever side has a value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GradeRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corners: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edges: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surface: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub centering: Option<f32>,
    #[serde(rename = "final", default, skip_serializing_if = "Option::is_none")]
    pub final_grade: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_image_url: Option<String>,
}

/// Listing title and body from the description capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingDescription {
    pub title: String,
    pub description: String,
}

/// Artifacts produced while processing one side.
///
/// Image artifacts stay transport-encoded; clients consume them directly as
/// previews and the engine re-decodes only when feeding a dependent step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SideOutputs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orientation_corrected: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_removed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identification: Option<Identification>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<GradeRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enhanced: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listing_description: Option<ListingDescription>,
}

/// Per-side accumulator, finalized once the step plan is exhausted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SideResult {
    pub steps_completed: Vec<String>,
    pub outputs: SideOutputs,
    pub errors: Vec<String>,
}

/// Merged result for one card pair. Derived deterministically from the two
/// side results; never mutated after derivation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairResult {
    pub pair_index: usize,
    /// Completed steps from both sides, `front_`/`back_` prefixed
    pub steps_completed: Vec<String>,
    pub front: SideOutputs,
    pub back: SideOutputs,
    /// Always sourced from the front side
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identification: Option<Identification>,
    /// Combined per the grade averaging rule
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<GradeRecord>,
    /// Always sourced from the front side
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listing_description: Option<ListingDescription>,
    pub errors: Vec<String>,
}

impl PairResult {
    /// Fatal per-pair result: no side was processed at all.
    pub fn fatal(pair_index: usize, error: impl Into<String>) -> Self {
        Self {
            pair_index,
            steps_completed: Vec::new(),
            front: SideOutputs::default(),
            back: SideOutputs::default(),
            identification: None,
            grade: None,
            listing_description: None,
            errors: vec![error.into()],
        }
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Batch-level tallies, computed once after all pairs finish.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total_cards: usize,
    pub successful: usize,
    pub failed: usize,
    pub success_rate: String,
    /// How many pairs completed each named (prefixed) step
    pub steps_completed: HashMap<String, usize>,
    pub ready_count: usize,
    pub needs_review_count: usize,
}

impl BatchSummary {
    pub fn from_results(results: &[PairResult]) -> Self {
        let total_cards = results.len();
        let successful = results.iter().filter(|r| r.is_clean()).count();
        let failed = total_cards - successful;

        let success_rate = if total_cards > 0 {
            format!("{:.1}%", (successful as f64 / total_cards as f64) * 100.0)
        } else {
            "0%".to_string()
        };

        let mut steps_completed: HashMap<String, usize> = HashMap::new();
        for result in results {
            for step in &result.steps_completed {
                *steps_completed.entry(step.clone()).or_insert(0) += 1;
            }
        }

        Self {
            total_cards,
            successful,
            failed,
            success_rate,
            steps_completed,
            ready_count: successful,
            needs_review_count: failed,
        }
    }
}

/// Terminal result bundle for a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub results: Vec<PairResult>,
    pub summary: BatchSummary,
    pub plan: super::StepPlan,
}
