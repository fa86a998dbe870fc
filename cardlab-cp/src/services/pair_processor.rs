//! Pair coordinator: runs the front side, then the back side, and merges
//! the two into a single pair record.

use cardlab_common::events::{CardSide, StepKind};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::models::{CardPair, GradeRecord, PairResult, SideResult, StepPlan};
use crate::services::card_processor::SideProcessor;
use crate::services::narrator::Narrator;
use crate::services::tool_client::ToolSuite;

pub struct PairCoordinator<'a> {
    tools: &'a ToolSuite,
    narrator: &'a Narrator,
    confidence_threshold: f32,
}

impl<'a> PairCoordinator<'a> {
    pub fn new(tools: &'a ToolSuite, narrator: &'a Narrator, confidence_threshold: f32) -> Self {
        Self { tools, narrator, confidence_threshold }
    }

    /// Process one card pair. Both images must be present; a missing side is
    /// fatal for the pair and no capability is invoked for it. The front runs
    /// to completion before the back starts, so identification and grading
    /// narration arrives in a predictable order.
    pub async fn process_pair(
        &self,
        session_id: Uuid,
        pair_index: usize,
        pair: &CardPair,
        plan: &StepPlan,
        cancel: CancellationToken,
    ) -> PairResult {
        let front_image = match pair.front() {
            Some(image) => image.to_vec(),
            None => {
                let message = "No front image data provided";
                self.narrator
                    .narrate(
                        session_id,
                        StepKind::Error,
                        format!("Card pair {}: {}", pair_index + 1, message),
                    )
                    .await;
                return PairResult::fatal(pair_index, message);
            }
        };
        let back_image = match pair.back() {
            Some(image) => image.to_vec(),
            None => {
                let message = "No back image data provided";
                self.narrator
                    .narrate(
                        session_id,
                        StepKind::Error,
                        format!("Card pair {}: {}", pair_index + 1, message),
                    )
                    .await;
                return PairResult::fatal(pair_index, message);
            }
        };

        let front = SideProcessor::new(
            self.tools,
            self.narrator,
            session_id,
            pair_index,
            CardSide::Front,
            self.confidence_threshold,
            cancel.clone(),
        )
        .process(front_image, plan, true)
        .await;

        let back = SideProcessor::new(
            self.tools,
            self.narrator,
            session_id,
            pair_index,
            CardSide::Back,
            self.confidence_threshold,
            cancel,
        )
        .process(back_image, plan, false)
        .await;

        merge_pair_results(pair_index, front, back)
    }
}

/// Merge the two side results into the pair record.
///
/// Completed steps and errors carry `front_`/`back_` prefixes so batch
/// tallies can distinguish sides. Identification and the listing description
/// come from the front; the grade is the averaged combination of both sides.
pub fn merge_pair_results(pair_index: usize, front: SideResult, back: SideResult) -> PairResult {
    let mut steps_completed = Vec::with_capacity(
        front.steps_completed.len() + back.steps_completed.len(),
    );
    steps_completed.extend(front.steps_completed.iter().map(|s| format!("front_{}", s)));
    steps_completed.extend(back.steps_completed.iter().map(|s| format!("back_{}", s)));

    let mut errors = Vec::with_capacity(front.errors.len() + back.errors.len());
    errors.extend(front.errors.iter().map(|e| format!("front_{}", e)));
    errors.extend(back.errors.iter().map(|e| format!("back_{}", e)));

    let grade = combine_grades(front.outputs.grade.clone(), back.outputs.grade.clone());
    let identification = front.outputs.identification.clone();
    let listing_description = front.outputs.listing_description.clone();

    PairResult {
        pair_index,
        steps_completed,
        front: front.outputs,
        back: back.outputs,
        identification,
        grade,
        listing_description,
        errors,
    }
}

/// Combine two side grades into one pair grade.
///
/// Each numeric sub-score is averaged when both sides carry it, otherwise
/// the present side's value passes through unchanged. The condition label
/// and the analysis image URL prefer the front side. One-sided grades are
/// returned as-is.
pub fn combine_grades(
    front: Option<GradeRecord>,
    back: Option<GradeRecord>,
) -> Option<GradeRecord> {
    match (front, back) {
        (Some(front), Some(back)) => Some(GradeRecord {
            corners: average(front.corners, back.corners),
            edges: average(front.edges, back.edges),
            surface: average(front.surface, back.surface),
            centering: average(front.centering, back.centering),
            final_grade: average(front.final_grade, back.final_grade),
            condition: front.condition.or(back.condition),
            analysis_image_url: front.analysis_image_url.or(back.analysis_image_url),
        }),
        (only, None) => only,
        (None, only) => only,
    }
}

fn average(a: Option<f32>, b: Option<f32>) -> Option<f32> {
    match (a, b) {
        (Some(a), Some(b)) => Some((a + b) / 2.0),
        (one, None) => one,
        (None, one) => one,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CardMatch, Identification, SideOutputs};

    fn grade(
        corners: Option<f32>,
        edges: Option<f32>,
        surface: Option<f32>,
        centering: Option<f32>,
        final_grade: Option<f32>,
    ) -> GradeRecord {
        GradeRecord { corners, edges, surface, centering, final_grade, ..Default::default() }
    }

    #[test]
    fn combined_grade_averages_each_subscore() {
        let front = grade(Some(8.0), Some(9.0), Some(8.0), Some(9.0), Some(8.5));
        let back = grade(Some(6.0), Some(7.0), Some(6.0), Some(7.0), Some(6.5));

        let combined = combine_grades(Some(front), Some(back)).unwrap();
        assert_eq!(combined.corners, Some(7.0));
        assert_eq!(combined.edges, Some(8.0));
        assert_eq!(combined.surface, Some(7.0));
        assert_eq!(combined.centering, Some(8.0));
        assert_eq!(combined.final_grade, Some(7.5));
    }

    #[test]
    fn one_sided_grade_passes_through_unchanged() {
        let back = grade(Some(6.0), None, Some(7.0), None, Some(6.5));
        let combined = combine_grades(None, Some(back)).unwrap();
        assert_eq!(combined.corners, Some(6.0));
        assert_eq!(combined.edges, None);
        assert_eq!(combined.final_grade, Some(6.5));

        assert!(combine_grades(None, None).is_none());
    }

    #[test]
    fn missing_subscore_on_one_side_uses_the_other() {
        let front = grade(Some(8.0), None, None, Some(9.0), None);
        let back = grade(Some(6.0), Some(7.0), None, None, None);

        let combined = combine_grades(Some(front), Some(back)).unwrap();
        assert_eq!(combined.corners, Some(7.0));
        assert_eq!(combined.edges, Some(7.0));
        assert_eq!(combined.surface, None);
        assert_eq!(combined.centering, Some(9.0));
    }

    #[test]
    fn condition_and_analysis_url_prefer_front() {
        let front = GradeRecord {
            condition: Some("Near Mint".into()),
            analysis_image_url: Some("http://grader/front.png".into()),
            ..Default::default()
        };
        let back = GradeRecord {
            condition: Some("Played".into()),
            analysis_image_url: Some("http://grader/back.png".into()),
            ..Default::default()
        };

        let combined = combine_grades(Some(front), Some(back)).unwrap();
        assert_eq!(combined.condition.as_deref(), Some("Near Mint"));
        assert_eq!(combined.analysis_image_url.as_deref(), Some("http://grader/front.png"));
    }

    #[test]
    fn errors_carry_side_prefixes() {
        let front = SideResult {
            errors: vec!["rotate_image failed: boom".into()],
            ..Default::default()
        };
        let back = SideResult {
            errors: vec!["grade_card failed: tool call timed out after 180s".into()],
            ..Default::default()
        };

        let merged = merge_pair_results(0, front, back);
        assert_eq!(
            merged.errors,
            vec![
                "front_rotate_image failed: boom",
                "back_grade_card failed: tool call timed out after 180s",
            ]
        );
    }

    #[test]
    fn merge_prefixes_steps_and_takes_front_identification() {
        let front = SideResult {
            steps_completed: vec!["background_removed".into(), "identified".into()],
            outputs: SideOutputs {
                identification: Some(Identification {
                    best: Some(CardMatch {
                        name: "Charizard".into(),
                        set_name: None,
                        number: None,
                    }),
                    confidence: 0.95,
                }),
                ..Default::default()
            },
            errors: Vec::new(),
        };
        let back = SideResult {
            steps_completed: vec!["background_removed".into()],
            outputs: SideOutputs::default(),
            errors: vec!["grade_card failed: boom".into()],
        };

        let merged = merge_pair_results(3, front, back);
        assert_eq!(
            merged.steps_completed,
            vec!["front_background_removed", "front_identified", "back_background_removed"]
        );
        assert_eq!(merged.errors, vec!["back_grade_card failed: boom"]);
        assert_eq!(merged.identification.as_ref().unwrap().display_name(), "Charizard");
        assert_eq!(merged.pair_index, 3);
        assert!(!merged.is_clean());
    }
}
