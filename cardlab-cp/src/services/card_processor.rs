//! Single-side processor: runs the step plan against one image.
//!
//! The working image buffer threads through dependent steps (rotate →
//! remove background → enhance); grading deliberately ignores the working
//! buffer and uses the original image, because background removal discards
//! frame context the grader needs. Every step failure is recorded locally
//! and narrated; the remaining plan always runs, since later steps can
//! succeed independently.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use cardlab_common::events::{CardSide, IdentificationHint, StepKind};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::models::{SideResult, StepName, StepPlan};
use crate::services::narrator::Narrator;
use crate::services::tool_client::ToolSuite;

pub struct SideProcessor<'a> {
    tools: &'a ToolSuite,
    narrator: &'a Narrator,
    session_id: Uuid,
    pair_index: usize,
    side: CardSide,
    confidence_threshold: f32,
    cancel: CancellationToken,
}

impl<'a> SideProcessor<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tools: &'a ToolSuite,
        narrator: &'a Narrator,
        session_id: Uuid,
        pair_index: usize,
        side: CardSide,
        confidence_threshold: f32,
        cancel: CancellationToken,
    ) -> Self {
        Self { tools, narrator, session_id, pair_index, side, confidence_threshold, cancel }
    }

    /// Execute the plan against one image, in plan order, skipping disabled
    /// steps. Stop requests are observed between steps.
    pub async fn process(
        &self,
        image: Vec<u8>,
        plan: &StepPlan,
        should_identify: bool,
    ) -> SideResult {
        let mut result = SideResult::default();
        let original = image.clone();
        let mut working = image;

        for step in &plan.steps {
            if !step.enabled {
                continue;
            }
            if self.cancel.is_cancelled() {
                self.narrate(StepKind::Step, "Stop requested; skipping the remaining steps.")
                    .await;
                break;
            }

            match step.name {
                StepName::CheckOrientation => {
                    self.run_orientation(&mut working, &mut result).await
                }
                StepName::RemoveBackground => {
                    self.run_background_removal(&mut working, &mut result).await
                }
                StepName::IdentifyCard => {
                    self.run_identification(&working, &mut result, should_identify).await
                }
                StepName::GradeCard => self.run_grading(&original, &mut result).await,
                StepName::EnhanceImage => self.run_enhancement(&mut working, &mut result).await,
                StepName::GenerateDescription => self.run_description(&mut result).await,
            }
        }

        result
    }

    fn label(&self) -> String {
        format!("Card pair {} ({})", self.pair_index + 1, self.side)
    }

    async fn narrate(&self, kind: StepKind, message: impl std::fmt::Display) {
        self.narrator
            .narrate(self.session_id, kind, format!("{}: {}", self.label(), message))
            .await;
    }

    /// Record a step-qualified error without aborting the remaining plan.
    async fn record_error(&self, result: &mut SideResult, message: String) {
        self.narrate(StepKind::Error, &message).await;
        result.errors.push(message);
    }

    /// Orientation check with a bounded single rotation attempt. A second
    /// need-for-rotation after one correction would not be retried; we do not
    /// re-check after rotating, which keeps rotation loops impossible.
    async fn run_orientation(&self, working: &mut Vec<u8>, result: &mut SideResult) {
        self.narrate(StepKind::Step, "Checking whether the card is properly oriented...").await;

        let report = match self.tools.check_orientation(working).await {
            Ok(report) => report,
            Err(e) => {
                self.record_error(result, format!("check_orientation failed: {}", e)).await;
                return;
            }
        };

        if !report.needs_rotation {
            result.steps_completed.push("orientation_verified".to_string());
            self.narrate(StepKind::Success, "Already in the right position.").await;
            return;
        }

        self.narrate(StepKind::Step, "This one needs a turn; rotating it now.").await;
        let angle = report.rotation_angle.unwrap_or(-90.0);
        match self.tools.rotate_image(working, angle).await {
            Ok(rotated) => {
                let encoded = BASE64.encode(&rotated);
                *working = rotated;
                result.outputs.orientation_corrected = Some(encoded.clone());
                result.steps_completed.push("orientation_corrected".to_string());
                self.narrate(StepKind::Success, "Rotated into place.").await;
                self.narrator
                    .narrate_preview(
                        self.session_id,
                        format!("{}: Here is the corrected view.", self.label()),
                        self.pair_index,
                        self.side,
                        "orientation_corrected",
                        encoded,
                    )
                    .await;
            }
            Err(e) => {
                self.record_error(result, format!("rotate_image failed: {}", e)).await;
                self.narrate(StepKind::Step, "Proceeding with the image as it is.").await;
            }
        }
    }

    async fn run_background_removal(&self, working: &mut Vec<u8>, result: &mut SideResult) {
        if working.is_empty() {
            self.record_error(result, "remove_background failed: no image data".to_string())
                .await;
            return;
        }

        self.narrate(StepKind::Step, "Removing the background for a clearer view...").await;
        self.spawn_chatter(&[
            (2, "Still working on that background... almost there!"),
            (5, "Background removal is taking a moment, but we're making progress."),
        ]);

        match self.tools.remove_background(working).await {
            Ok(processed) => {
                let encoded = BASE64.encode(&processed);
                *working = processed;
                result.outputs.background_removed = Some(encoded.clone());
                result.steps_completed.push("background_removed".to_string());
                self.narrate(StepKind::Success, "Background removed; much clearer now.").await;
                self.narrator
                    .narrate_preview(
                        self.session_id,
                        format!("{}: The card without distractions.", self.label()),
                        self.pair_index,
                        self.side,
                        "background_removed",
                        encoded,
                    )
                    .await;
            }
            Err(e) => {
                self.record_error(result, format!("remove_background failed: {}", e)).await;
            }
        }
    }

    /// Identification runs on the current working buffer. Backs are skipped
    /// entirely (no tool call, no error): card backs are visually uniform and
    /// identifying them is wasted work.
    async fn run_identification(
        &self,
        working: &[u8],
        result: &mut SideResult,
        should_identify: bool,
    ) {
        if !should_identify {
            self.narrate(
                StepKind::Step,
                "All card backs look the same; no identification needed here.",
            )
            .await;
            return;
        }
        if working.is_empty() {
            self.record_error(result, "identify_card failed: no image data".to_string()).await;
            return;
        }

        self.narrate(StepKind::Step, "Now the exciting part - working out which card this is!")
            .await;
        self.spawn_chatter(&[
            (2, "Searching the reference library... so many cards to check!"),
            (5, "Still narrowing it down; I want to get this right."),
        ]);

        match self.tools.identify_card(working).await {
            Ok(identification) => {
                let card_name = identification.display_name().to_string();
                result.outputs.identification = Some(identification);
                result.steps_completed.push("identified".to_string());
                self.narrator
                    .narrate_with(
                        self.session_id,
                        StepKind::Success,
                        format!("{}: I believe this is a {}!", self.label(), card_name),
                        None,
                        Some(IdentificationHint { pair_index: self.pair_index, card_name }),
                    )
                    .await;
            }
            Err(e) => {
                self.record_error(result, format!("identify_card failed: {}", e)).await;
            }
        }
    }

    /// Grading always takes the original, pre-background-removal image: the
    /// grader needs the full frame that background removal may have cut away.
    async fn run_grading(&self, original: &[u8], result: &mut SideResult) {
        if original.is_empty() {
            self.record_error(result, "grade_card failed: no image data".to_string()).await;
            return;
        }

        self.narrate(
            StepKind::Step,
            "Assessing condition - corners, edges, surface and centering...",
        )
        .await;
        self.spawn_chatter(&[
            (3, "Condition checks take a moment to do thoroughly; checking every corner."),
            (8, "Almost done with the assessment - fine details now."),
        ]);

        match self.tools.grade_card(original).await {
            Ok(grade) => {
                let has_analysis = grade.analysis_image_url.is_some();
                result.outputs.grade = Some(grade);
                result.steps_completed.push("graded".to_string());
                self.narrate(StepKind::Success, "Condition assessment complete.").await;
                if has_analysis {
                    self.narrate(
                        StepKind::Success,
                        "A detailed grading analysis image is available.",
                    )
                    .await;
                }
            }
            Err(e) => {
                self.record_error(result, format!("grade_card failed: {}", e)).await;
            }
        }
    }

    /// Cosmetic enhancement only matters for the side that gets listed.
    async fn run_enhancement(&self, working: &mut Vec<u8>, result: &mut SideResult) {
        if self.side == CardSide::Back {
            self.narrate(StepKind::Step, "Skipping enhancement for the back image.").await;
            return;
        }
        if working.is_empty() {
            self.record_error(result, "enhance_image failed: no image data".to_string()).await;
            return;
        }

        self.narrate(StepKind::Step, "Polishing the image quality...").await;
        match self.tools.enhance_image(working).await {
            Ok(enhanced) => {
                let encoded = BASE64.encode(&enhanced);
                *working = enhanced;
                result.outputs.enhanced = Some(encoded.clone());
                result.steps_completed.push("enhanced".to_string());
                self.narrate(StepKind::Success, "Image enhanced.").await;
                self.narrator
                    .narrate_preview(
                        self.session_id,
                        format!("{}: The polished result.", self.label()),
                        self.pair_index,
                        self.side,
                        "enhanced",
                        encoded,
                    )
                    .await;
            }
            Err(e) => {
                self.record_error(result, format!("enhance_image failed: {}", e)).await;
            }
        }
    }

    /// Description generation is front-only and consumes whatever
    /// identification and grade data this side accumulated - possibly none.
    /// A low-confidence or absent identification sets the needs-review flag
    /// the description capability is expected to surface.
    async fn run_description(&self, result: &mut SideResult) {
        if self.side != CardSide::Front {
            self.narrate(
                StepKind::Step,
                "Skipping description generation; the front side covers the listing.",
            )
            .await;
            return;
        }

        let identification = result.outputs.identification.clone();
        let grade = result.outputs.grade.clone();
        let confidence = identification.as_ref().map(|i| i.confidence).unwrap_or(0.0);
        let needs_review = identification
            .as_ref()
            .map(|i| i.needs_review(self.confidence_threshold))
            .unwrap_or(true);

        self.narrate(StepKind::Step, "Writing a listing description...").await;
        match self
            .tools
            .generate_description(identification.as_ref(), grade.as_ref(), confidence, needs_review)
            .await
        {
            Ok(description) => {
                result.outputs.listing_description = Some(description);
                result.steps_completed.push("description_generated".to_string());
                self.narrate(StepKind::Success, "Your listing description is ready!").await;
            }
            Err(e) => {
                self.record_error(result, format!("generate_description failed: {}", e)).await;
            }
        }
    }

    fn spawn_chatter(&self, messages: &[(u64, &str)]) {
        let label = self.label();
        self.narrator.spawn_progress_chatter(
            self.session_id,
            messages
                .iter()
                .map(|(secs, text)| {
                    (Duration::from_secs(*secs), format!("{}: {}", label, text))
                })
                .collect(),
        );
    }
}
