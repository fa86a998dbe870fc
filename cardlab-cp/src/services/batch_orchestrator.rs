//! Batch orchestrator: drives a whole session from plan to summary.
//!
//! Pairs run strictly one at a time, in submission order. A failing pair
//! never aborts the batch; its errors land in its own record and the next
//! pair starts fresh. Stop requests are honored at pair boundaries and at
//! step boundaries inside the side processors, never mid-call.

use cardlab_common::events::StepKind;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::models::{BatchOutcome, BatchSummary, CardPair, PairResult, ProcessingOptions};
use crate::services::narrator::Narrator;
use crate::services::pair_processor::PairCoordinator;
use crate::services::planner::ProcessingPlanner;
use crate::services::tool_client::ToolSuite;
use crate::session::{SessionRegistry, SessionStatus};

#[derive(Clone)]
pub struct BatchOrchestrator {
    tools: Arc<ToolSuite>,
    narrator: Narrator,
    planner: Arc<ProcessingPlanner>,
    sessions: SessionRegistry,
    confidence_threshold: f32,
}

impl BatchOrchestrator {
    pub fn new(
        tools: Arc<ToolSuite>,
        narrator: Narrator,
        planner: Arc<ProcessingPlanner>,
        sessions: SessionRegistry,
        confidence_threshold: f32,
    ) -> Self {
        Self { tools, narrator, planner, sessions, confidence_threshold }
    }

    /// Run a batch to completion (or until a stop request lands), then mark
    /// the session terminal with the outcome. The outcome always carries a
    /// summary of whatever pairs were processed, stopped or not.
    pub async fn run_batch(
        &self,
        session_id: Uuid,
        pairs: Vec<CardPair>,
        options: ProcessingOptions,
        cancel: CancellationToken,
    ) -> BatchOutcome {
        let total = pairs.len();
        self.sessions.set_status(session_id, SessionStatus::Processing).await;

        tracing::info!(session_id = %session_id, pairs = total, "Starting batch");
        self.narrator
            .narrate(
                session_id,
                StepKind::Start,
                format!(
                    "Hello! I've received {} card pair(s). Let me have a look at what we're working with.",
                    total
                ),
            )
            .await;

        let plan = self.planner.build_plan(&options, total).await;
        self.narrator
            .narrate(
                session_id,
                StepKind::Planning,
                format!("Here's my plan: {}", plan.reasoning),
            )
            .await;

        let coordinator = PairCoordinator::new(&self.tools, &self.narrator, self.confidence_threshold);
        let mut results: Vec<PairResult> = Vec::with_capacity(total);

        for (index, pair) in pairs.iter().enumerate() {
            if cancel.is_cancelled() {
                self.narrator
                    .narrate(
                        session_id,
                        StepKind::Step,
                        format!(
                            "Stop requested; wrapping up after {} of {} pair(s).",
                            results.len(),
                            total
                        ),
                    )
                    .await;
                break;
            }

            self.narrator
                .narrate(
                    session_id,
                    StepKind::Processing,
                    format!("Working on card pair {} of {}.", index + 1, total),
                )
                .await;

            let result = coordinator
                .process_pair(session_id, index, pair, &plan, cancel.clone())
                .await;

            if result.is_clean() {
                tracing::debug!(session_id = %session_id, pair = index, "Pair finished cleanly");
            } else {
                tracing::warn!(
                    session_id = %session_id,
                    pair = index,
                    errors = result.errors.len(),
                    "Pair finished with errors"
                );
            }
            results.push(result);

            if index + 1 < total && !cancel.is_cancelled() {
                self.narrator
                    .narrate(
                        session_id,
                        StepKind::Success,
                        format!("Card pair {} done! Moving on to the next one.", index + 1),
                    )
                    .await;
            }
        }

        let summary = BatchSummary::from_results(&results);
        let outcome = BatchOutcome { results, summary, plan };

        let stopped = cancel.is_cancelled();
        let status = if stopped { SessionStatus::Stopped } else { SessionStatus::Completed };
        self.sessions.finish(session_id, status, outcome.clone()).await;

        self.narrator
            .narrate(
                session_id,
                StepKind::Complete,
                format!(
                    "All done! {} of {} card pair(s) processed successfully{}.",
                    outcome.summary.successful,
                    outcome.summary.total_cards,
                    if stopped { " (stopped early)" } else { "" }
                ),
            )
            .await;

        tracing::info!(
            session_id = %session_id,
            successful = outcome.summary.successful,
            failed = outcome.summary.failed,
            stopped,
            "Batch finished"
        );
        outcome
    }
}
