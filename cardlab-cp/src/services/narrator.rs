//! Narrator: converts pipeline state changes into the session's event log.
//!
//! All writes to a session's log route through here. Narration is
//! fire-and-forget: it appends to the log, mirrors the event onto the
//! EventBus for live SSE delivery, and returns. It never fails the pipeline;
//! narrating into an unknown or torn-down session is a no-op.

use cardlab_common::events::{
    CardSide, EventBus, IdentificationHint, ImagePreview, SessionEvent, StepKind,
};
use std::time::Duration;
use uuid::Uuid;

use crate::session::SessionRegistry;

#[derive(Clone)]
pub struct Narrator {
    sessions: SessionRegistry,
    bus: EventBus,
}

impl Narrator {
    pub fn new(sessions: SessionRegistry, bus: EventBus) -> Self {
        Self { sessions, bus }
    }

    /// Append one narrated event with no metadata.
    pub async fn narrate(&self, session_id: Uuid, kind: StepKind, message: impl Into<String>) {
        self.narrate_with(session_id, kind, message, None, None).await;
    }

    /// Append one narrated event, optionally carrying an image preview or a
    /// structured identification hint.
    pub async fn narrate_with(
        &self,
        session_id: Uuid,
        kind: StepKind,
        message: impl Into<String>,
        image_preview: Option<ImagePreview>,
        identification_hint: Option<IdentificationHint>,
    ) {
        let message = message.into();
        tracing::debug!(session_id = %session_id, kind = kind.as_str(), "{}", message);

        let appended = self
            .sessions
            .append(session_id, kind, message, image_preview, identification_hint)
            .await;

        if let Some(event) = appended {
            self.bus.emit(SessionEvent { session_id, event });
        }
    }

    /// Convenience: narrate an image preview produced by a step.
    pub async fn narrate_preview(
        &self,
        session_id: Uuid,
        message: impl Into<String>,
        pair_index: usize,
        side: CardSide,
        artifact_kind: &str,
        image_base64: String,
    ) {
        self.narrate_with(
            session_id,
            StepKind::Step,
            message,
            Some(ImagePreview {
                pair_index,
                side,
                artifact_kind: artifact_kind.to_string(),
                image_base64,
            }),
            None,
        )
        .await;
    }

    /// Spawn detached "still working" chatter for a long-running step.
    ///
    /// Each entry fires after its delay (measured from spawn) unless the
    /// session has ended, in which case the append is a no-op. These timers
    /// carry no ordering guarantee relative to the step's own events.
    pub fn spawn_progress_chatter(
        &self,
        session_id: Uuid,
        messages: Vec<(Duration, String)>,
    ) {
        let narrator = self.clone();
        tokio::spawn(async move {
            let mut elapsed = Duration::ZERO;
            for (delay, message) in messages {
                if delay > elapsed {
                    tokio::time::sleep(delay - elapsed).await;
                    elapsed = delay;
                }
                if !narrator.sessions.exists(session_id).await {
                    return;
                }
                narrator.narrate(session_id, StepKind::Step, message).await;
            }
        });
    }
}
