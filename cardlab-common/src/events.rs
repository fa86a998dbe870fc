//! Narrated event types and the EventBus.
//!
//! Every user-visible state change in a processing session is narrated as one
//! `NarratedEvent`. Events are appended to the session's ordered log and
//! broadcast on the `EventBus` for SSE transmission. Consumers that need the
//! identified card name must read `identification_hint` rather than parse the
//! narration prose; the prose and the hint always agree but only the hint is
//! a contract.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Which side of a physical card an image shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardSide {
    Front,
    Back,
}

impl CardSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardSide::Front => "front",
            CardSide::Back => "back",
        }
    }
}

impl std::fmt::Display for CardSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of a narrated event, mirroring the pipeline's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Batch accepted, processing begins
    Start,
    /// Step plan created
    Planning,
    /// A new pair is being picked up
    Processing,
    /// Progress within a step
    Step,
    /// A step or pair finished successfully
    Success,
    /// A step failed (recorded, pipeline continues)
    Error,
    /// Batch finished; terminal event for the session
    Complete,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Start => "start",
            StepKind::Planning => "planning",
            StepKind::Processing => "processing",
            StepKind::Step => "step",
            StepKind::Success => "success",
            StepKind::Error => "error",
            StepKind::Complete => "complete",
        }
    }
}

/// Intermediate image artifact attached to an event for live preview.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagePreview {
    /// Index of the card pair the artifact belongs to
    pub pair_index: usize,
    /// Which side produced the artifact
    pub side: CardSide,
    /// Artifact name, e.g. "background_removed"
    pub artifact_kind: String,
    /// Transport-encoded image bytes
    pub image_base64: String,
}

/// Structured identification result attached to an event.
///
/// Consumers prefer this over parsing the narration text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentificationHint {
    pub pair_index: usize,
    pub card_name: String,
}

/// One entry in a session's progress log. Immutable once appended;
/// `seq` is the append order within the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarratedEvent {
    pub seq: u64,
    pub kind: StepKind,
    pub message: String,
    pub timestamp_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_preview: Option<ImagePreview>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identification_hint: Option<IdentificationHint>,
}

/// Current wall-clock time as Unix milliseconds.
pub fn now_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

/// A narrated event tagged with its session, as carried on the EventBus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    pub session_id: Uuid,
    #[serde(flatten)]
    pub event: NarratedEvent,
}

/// Broadcast bus for session events.
///
/// Narration is fire-and-forget: emitting never blocks and never fails the
/// pipeline, even with no subscribers listening.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    /// Creates a new EventBus with the given channel capacity.
    ///
    /// Slow subscribers lagging behind by more than `capacity` events will
    /// observe `RecvError::Lagged` and must resynchronize from the session log.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future session events.
    ///
    /// Events emitted before subscription are not received; late subscribers
    /// replay the session log first.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers. Returns the subscriber count.
    pub fn emit(&self, event: SessionEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }
}
