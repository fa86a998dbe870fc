//! Session registry: lifecycle of per-batch event logs.
//!
//! A session is created when a batch is accepted, appended to by the narrator
//! for every meaningful state change, and torn down when the client fetches
//! final results or the idle timeout elapses. Appending is the only mutation
//! permitted to pipeline components; all appends go through the narrator.

use cardlab_common::events::{IdentificationHint, ImagePreview, NarratedEvent, StepKind, now_ms};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::BatchOutcome;

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Accepted, background task not yet running
    Pending,
    /// Pipeline running
    Processing,
    /// Batch finished; results available
    Completed,
    /// Stop observed at a checkpoint; partial results available
    Stopped,
    /// Background task failed before producing an outcome
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Stopped | SessionStatus::Failed)
    }
}

/// Non-destructive progress snapshot for status queries.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub status: SessionStatus,
    pub events_logged: usize,
    pub started_at: DateTime<Utc>,
}

struct Session {
    events: Vec<NarratedEvent>,
    next_seq: u64,
    status: SessionStatus,
    outcome: Option<BatchOutcome>,
    started_at: DateTime<Utc>,
    last_activity: Instant,
}

impl Session {
    fn new() -> Self {
        Self {
            events: Vec::new(),
            next_seq: 0,
            status: SessionStatus::Pending,
            outcome: None,
            started_at: Utc::now(),
            last_activity: Instant::now(),
        }
    }
}

/// Shared registry of active sessions.
///
/// The sequential pipeline appends; the SSE transport reads. The registry
/// lock is the only synchronization between the two.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<RwLock<HashMap<Uuid, Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fresh session and return its id.
    pub async fn create(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.inner.write().await.insert(id, Session::new());
        id
    }

    pub async fn exists(&self, id: Uuid) -> bool {
        self.inner.read().await.contains_key(&id)
    }

    /// Append one event, assigning its sequence number.
    ///
    /// Returns the stored event, or `None` when the session is unknown or
    /// already terminal (late chatter from detached timers lands here and
    /// must stay a no-op).
    pub async fn append(
        &self,
        id: Uuid,
        kind: StepKind,
        message: String,
        image_preview: Option<ImagePreview>,
        identification_hint: Option<IdentificationHint>,
    ) -> Option<NarratedEvent> {
        let mut sessions = self.inner.write().await;
        let session = sessions.get_mut(&id)?;
        if session.status.is_terminal() && kind != StepKind::Complete {
            return None;
        }

        let event = NarratedEvent {
            seq: session.next_seq,
            kind,
            message,
            timestamp_ms: now_ms(),
            image_preview,
            identification_hint,
        };
        session.next_seq += 1;
        session.last_activity = Instant::now();
        session.events.push(event.clone());
        Some(event)
    }

    /// Events with `seq >= from_seq`, in append order.
    pub async fn events_from(&self, id: Uuid, from_seq: u64) -> Option<Vec<NarratedEvent>> {
        let sessions = self.inner.read().await;
        let session = sessions.get(&id)?;
        Some(
            session
                .events
                .iter()
                .filter(|e| e.seq >= from_seq)
                .cloned()
                .collect(),
        )
    }

    pub async fn status(&self, id: Uuid) -> Option<SessionStatus> {
        self.inner.read().await.get(&id).map(|s| s.status)
    }

    pub async fn snapshot(&self, id: Uuid) -> Option<SessionSnapshot> {
        let sessions = self.inner.read().await;
        let session = sessions.get(&id)?;
        Some(SessionSnapshot {
            session_id: id,
            status: session.status,
            events_logged: session.events.len(),
            started_at: session.started_at,
        })
    }

    pub async fn set_status(&self, id: Uuid, status: SessionStatus) {
        if let Some(session) = self.inner.write().await.get_mut(&id) {
            session.status = status;
            session.last_activity = Instant::now();
        }
    }

    /// Mark the session terminal with its outcome.
    pub async fn finish(&self, id: Uuid, status: SessionStatus, outcome: BatchOutcome) {
        if let Some(session) = self.inner.write().await.get_mut(&id) {
            session.status = status;
            session.outcome = Some(outcome);
            session.last_activity = Instant::now();
        }
    }

    /// Drain and destroy a terminal session, returning its outcome.
    ///
    /// Non-terminal sessions are left untouched and `None` is returned; the
    /// caller distinguishes "not there" from "not finished" via `status`.
    pub async fn take_outcome(&self, id: Uuid) -> Option<BatchOutcome> {
        let mut sessions = self.inner.write().await;
        let terminal = sessions.get(&id).map(|s| s.status.is_terminal())?;
        if !terminal {
            return None;
        }
        sessions.remove(&id).and_then(|s| s.outcome)
    }

    /// Remove the session regardless of state.
    pub async fn destroy(&self, id: Uuid) {
        self.inner.write().await.remove(&id);
    }

    /// Tear down sessions idle for longer than `max_idle`. Returns how many
    /// were removed.
    pub async fn sweep_idle(&self, max_idle: Duration) -> usize {
        let mut sessions = self.inner.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.last_activity.elapsed() <= max_idle);
        before - sessions.len()
    }
}
