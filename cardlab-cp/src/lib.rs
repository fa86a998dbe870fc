//! cardlab-cp - Card Processing Service
//!
//! Orchestrates trading-card batch processing: each submitted card pair
//! (front and back image) runs through a planned sequence of external
//! capabilities (orientation check, background removal, identification,
//! grading, enhancement, listing description) while a narrated event stream
//! reports progress over SSE.

pub mod api;
pub mod error;
pub mod models;
pub mod services;
pub mod session;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use cardlab_common::config::CardLabConfig;
use cardlab_common::events::EventBus;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::services::{BatchOrchestrator, Narrator, ProcessingPlanner, ToolSuite};
use crate::session::SessionRegistry;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Service configuration
    pub config: Arc<CardLabConfig>,
    /// Session registry holding per-batch event logs and outcomes
    pub sessions: SessionRegistry,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Typed capability surface over the toolhost
    pub tools: Arc<ToolSuite>,
    /// Step plan builder
    pub planner: Arc<ProcessingPlanner>,
    /// Cancellation tokens for active batch sessions
    pub cancellation_tokens: Arc<RwLock<HashMap<Uuid, CancellationToken>>>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: CardLabConfig, tools: Arc<ToolSuite>) -> Self {
        let event_bus = EventBus::new(config.session.event_capacity);
        let planner = Arc::new(ProcessingPlanner::new(config.planner.clone()));
        Self {
            config: Arc::new(config),
            sessions: SessionRegistry::new(),
            event_bus,
            tools,
            planner,
            cancellation_tokens: Arc::new(RwLock::new(HashMap::new())),
            startup_time: Utc::now(),
        }
    }

    pub fn narrator(&self) -> Narrator {
        Narrator::new(self.sessions.clone(), self.event_bus.clone())
    }

    pub fn orchestrator(&self) -> BatchOrchestrator {
        BatchOrchestrator::new(
            self.tools.clone(),
            self.narrator(),
            self.planner.clone(),
            self.sessions.clone(),
            self.config.confidence_threshold,
        )
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::batch_routes())
        .route("/batch/events/:session_id", get(api::event_stream))
        .merge(api::health_routes())
        .with_state(state)
}
