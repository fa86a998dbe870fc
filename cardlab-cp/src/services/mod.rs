//! Processing pipeline services.

pub mod batch_orchestrator;
pub mod card_processor;
pub mod narrator;
pub mod pair_processor;
pub mod planner;
pub mod tool_client;

pub use batch_orchestrator::BatchOrchestrator;
pub use narrator::Narrator;
pub use planner::ProcessingPlanner;
pub use tool_client::{HttpToolClient, ToolInvoker, ToolSuite};
