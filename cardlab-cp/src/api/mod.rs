//! API endpoint handlers

pub mod batch;
pub mod health;
pub mod sse;

pub use batch::batch_routes;
pub use health::health_routes;
pub use sse::event_stream;
