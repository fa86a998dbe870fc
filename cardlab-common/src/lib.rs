//! # CardLab Common Library
//!
//! Shared code for the CardLab services including:
//! - Narrated event types and the EventBus
//! - Common error type
//! - Configuration loading

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
