//! Run state machine.
//!
//! Provides the event-sourced engine that drives a validation run through
//! its steps and the progress/config types of its public surface.

mod engine;

pub use engine::{EngineConfig, RunEngine, RunProgress};
