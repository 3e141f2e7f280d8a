//! Replay de eventos a estado de run.
mod types;

pub use types::{ReplayRunRepository, RunInstance, RunRepository, StepSlot};
