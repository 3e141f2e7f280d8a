//! Errores específicos del core (simples por ahora).

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub enum CoreRunError {
    #[error("run not found")] RunNotFound,
    #[error("run already terminal (monotonic terminality invariant)")] RunAlreadyTerminal,
    #[error("step already terminal")] StepAlreadyTerminal,
    #[error("invalid step index")] InvalidStepIndex,
    #[error("workflow does not match the run's recorded definition hash")] WorkflowMismatch,
    #[error("internal: {0}")] Internal(String),
}
