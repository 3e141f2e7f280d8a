//! Estados del run y de sus pasos, y taxonomía de errores de ejecución.
//!
//! Transiciones válidas del run:
//! - `Pending` -> `Running`
//! - `Running` -> `Succeeded` | `Failed` | `Canceled` | `TimedOut`
//!
//! Transiciones válidas de un paso:
//! - `Pending` -> `Running`
//! - `Running` -> `Passed` | `Failed`
//! - `Pending` -> `Skipped`
//!
//! Los estados terminales son monótonos: una vez alcanzados no se acepta
//! ninguna transición posterior (los callbacks tardíos se descartan).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Canceled,
    TimedOut,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self,
                 RunStatus::Succeeded | RunStatus::Failed | RunStatus::Canceled | RunStatus::TimedOut)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepState {
    Pending,
    Running,
    Passed,
    Failed,
    Skipped,
}

impl StepState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepState::Passed | StepState::Failed | StepState::Skipped)
    }
}

/// Resultado terminal que registra `StepFinished` (Skipped tiene su propio
/// evento).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepOutcome {
    Passed,
    Failed,
}

/// Categorías de error de ejecución reportadas por el sustrato o asignadas
/// por el motor. Distintas de un FAIL ordinario de aserción: un paso con
/// categoría registrada falló por causa operacional, no por contenido.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    Timeout,
    Oom,
    ValidationException,
    RuntimeError,
    SystemError,
}
