//! Hallazgos de validación.
//!
//! Un `Finding` es append-only: se produce al evaluar aserciones (o llega
//! dentro de un sobre de salida) y no se muta después de creado.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    pub message: String,
    /// Ubicación dentro del payload (data path) o slug de la aserción.
    pub path: String,
    /// Índice del paso que produjo el hallazgo; None para hallazgos a nivel
    /// de run.
    pub step_index: Option<u32>,
}

impl Finding {
    pub fn error(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self { severity: Severity::Error,
               message: message.into(),
               path: path.into(),
               step_index: None }
    }

    pub fn warning(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self { severity: Severity::Warning,
               message: message.into(),
               path: path.into(),
               step_index: None }
    }

    pub fn info(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self { severity: Severity::Info,
               message: message.into(),
               path: path.into(),
               step_index: None }
    }

    /// Nueva instancia anclada a un paso.
    pub fn at_step(mut self, step_index: u32) -> Self {
        self.step_index = Some(step_index);
        self
    }
}
