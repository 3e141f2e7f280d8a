//! Seam de ejecución de validadores locales.
//!
//! Los validadores son un conjunto cerrado de variantes etiquetadas
//! (`ValidatorKind`); su lógica concreta vive en la capa de adaptadores y
//! se inyecta aquí como un único objeto polimórfico, igual que el
//! dispatcher. El motor no sabe qué hace cada clase: le entrega el payload
//! y las señales de entrada resueltas y recibe un payload de salida más
//! hallazgos.

use serde_json::Value;
use thiserror::Error;
use veri_domain::ValidatorSpec;

use crate::finding::Finding;
use crate::payload::PayloadTree;
use crate::signal::ResolvedSignals;

/// Lo que el ejecutor recibe para un paso local.
pub struct ExecutionRequest<'a> {
    pub validator: &'a ValidatorSpec,
    pub payload: &'a PayloadTree,
    pub input_signals: &'a ResolvedSignals,
}

/// Lo que el ejecutor devuelve: un payload de salida (árbol JSON contra el
/// que se resuelven las señales de etapa Output) y hallazgos propios.
#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    pub output_payload: Value,
    pub findings: Vec<Finding>,
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    /// Clase de validador sin ejecutor local registrado.
    #[error("unsupported validator kind: {0}")]
    UnsupportedKind(String),
    /// La lógica del validador falló de forma no controlada.
    #[error("validator crashed: {0}")]
    Crashed(String),
}

pub trait ValidatorExecutor: Send + Sync {
    fn execute(&self, request: &ExecutionRequest<'_>) -> Result<ExecutionReport, ExecutionError>;
}

/// Ejecutor por defecto del engine: no soporta ninguna clase. Obliga a
/// registrar el ejecutor de adaptadores antes de correr pasos locales.
#[derive(Debug, Default)]
pub struct UnsupportedExecutor;

impl ValidatorExecutor for UnsupportedExecutor {
    fn execute(&self, request: &ExecutionRequest<'_>) -> Result<ExecutionReport, ExecutionError> {
        Err(ExecutionError::UnsupportedKind(request.validator.kind().label().to_string()))
    }
}
