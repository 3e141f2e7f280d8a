//! Seam de despacho hacia el sustrato de cómputo externo.
//!
//! El motor nunca reintenta un despacho por su cuenta: re-ejecutar una
//! simulación no idempotente es decisión de un operador o controlador
//! externo. Un rechazo del sustrato se distingue de un fallo de ejecución:
//! sólo el segundo produce hallazgos; el primero deja categoría
//! SYSTEM_ERROR en el paso.

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use super::envelope::InputEnvelope;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("substrate rejected the job: {0}")]
    Rejected(String),
    #[error("substrate unavailable: {0}")]
    Unavailable(String),
}

/// Constancia de un despacho aceptado.
#[derive(Debug, Clone)]
pub struct DispatchHandle {
    pub callback_id: Uuid,
    pub dispatched_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
}

/// Entrega un sobre de entrada al sustrato. La implementación real vive
/// fuera del core (cola local, HTTP, etc.); el motor sólo conoce este
/// contrato síncrono de entrega.
pub trait JobDispatcher: Send + Sync {
    fn dispatch(&self, envelope: &InputEnvelope) -> Result<DispatchHandle, DispatchError>;
}

/// Dispatcher por defecto del engine: rechaza todo. Obliga a cablear un
/// sustrato real antes de ejecutar workflows con validadores despachados.
#[derive(Debug, Default)]
pub struct NullDispatcher;

impl JobDispatcher for NullDispatcher {
    fn dispatch(&self, _envelope: &InputEnvelope) -> Result<DispatchHandle, DispatchError> {
        Err(DispatchError::Unavailable("no substrate dispatcher configured".to_string()))
    }
}
