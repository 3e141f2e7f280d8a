//! Tipos de evento del run y estructura `RunEvent`.
//!
//! Rol en la ejecución:
//! - Cada operación del `RunEngine` emite eventos a un `EventStore`
//!   append-only.
//! - Estos eventos permiten reconstruir el estado del run (replay) sin
//!   depender de estructuras mutables; en particular, `StepDispatched` es el
//!   registro de continuación de un paso en vuelo: tras un reinicio del
//!   proceso, el replay restaura el estado de espera de callback.
//! - El enum `RunEventKind` define el contrato observable y estable del
//!   motor.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::finding::Finding;
use crate::status::{ErrorCategory, RunStatus, StepOutcome};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RunEventKind {
    /// Emisión inicial de un run: fija el hash de definición del workflow,
    /// la cantidad de pasos y el id de correlación. Invariante: debe ser el
    /// primer evento de un `run_id`.
    RunInitialized {
        workflow_hash: String,
        step_count: usize,
        correlation_id: String,
        submission_checksum: String,
    },
    /// Un paso comenzó su ejecución. No implica éxito.
    StepStarted { step_index: u32, validator_id: String },
    /// Un paso fue despachado al sustrato externo. Registro de continuación:
    /// incluye el callback_id que cerrará el paso, las referencias de
    /// almacenamiento y los hallazgos no bloqueantes de la fase previa (para
    /// fusionarlos al cierre).
    StepDispatched {
        step_index: u32,
        validator_id: String,
        callback_id: Uuid,
        input_ref: String,
        output_ref: String,
        deadline: DateTime<Utc>,
        pre_findings: Vec<Finding>,
    },
    /// Un paso alcanzó estado terminal, con sus hallazgos, señales de salida
    /// resueltas y digest de trazabilidad.
    StepFinished {
        step_index: u32,
        validator_id: String,
        outcome: StepOutcome,
        error_category: Option<ErrorCategory>,
        findings: Vec<Finding>,
        output_signals: Value,
        digest: String,
    },
    /// Un paso se omitió (falla bloqueante previa o cancelación).
    StepSkipped {
        step_index: u32,
        validator_id: String,
        reason: String,
    },
    /// Se registró intención de cancelar. Si hay un despacho en vuelo, el
    /// siguiente callback o vencimiento finaliza el run como CANCELED.
    CancelRequested { reason: Option<String> },
    /// Evento de cierre con el estado terminal derivado y el digest agregado
    /// del run (hash de los digests de pasos terminados).
    RunFinished { status: RunStatus, run_digest: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEvent {
    pub seq: u64, // asignado por el EventStore (orden append)
    pub run_id: Uuid,
    pub kind: RunEventKind,
    pub ts: DateTime<Utc>, // metadato (no entra en digests)
}
