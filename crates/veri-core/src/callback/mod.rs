//! Recepción de callbacks del sustrato externo.
//!
//! La lógica de aplicación vive en `RunEngine::handle_callback`; este módulo
//! define los recibos (guarda de idempotencia) y la disposición del
//! contrato `receive`.

mod receipt;

pub use receipt::{CallbackReceipt, InMemoryReceiptStore, ReceiptStore};

use serde::{Deserialize, Serialize};

/// Disposición de un callback recibido.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallbackDisposition {
    /// Primera entrega: el sobre se aplicó (recibo + hallazgos + transición).
    Accepted,
    /// Entrega repetida: absorbida sin ningún cambio de estado.
    DuplicateIgnored,
    /// Sobre rechazado: no se mutó ningún estado.
    Rejected { reason: RejectReason },
}

/// Por qué se rechazó un sobre. `RunTerminal` cubre el invariante de
/// terminalidad monótona: un callback tardío para un run terminal se
/// registra en log y se descarta, jamás se re-procesa.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    VersionMismatch { got: u32 },
    UnknownCallback,
    RunTerminal,
    StepAlreadyResolved,
    SchemaInvalid { detail: String },
}
