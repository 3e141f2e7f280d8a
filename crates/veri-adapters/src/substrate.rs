//! Emulación en proceso del sustrato de cómputo externo.
//!
//! `QueueDispatcher` implementa el seam de despacho del core acumulando los
//! sobres en una cola compartida; quien la drena (el servicio, o un test)
//! decide cuándo y cómo "ejecutar" el job con `LocalJobRunner` y entregar
//! el sobre de salida por callback. Esto reproduce el ciclo
//! despacho → suspensión → callback sin contenedores reales.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use indexmap::IndexMap;
use serde_json::Value;
use veri_core::constants::ENVELOPE_VERSION;
use veri_core::{DispatchError, DispatchHandle, EnvelopeFinding, ErrorCategory, InputEnvelope, JobDispatcher, JobStatus,
                OutputEnvelope, Severity};

/// Cola compartida de sobres despachados.
pub type EnvelopeQueue = Arc<Mutex<Vec<InputEnvelope>>>;

/// Dispatcher que encola sobres para un sustrato local.
#[derive(Debug, Default)]
pub struct QueueDispatcher {
    queue: EnvelopeQueue,
}

impl QueueDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle a la cola, para drenarla desde el servicio o un test.
    pub fn queue(&self) -> EnvelopeQueue {
        Arc::clone(&self.queue)
    }
}

impl JobDispatcher for QueueDispatcher {
    fn dispatch(&self, envelope: &InputEnvelope) -> Result<DispatchHandle, DispatchError> {
        let mut queue = self.queue
                            .lock()
                            .map_err(|_| DispatchError::Unavailable("envelope queue poisoned".to_string()))?;
        queue.push(envelope.clone());
        Ok(DispatchHandle { callback_id: envelope.callback_id,
                            dispatched_at: Utc::now(),
                            deadline: envelope.deadline })
    }
}

/// Dispatcher que rechaza todo: simula un sustrato caído o que no admite el
/// job (camino SYSTEM_ERROR del motor).
#[derive(Debug, Default)]
pub struct RejectingDispatcher {
    pub detail: String,
}

impl JobDispatcher for RejectingDispatcher {
    fn dispatch(&self, _envelope: &InputEnvelope) -> Result<DispatchHandle, DispatchError> {
        Err(DispatchError::Rejected(self.detail.clone()))
    }
}

/// Comportamiento canónico del job local.
#[derive(Debug, Clone)]
pub enum JobBehavior {
    /// El job termina bien y reporta estas señales de salida.
    Succeed { output_signals: IndexMap<String, Value> },
    /// El job falla con la categoría dada.
    Fail { category: ErrorCategory, message: String },
    /// El job nunca responde (para ejercitar deadlines).
    Silent,
}

/// Ejecuta sobres de entrada como lo haría el contenedor externo.
#[derive(Debug, Clone)]
pub struct LocalJobRunner {
    pub behavior: JobBehavior,
}

impl LocalJobRunner {
    pub fn succeeding(output_signals: IndexMap<String, Value>) -> Self {
        Self { behavior: JobBehavior::Succeed { output_signals } }
    }

    pub fn failing(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self { behavior: JobBehavior::Fail { category,
                                             message: message.into() } }
    }

    pub fn silent() -> Self {
        Self { behavior: JobBehavior::Silent }
    }

    /// Produce el sobre de salida, o None si el job no responde.
    pub fn run(&self, envelope: &InputEnvelope) -> Option<OutputEnvelope> {
        match &self.behavior {
            JobBehavior::Succeed { output_signals } => Some(OutputEnvelope { envelope_version: ENVELOPE_VERSION,
                                                                             callback_id: envelope.callback_id,
                                                                             status: JobStatus::Success,
                                                                             error_category: None,
                                                                             output_signals: output_signals.clone(),
                                                                             findings: vec![] }),
            JobBehavior::Fail { category, message } => Some(OutputEnvelope { envelope_version: ENVELOPE_VERSION,
                                                                             callback_id: envelope.callback_id,
                                                                             status: JobStatus::Error,
                                                                             error_category: Some(*category),
                                                                             output_signals: IndexMap::new(),
                                                                             findings: vec![EnvelopeFinding { severity: Severity::Error,
                                                                                                              message: message.clone(),
                                                                                                              path: format!("step:{}", envelope.step_index) }] }),
            JobBehavior::Silent => None,
        }
    }
}
