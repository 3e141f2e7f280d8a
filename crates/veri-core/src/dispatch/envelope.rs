//! Sobres versionados intercambiados con el sustrato externo.
//!
//! El sobre de entrada lleva las señales resueltas del paso y referencias a
//! rutas de almacenamiento con alcance de run (payloads grandes van por
//! storage, no embebidos). El sobre de salida reporta estado, categoría de
//! error, señales de salida y hallazgos del job.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::finding::Severity;
use crate::status::ErrorCategory;

/// Sobre de entrada: lo que el job externo necesita para ejecutar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputEnvelope {
    pub envelope_version: u32,
    /// Propagado desde el run padre; correlaciona logs entre sistemas.
    pub run_correlation_id: String,
    /// Uno por intento de despacho; clave de idempotencia del callback.
    pub callback_id: Uuid,
    pub step_index: u32,
    pub validator_id: String,
    /// Señales de entrada resueltas (sólo las encontradas), en orden.
    pub signals: IndexMap<String, Value>,
    pub storage_input_ref: String,
    pub storage_output_ref: String,
    pub deadline: DateTime<Utc>,
}

/// Estado reportado por el job externo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Success,
    Error,
}

/// Hallazgo tal como viaja en el sobre de salida (sin índice de paso; el
/// motor lo ancla al aplicar el callback).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeFinding {
    pub severity: Severity,
    pub message: String,
    pub path: String,
}

/// Sobre de salida: lo que el sustrato entrega por callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputEnvelope {
    pub envelope_version: u32,
    pub callback_id: Uuid,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_category: Option<ErrorCategory>,
    #[serde(default)]
    pub output_signals: IndexMap<String, Value>,
    #[serde(default)]
    pub findings: Vec<EnvelopeFinding>,
}

/// Ruta de entrada con alcance de run: `runs/{run_id}/input/{step_index}/...`
pub fn storage_input_ref(run_id: Uuid, step_index: u32) -> String {
    format!("runs/{run_id}/input/{step_index}/payload.json")
}

/// Ruta de salida con alcance de run: `runs/{run_id}/output/{step_index}/...`
pub fn storage_output_ref(run_id: Uuid, step_index: u32) -> String {
    format!("runs/{run_id}/output/{step_index}/result.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::ENVELOPE_VERSION;
    use serde_json::json;

    #[test]
    fn output_envelope_round_trips_with_defaults() {
        let raw = json!({
            "envelope_version": ENVELOPE_VERSION,
            "callback_id": Uuid::new_v4(),
            "status": "SUCCESS"
        });
        let envelope: OutputEnvelope = serde_json::from_value(raw).expect("decode");
        assert_eq!(envelope.status, JobStatus::Success);
        assert!(envelope.output_signals.is_empty());
        assert!(envelope.findings.is_empty());
        assert!(envelope.error_category.is_none());
    }

    #[test]
    fn error_category_uses_wire_names() {
        let encoded = serde_json::to_string(&ErrorCategory::ValidationException).expect("encode");
        assert_eq!(encoded, "\"VALIDATION_EXCEPTION\"");
    }

    #[test]
    fn storage_refs_are_run_scoped() {
        let run_id = Uuid::new_v4();
        let input = storage_input_ref(run_id, 20);
        assert!(input.starts_with(&format!("runs/{run_id}/input/20/")));
    }
}
