//! Ejecutores locales por clase de validador.
//!
//! `KindExecutor` es el único objeto que el motor conoce: despacha por
//! match sobre el conjunto cerrado `ValidatorKind`. La clase co-simulada no
//! tiene ejecutor local (siempre va al sustrato); pedirla aquí es un error
//! de configuración y se reporta como clase no soportada.

mod document;
mod energy;
mod wellformed;

pub use document::document_check;
pub use energy::energy_model_check;
pub use wellformed::markup_check;

use veri_core::{ExecutionError, ExecutionReport, ExecutionRequest, ValidatorExecutor};
use veri_domain::ValidatorKind;

#[derive(Debug, Default)]
pub struct KindExecutor;

impl ValidatorExecutor for KindExecutor {
    fn execute(&self, request: &ExecutionRequest<'_>) -> Result<ExecutionReport, ExecutionError> {
        match request.validator.kind() {
            ValidatorKind::DocumentCheck { required_paths,
                                           forbidden_paths } => {
                Ok(document_check(request.payload, required_paths, forbidden_paths))
            }
            ValidatorKind::MarkupCheck { required_elements } => Ok(markup_check(request.payload, required_elements)),
            ValidatorKind::EnergyModelCheck { area_path,
                                              end_use_paths } => {
                Ok(energy_model_check(request.payload, area_path, end_use_paths))
            }
            ValidatorKind::CosimCheck { .. } => {
                Err(ExecutionError::UnsupportedKind("cosim_check runs on the external substrate".to_string()))
            }
        }
    }
}
