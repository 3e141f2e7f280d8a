// validator.rs
use crate::assertion::{AssertionBody, AssertionSpec};
use crate::signal::{validate_slug, SignalSet};
use crate::DomainError;
use serde::{Deserialize, Serialize};

/// Modo de ejecución de un validador: local (síncrono, dentro del proceso)
/// o despachado al sustrato de cómputo externo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Local,
    Dispatched,
}

/// Conjunto cerrado de clases de validador. Cada variante lleva su
/// configuración específica; el despacho ocurre por match sobre el enum,
/// no por jerarquías de herencia.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidatorKind {
    /// Verificación estructural de un documento-árbol: paths que deben
    /// existir y paths que no deben existir.
    DocumentCheck {
        required_paths: Vec<String>,
        forbidden_paths: Vec<String>,
    },
    /// Verificación de un documento de marcado: buena formación (la realiza
    /// la ingesta) y elementos requeridos por path barra.
    MarkupCheck {
        required_elements: Vec<String>,
    },
    /// Métricas derivadas de un modelo energético de edificio: suma los
    /// consumos por uso final y calcula la intensidad (EUI) sobre el área.
    EnergyModelCheck {
        area_path: String,
        end_use_paths: Vec<String>,
    },
    /// Unidad de co-simulación: se ejecuta en el sustrato externo y
    /// reporta por callback.
    CosimCheck {
        tool: String,
    },
}

impl ValidatorKind {
    pub fn execution_mode(&self) -> ExecutionMode {
        match self {
            ValidatorKind::CosimCheck { .. } => ExecutionMode::Dispatched,
            _ => ExecutionMode::Local,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ValidatorKind::DocumentCheck { .. } => "document_check",
            ValidatorKind::MarkupCheck { .. } => "markup_check",
            ValidatorKind::EnergyModelCheck { .. } => "energy_model_check",
            ValidatorKind::CosimCheck { .. } => "cosim_check",
        }
    }
}

/// Definición de un validador: clase + señales + aserciones por defecto.
///
/// Invariantes verificados al construir:
/// - slug del id válido y señales con slug único (lo garantiza `SignalSet`),
/// - toda aserción por defecto en forma operador apunta a una señal
///   existente y su etapa coincide con la etapa de la señal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorSpec {
    id: String,
    name: String,
    kind: ValidatorKind,
    signals: SignalSet,
    default_assertions: Vec<AssertionSpec>,
}

/// Verifica que las aserciones en forma operador apunten a señales del
/// conjunto con etapa coherente. Compartido entre validador y paso.
pub(crate) fn check_assertions_against_signals(assertions: &[AssertionSpec], signals: &SignalSet) -> Result<(), DomainError> {
    for assertion in assertions {
        if let AssertionBody::Operator { signal, .. } = assertion.body() {
            let spec = signals.get(signal).ok_or_else(|| {
                                                 DomainError::Validation(format!("La aserción '{}' apunta a una señal inexistente: {}",
                                                                                 assertion.slug(),
                                                                                 signal))
                                             })?;
            if spec.stage() != assertion.stage() {
                return Err(DomainError::Validation(format!("La aserción '{}' declara etapa {:?} pero la señal '{}' es {:?}",
                                                           assertion.slug(),
                                                           assertion.stage(),
                                                           signal,
                                                           spec.stage())));
            }
        }
    }
    Ok(())
}

impl ValidatorSpec {
    pub fn new(id: impl Into<String>,
               name: impl Into<String>,
               kind: ValidatorKind,
               signals: SignalSet,
               default_assertions: Vec<AssertionSpec>)
               -> Result<Self, DomainError> {
        let id = id.into();
        validate_slug(&id)?;
        check_assertions_against_signals(&default_assertions, &signals)?;
        Ok(ValidatorSpec { id,
                           name: name.into(),
                           kind,
                           signals,
                           default_assertions })
    }

    // Getters
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &ValidatorKind {
        &self.kind
    }

    pub fn execution_mode(&self) -> ExecutionMode {
        self.kind.execution_mode()
    }

    pub fn signals(&self) -> &SignalSet {
        &self.signals
    }

    pub fn default_assertions(&self) -> &[AssertionSpec] {
        &self.default_assertions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assertion::{AssertionOp, OperatorParams};
    use crate::signal::{SignalSpec, SignalStage, SignalType};
    use serde_json::json;

    fn eui_signals() -> SignalSet {
        SignalSet::from_specs(vec![SignalSpec::new("site_eui_kwh_m2", SignalStage::Input, SignalType::Number).unwrap(),
                                   SignalSpec::new("target_eui_kwh_m2", SignalStage::Input, SignalType::Number).unwrap()]).unwrap()
    }

    #[test]
    fn test_validator_accepts_coherent_assertions() -> Result<(), DomainError> {
        let params = OperatorParams { value: Some(json!(200.0)),
                                      ..Default::default() };
        let a = AssertionSpec::operator("eui_under_cap", SignalStage::Input, "site_eui_kwh_m2", AssertionOp::Lt, params)?;
        let v = ValidatorSpec::new("eui_check", "EUI check",
                                   ValidatorKind::DocumentCheck { required_paths: vec![],
                                                                  forbidden_paths: vec![] },
                                   eui_signals(),
                                   vec![a])?;
        assert_eq!(v.execution_mode(), ExecutionMode::Local);
        Ok(())
    }

    #[test]
    fn test_validator_rejects_unknown_signal_target() {
        let params = OperatorParams { value: Some(json!(1)),
                                      ..Default::default() };
        let a = AssertionSpec::operator("bad", SignalStage::Input, "missing", AssertionOp::Eq, params).unwrap();
        let result = ValidatorSpec::new("v", "v",
                                        ValidatorKind::DocumentCheck { required_paths: vec![],
                                                                       forbidden_paths: vec![] },
                                        eui_signals(),
                                        vec![a]);
        assert!(result.is_err());
    }

    #[test]
    fn test_validator_rejects_stage_mismatch() {
        let params = OperatorParams { value: Some(json!(1)),
                                      ..Default::default() };
        // la señal es Input; declarar la aserción como Output debe fallar
        let a = AssertionSpec::operator("bad", SignalStage::Output, "site_eui_kwh_m2", AssertionOp::Eq, params).unwrap();
        let result = ValidatorSpec::new("v", "v",
                                        ValidatorKind::DocumentCheck { required_paths: vec![],
                                                                       forbidden_paths: vec![] },
                                        eui_signals(),
                                        vec![a]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cosim_kind_is_dispatched() {
        let kind = ValidatorKind::CosimCheck { tool: "fmu-runner".to_string() };
        assert_eq!(kind.execution_mode(), ExecutionMode::Dispatched);
    }
}
