// workflow.rs
use crate::assertion::AssertionSpec;
use crate::signal::validate_slug;
use crate::validator::{check_assertions_against_signals, ValidatorSpec};
use crate::DomainError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

/// Un paso de workflow: un validador más las aserciones propias del paso.
///
/// `step_index` define el orden total de ejecución. Se permiten huecos
/// (10, 20, 35); lo que se exige es orden estrictamente ascendente dentro
/// del workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    step_index: u32,
    validator: ValidatorSpec,
    assertions: Vec<AssertionSpec>,
    continue_on_failure: bool,
}

impl WorkflowStep {
    pub fn new(step_index: u32, validator: ValidatorSpec, assertions: Vec<AssertionSpec>) -> Result<Self, DomainError> {
        check_assertions_against_signals(&assertions, validator.signals())?;
        Ok(WorkflowStep { step_index,
                          validator,
                          assertions,
                          continue_on_failure: false })
    }

    /// Nueva instancia que permite continuar con los pasos siguientes aunque
    /// este paso falle (por defecto un fallo bloqueante corta el workflow).
    pub fn with_continue_on_failure(mut self) -> Self {
        self.continue_on_failure = true;
        self
    }

    // Getters
    pub fn step_index(&self) -> u32 {
        self.step_index
    }

    pub fn validator(&self) -> &ValidatorSpec {
        &self.validator
    }

    pub fn assertions(&self) -> &[AssertionSpec] {
        &self.assertions
    }

    pub fn continue_on_failure(&self) -> bool {
        self.continue_on_failure
    }
}

/// Lista ordenada e inmutable de pasos de validación.
///
/// El hash de definición identifica la composición del workflow (slug,
/// índices, validadores y aserciones) y entra en los eventos del run para
/// trazabilidad.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    id: Uuid,
    slug: String,
    steps: Vec<WorkflowStep>,
    definition_hash: String,
}

impl Workflow {
    /// Crea un workflow validando que haya al menos un paso y que los
    /// índices sean estrictamente ascendentes.
    pub fn new(slug: impl Into<String>, steps: Vec<WorkflowStep>) -> Result<Self, DomainError> {
        let slug = slug.into();
        validate_slug(&slug)?;
        if steps.is_empty() {
            return Err(DomainError::Validation("Un workflow no puede estar vacío".to_string()));
        }
        for pair in steps.windows(2) {
            if pair[1].step_index() <= pair[0].step_index() {
                return Err(DomainError::Validation(format!("Índices de paso no ascendentes: {} luego de {}",
                                                           pair[1].step_index(),
                                                           pair[0].step_index())));
            }
        }
        let definition_hash = Self::calculate_definition_hash(&slug, &steps);
        Ok(Workflow { id: Uuid::new_v4(),
                      slug,
                      steps,
                      definition_hash })
    }

    /// Hash sha256 sobre la composición estable del workflow.
    fn calculate_definition_hash(slug: &str, steps: &[WorkflowStep]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(slug.as_bytes());
        for step in steps {
            hasher.update(step.step_index().to_be_bytes());
            hasher.update(step.validator().id().as_bytes());
            for assertion in step.validator().default_assertions() {
                hasher.update(assertion.slug().as_bytes());
            }
            for assertion in step.assertions() {
                hasher.update(assertion.slug().as_bytes());
            }
        }
        format!("{:x}", hasher.finalize())
    }

    /// Paso en la posición `pos` (orden de ejecución), no por `step_index`.
    pub fn step_at(&self, pos: usize) -> Option<&WorkflowStep> {
        self.steps.get(pos)
    }

    /// Busca un paso por su `step_index` declarado.
    pub fn find_step(&self, step_index: u32) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.step_index() == step_index)
    }

    // Getters
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn steps(&self) -> &[WorkflowStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn definition_hash(&self) -> &str {
        &self.definition_hash
    }
}

impl fmt::Display for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Workflow(slug: {}, steps: {})", self.slug, self.steps.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::SignalSet;
    use crate::validator::ValidatorKind;

    fn doc_validator(id: &str) -> ValidatorSpec {
        ValidatorSpec::new(id, id,
                           ValidatorKind::DocumentCheck { required_paths: vec![],
                                                          forbidden_paths: vec![] },
                           SignalSet::new(),
                           vec![]).unwrap()
    }

    #[test]
    fn test_workflow_allows_sparse_indices() -> Result<(), DomainError> {
        let wf = Workflow::new("energy_review",
                               vec![WorkflowStep::new(10, doc_validator("a"), vec![])?,
                                    WorkflowStep::new(25, doc_validator("b"), vec![])?])?;
        assert_eq!(wf.len(), 2);
        assert!(wf.find_step(25).is_some());
        Ok(())
    }

    #[test]
    fn test_workflow_rejects_non_ascending_indices() -> Result<(), DomainError> {
        let result = Workflow::new("w",
                                   vec![WorkflowStep::new(20, doc_validator("a"), vec![])?,
                                        WorkflowStep::new(20, doc_validator("b"), vec![])?]);
        assert!(result.is_err());
        Ok(())
    }

    #[test]
    fn test_workflow_rejects_empty() {
        assert!(Workflow::new("w", vec![]).is_err());
    }

    #[test]
    fn test_definition_hash_is_stable_for_same_composition() -> Result<(), DomainError> {
        let a = Workflow::new("w", vec![WorkflowStep::new(1, doc_validator("a"), vec![])?])?;
        let b = Workflow::new("w", vec![WorkflowStep::new(1, doc_validator("a"), vec![])?])?;
        assert_eq!(a.definition_hash(), b.definition_hash());
        Ok(())
    }
}
