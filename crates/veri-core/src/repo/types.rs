//! Tipos de repositorio: estado reconstruido (`RunInstance`) por replay de
//! eventos.
//!
//! El repositorio aplica un replay lineal: consume eventos en orden y
//! actualiza slots inmutables por evento. No almacena payloads completos
//! (sólo señales de salida y hallazgos ya registrados en eventos) para
//! mantener neutralidad.
use chrono::{DateTime, Utc};
use uuid::Uuid;
use veri_domain::Workflow;

use crate::event::{RunEvent, RunEventKind};
use crate::finding::Finding;
use crate::status::{ErrorCategory, RunStatus, StepOutcome, StepState};

/// Estado de un paso en la instancia.
#[derive(Debug, Clone)]
pub struct StepSlot {
    pub step_index: u32,
    pub validator_id: String,
    pub state: StepState,
    /// Registro de continuación: callback pendiente de un paso despachado.
    pub callback_id: Option<Uuid>,
    pub deadline: Option<DateTime<Utc>>,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error_category: Option<ErrorCategory>,
    /// Hallazgos no bloqueantes de la fase previa de un paso despachado,
    /// pendientes de fusionar al cierre.
    pub pre_findings: Vec<Finding>,
    pub attempts: u32,
}

impl StepSlot {
    /// true si el paso está despachado y espera callback.
    pub fn awaiting_callback(&self) -> bool {
        self.state == StepState::Running && self.callback_id.is_some()
    }
}

/// Estado completo de un run reconstruido por replay.
#[derive(Debug, Clone)]
pub struct RunInstance {
    pub id: Uuid,
    pub status: RunStatus,
    pub correlation_id: String,
    pub workflow_hash: String,
    pub steps: Vec<StepSlot>,
    /// Posición (no step_index) del primer paso no terminal.
    pub cursor: usize,
    pub cancel_requested: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Hallazgos acumulados de todos los pasos terminados, en orden.
    pub findings: Vec<Finding>,
    /// Digest agregado registrado por `RunFinished`.
    pub run_digest: Option<String>,
}

impl RunInstance {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Duración total si el run terminó.
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.created_at, self.finished_at) {
            (Some(a), Some(b)) => Some(b - a),
            _ => None,
        }
    }

    /// Posición del paso en vuelo (despachado, esperando callback).
    pub fn awaiting_position(&self) -> Option<usize> {
        self.steps.iter().position(|s| s.awaiting_callback())
    }

    /// Posición del paso cuyo callback pendiente es `callback_id`.
    pub fn position_for_callback(&self, callback_id: Uuid) -> Option<usize> {
        self.steps.iter().position(|s| s.callback_id == Some(callback_id))
    }

    /// true si un fallo bloqueante previo impide seguir ejecutando pasos.
    /// Depende del workflow: un paso con `continue_on_failure` no corta.
    pub fn halted(&self, workflow: &Workflow) -> bool {
        self.steps.iter().zip(workflow.steps().iter()).any(|(slot, step)| {
            slot.state == StepState::Failed && !step.continue_on_failure()
        })
    }

    /// Estado terminal derivado de los pasos, nunca almacenado aparte.
    /// Prioridad: Canceled > TimedOut > Failed > Succeeded.
    pub fn derive_final_status(&self) -> RunStatus {
        if self.cancel_requested {
            return RunStatus::Canceled;
        }
        if self.steps.iter().any(|s| s.error_category == Some(ErrorCategory::Timeout)) {
            return RunStatus::TimedOut;
        }
        if self.steps.iter().any(|s| s.state == StepState::Failed) {
            return RunStatus::Failed;
        }
        RunStatus::Succeeded
    }
}

/// Reconstruye (`replay`) el estado de un run a partir de sus eventos.
pub trait RunRepository {
    fn load(&self, run_id: Uuid, events: &[RunEvent], workflow: &Workflow) -> RunInstance;
}

/// Replayer estándar. Es independiente del almacenamiento: cualquier
/// `EventStore` (memoria o disco) alimenta el mismo replay.
#[derive(Debug, Default)]
pub struct ReplayRunRepository;

impl ReplayRunRepository {
    pub fn new() -> Self {
        Self
    }
}

impl RunRepository for ReplayRunRepository {
    fn load(&self, run_id: Uuid, events: &[RunEvent], workflow: &Workflow) -> RunInstance {
        let mut steps: Vec<StepSlot> = workflow.steps()
                                               .iter()
                                               .map(|s| StepSlot { step_index: s.step_index(),
                                                                   validator_id: s.validator().id().to_string(),
                                                                   state: StepState::Pending,
                                                                   callback_id: None,
                                                                   deadline: None,
                                                                   dispatched_at: None,
                                                                   started_at: None,
                                                                   finished_at: None,
                                                                   error_category: None,
                                                                   pre_findings: vec![],
                                                                   attempts: 0 })
                                               .collect();
        let mut status = RunStatus::Pending;
        let mut correlation_id = String::new();
        let mut workflow_hash = String::new();
        let mut cancel_requested = false;
        let mut created_at = None;
        let mut finished_at = None;
        let mut findings: Vec<Finding> = Vec::new();
        let mut run_digest = None;

        let position_of = |steps: &[StepSlot], step_index: u32| steps.iter().position(|s| s.step_index == step_index);

        for ev in events {
            match &ev.kind {
                RunEventKind::RunInitialized { correlation_id: cid,
                                               workflow_hash: wh,
                                               .. } => {
                    status = RunStatus::Running;
                    correlation_id = cid.clone();
                    workflow_hash = wh.clone();
                    created_at = Some(ev.ts);
                }
                RunEventKind::StepStarted { step_index, .. } => {
                    if let Some(pos) = position_of(&steps, *step_index) {
                        let slot = &mut steps[pos];
                        slot.state = StepState::Running;
                        slot.started_at = Some(ev.ts);
                        slot.attempts += 1;
                    }
                }
                RunEventKind::StepDispatched { step_index,
                                               callback_id,
                                               deadline,
                                               pre_findings,
                                               .. } => {
                    if let Some(pos) = position_of(&steps, *step_index) {
                        let slot = &mut steps[pos];
                        slot.callback_id = Some(*callback_id);
                        slot.deadline = Some(*deadline);
                        slot.dispatched_at = Some(ev.ts);
                        slot.pre_findings = pre_findings.clone();
                    }
                }
                RunEventKind::StepFinished { step_index,
                                             outcome,
                                             error_category,
                                             findings: step_findings,
                                             .. } => {
                    if let Some(pos) = position_of(&steps, *step_index) {
                        let slot = &mut steps[pos];
                        slot.state = match outcome {
                            StepOutcome::Passed => StepState::Passed,
                            StepOutcome::Failed => StepState::Failed,
                        };
                        slot.error_category = *error_category;
                        slot.finished_at = Some(ev.ts);
                        findings.extend(step_findings.iter().cloned());
                    }
                }
                RunEventKind::StepSkipped { step_index, .. } => {
                    if let Some(pos) = position_of(&steps, *step_index) {
                        steps[pos].state = StepState::Skipped;
                    }
                }
                RunEventKind::CancelRequested { .. } => cancel_requested = true,
                RunEventKind::RunFinished { status: final_status,
                                            run_digest: digest } => {
                    status = *final_status;
                    finished_at = Some(ev.ts);
                    run_digest = Some(digest.clone());
                }
            }
        }

        let cursor = steps.iter()
                          .position(|s| !s.state.is_terminal())
                          .unwrap_or(steps.len());

        RunInstance { id: run_id,
                      status,
                      correlation_id,
                      workflow_hash,
                      steps,
                      cursor,
                      cancel_requested,
                      created_at,
                      finished_at,
                      findings,
                      run_digest }
    }
}
