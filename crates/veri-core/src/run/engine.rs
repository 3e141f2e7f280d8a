//! Core RunEngine implementation
//!
//! Motor de ejecución de runs de validación
//!
//! Responsable de secuenciar los pasos en orden ascendente de índice,
//! resolver señales, evaluar aserciones, despachar validadores al sustrato
//! externo y aplicar callbacks exactamente una vez. Todo el estado se
//! deriva por replay del log de eventos: el motor en sí no guarda estado
//! mutable de runs.

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use veri_domain::{ExecutionMode, SignalStage, Workflow, WorkflowStep};

use crate::assertion::evaluate_phase;
use crate::callback::{CallbackDisposition, CallbackReceipt, InMemoryReceiptStore, ReceiptStore, RejectReason};
use crate::constants::{CORE_VERSION, DEFAULT_DEADLINE_SECS, DEFAULT_EVAL_BUDGET, ENVELOPE_VERSION};
use crate::dispatch::{storage_input_ref, storage_output_ref, InputEnvelope, JobDispatcher, JobStatus, NullDispatcher,
                      OutputEnvelope};
use crate::errors::CoreRunError;
use crate::event::{EventStore, InMemoryEventStore, RunEvent, RunEventKind};
use crate::executor::{ExecutionError, ExecutionRequest, UnsupportedExecutor, ValidatorExecutor};
use crate::finding::{Finding, Severity};
use crate::hashing::hash_value;
use crate::payload::{PayloadTree, Resolved};
use crate::repo::{ReplayRunRepository, RunInstance, RunRepository};
use crate::signal::{resolve_signal_set, ResolvedSignals};
use crate::status::{ErrorCategory, RunStatus, StepOutcome};

/// Parámetros operativos del motor.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Plazo en segundos entre despacho y deadline del job.
    pub deadline_secs: i64,
    /// Presupuesto de pasos de evaluación para expresiones.
    pub eval_budget: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { deadline_secs: DEFAULT_DEADLINE_SECS,
               eval_budget: DEFAULT_EVAL_BUDGET }
    }
}

/// Hasta dónde avanzó el run tras una operación del motor.
#[derive(Debug, Clone, PartialEq)]
pub enum RunProgress {
    /// El run alcanzó estado terminal.
    Completed(RunStatus),
    /// Hay un paso despachado esperando callback; el run no bloquea ningún
    /// hilo, queda suspendido en el log.
    AwaitingCallback { step_index: u32, callback_id: Uuid },
}

/// Motor de ejecución de runs deterministas.
pub struct RunEngine<E, R, C>
    where E: EventStore,
          R: RunRepository,
          C: ReceiptStore
{
    event_store: E,
    repository: R,
    receipts: C,
    dispatcher: Box<dyn JobDispatcher>,
    executor: Box<dyn ValidatorExecutor>,
    config: EngineConfig,
}

impl RunEngine<InMemoryEventStore, ReplayRunRepository, InMemoryReceiptStore> {
    /// Motor con stores en memoria (tests y demos).
    pub fn in_memory() -> Self {
        Self::new_with_stores(InMemoryEventStore::default(), ReplayRunRepository::new(), InMemoryReceiptStore::default())
    }
}

impl Default for RunEngine<InMemoryEventStore, ReplayRunRepository, InMemoryReceiptStore> {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl<E, R, C> RunEngine<E, R, C>
    where E: EventStore,
          R: RunRepository,
          C: ReceiptStore
{
    /// Crea un motor con los stores proporcionados. Sin dispatcher ni
    /// ejecutor registrados, los pasos despachados fallan con SYSTEM_ERROR
    /// y los locales con clase no soportada.
    pub fn new_with_stores(event_store: E, repository: R, receipts: C) -> Self {
        Self { event_store,
               repository,
               receipts,
               dispatcher: Box::new(NullDispatcher),
               executor: Box::new(UnsupportedExecutor),
               config: EngineConfig::default() }
    }

    pub fn set_dispatcher(&mut self, dispatcher: Box<dyn JobDispatcher>) {
        self.dispatcher = dispatcher;
    }

    pub fn set_executor(&mut self, executor: Box<dyn ValidatorExecutor>) {
        self.executor = executor;
    }

    pub fn set_config(&mut self, config: EngineConfig) {
        self.config = config;
    }

    // ---------------------------------------------------------------
    // Operaciones públicas
    // ---------------------------------------------------------------

    /// Lanza un run del workflow sobre el payload dado y avanza hasta que
    /// termine o quede suspendido en un despacho.
    pub fn launch(&mut self,
                  payload: &PayloadTree,
                  workflow: &Workflow,
                  correlation_id: Option<String>,
                  submission_checksum: &str)
                  -> Result<(Uuid, RunProgress), CoreRunError> {
        let run_id = Uuid::new_v4();
        let correlation = correlation_id.unwrap_or_else(|| run_id.simple().to_string());
        self.event_store.append_kind(run_id,
                                     RunEventKind::RunInitialized { workflow_hash: workflow.definition_hash().to_string(),
                                                                    step_count: workflow.len(),
                                                                    correlation_id: correlation,
                                                                    submission_checksum: submission_checksum.to_string() });
        let progress = self.advance_until_blocked(run_id, payload, workflow)?;
        Ok((run_id, progress))
    }

    /// Estado actual del run (replay completo).
    pub fn snapshot(&self, run_id: Uuid, workflow: &Workflow) -> Result<RunInstance, CoreRunError> {
        self.load(run_id, workflow)
    }

    /// Solicita la cancelación. Inmediata si no hay despacho en vuelo; si lo
    /// hay, registra la intención y el siguiente callback o vencimiento
    /// finaliza el run como CANCELED.
    pub fn cancel(&mut self,
                  run_id: Uuid,
                  payload: &PayloadTree,
                  workflow: &Workflow,
                  reason: Option<String>)
                  -> Result<RunStatus, CoreRunError> {
        let instance = self.load(run_id, workflow)?;
        if instance.is_terminal() {
            return Err(CoreRunError::RunAlreadyTerminal);
        }
        self.event_store.append_kind(run_id, RunEventKind::CancelRequested { reason });
        if instance.awaiting_position().is_none() {
            self.advance_until_blocked(run_id, payload, workflow)?;
        }
        Ok(self.load(run_id, workflow)?.status)
    }

    /// Aplica el sobre de salida de un job despachado. Idempotente frente a
    /// entregas repetidas y seguro frente a callbacks tardíos o desconocidos
    /// (rechazo sin mutación).
    pub fn handle_callback(&mut self,
                           run_id: Uuid,
                           envelope: &OutputEnvelope,
                           payload: &PayloadTree,
                           workflow: &Workflow)
                           -> Result<CallbackDisposition, CoreRunError> {
        if envelope.envelope_version != ENVELOPE_VERSION {
            return Ok(CallbackDisposition::Rejected { reason: RejectReason::VersionMismatch { got: envelope.envelope_version } });
        }
        if self.receipts.contains(envelope.callback_id) {
            return Ok(CallbackDisposition::DuplicateIgnored);
        }
        let instance = self.load(run_id, workflow)?;
        let pos = match instance.position_for_callback(envelope.callback_id) {
            Some(pos) => pos,
            None => {
                return Ok(CallbackDisposition::Rejected { reason: RejectReason::UnknownCallback });
            }
        };
        if instance.is_terminal() {
            // terminalidad monótona: se descarta, el servicio lo loguea con
            // el correlation_id
            return Ok(CallbackDisposition::Rejected { reason: RejectReason::RunTerminal });
        }
        if !instance.steps[pos].awaiting_callback() {
            return Ok(CallbackDisposition::Rejected { reason: RejectReason::StepAlreadyResolved });
        }

        // recibo primero: la guarda de idempotencia queda persistida antes
        // de aplicar efectos
        let envelope_value = serde_json::to_value(envelope).map_err(|e| CoreRunError::Internal(e.to_string()))?;
        let receipt = CallbackReceipt { callback_id: envelope.callback_id,
                                        received_at: Utc::now(),
                                        payload_hash: hash_value(&envelope_value) };
        if !self.receipts.try_record(receipt) {
            return Ok(CallbackDisposition::DuplicateIgnored);
        }

        let step = workflow.step_at(pos).ok_or(CoreRunError::InvalidStepIndex)?;
        let slot = &instance.steps[pos];
        let mut findings = slot.pre_findings.clone();
        findings.extend(envelope.findings
                                .iter()
                                .map(|f| Finding { severity: f.severity,
                                                   message: f.message.clone(),
                                                   path: f.path.clone(),
                                                   step_index: Some(slot.step_index) }));

        match envelope.status {
            JobStatus::Error => {
                let category = envelope.error_category.unwrap_or(ErrorCategory::RuntimeError);
                self.append_step_finished(run_id, workflow, step, StepOutcome::Failed, Some(category), findings,
                                          Value::Null);
            }
            JobStatus::Success => {
                let output_value = Value::Object(envelope.output_signals
                                                         .iter()
                                                         .map(|(k, v)| (k.clone(), v.clone()))
                                                         .collect::<Map<String, Value>>());
                let output_tree = PayloadTree::Tree(output_value);
                let outputs = resolve_signal_set(step.validator().signals(), SignalStage::Output, &output_tree);
                // el espacio visible post es del paso actual: sus señales de
                // entrada (re-resueltas, la resolución es pura) más sus
                // salidas; nunca señales de pasos anteriores
                let inputs = resolve_signal_set(step.validator().signals(), SignalStage::Input, payload);
                let combined = merge_signals(&inputs, &outputs);
                let post = evaluate_phase(SignalStage::Output,
                                          step.validator().default_assertions(),
                                          step.assertions(),
                                          step.validator().signals(),
                                          &combined,
                                          self.config.eval_budget);
                findings.extend(post.findings.into_iter().map(|f| f.at_step(slot.step_index)));
                let outcome = if post.blocking_failure { StepOutcome::Failed } else { StepOutcome::Passed };
                self.append_step_finished(run_id, workflow, step, outcome, None, findings, signals_to_value(&outputs));
            }
        }

        self.advance_until_blocked(run_id, payload, workflow)?;
        Ok(CallbackDisposition::Accepted)
    }

    /// Cierra por timeout el paso en vuelo si su deadline ya venció.
    /// Devuelve el progreso resultante, o None si no había nada vencido.
    pub fn expire_overdue(&mut self,
                          run_id: Uuid,
                          now: DateTime<Utc>,
                          payload: &PayloadTree,
                          workflow: &Workflow)
                          -> Result<Option<RunProgress>, CoreRunError> {
        let instance = self.load(run_id, workflow)?;
        if instance.is_terminal() {
            return Ok(None);
        }
        let pos = match instance.awaiting_position() {
            Some(pos) => pos,
            None => return Ok(None),
        };
        let slot = &instance.steps[pos];
        let overdue = matches!(slot.deadline, Some(deadline) if deadline < now);
        if !overdue {
            return Ok(None);
        }
        let step = workflow.step_at(pos).ok_or(CoreRunError::InvalidStepIndex)?;
        let mut findings = slot.pre_findings.clone();
        findings.push(Finding::error(format!("no callback before deadline for validator '{}'", slot.validator_id),
                                     format!("step:{}", slot.step_index)).at_step(slot.step_index));
        self.append_step_finished(run_id, workflow, step, StepOutcome::Failed, Some(ErrorCategory::Timeout), findings,
                                  Value::Null);
        let progress = self.advance_until_blocked(run_id, payload, workflow)?;
        Ok(Some(progress))
    }

    /// Lista eventos de un run (orden ascendente por seq).
    pub fn events_for(&self, run_id: Uuid) -> Vec<RunEvent> {
        self.event_store.list(run_id)
    }

    /// Variante compacta de eventos, útil en tests y diagnóstico.
    pub fn event_variants(&self, run_id: Uuid) -> Vec<&'static str> {
        self.events_for(run_id)
            .iter()
            .map(|e| match e.kind {
                RunEventKind::RunInitialized { .. } => "I",
                RunEventKind::StepStarted { .. } => "S",
                RunEventKind::StepDispatched { .. } => "D",
                RunEventKind::StepFinished { .. } => "F",
                RunEventKind::StepSkipped { .. } => "K",
                RunEventKind::CancelRequested { .. } => "X",
                RunEventKind::RunFinished { .. } => "C",
            })
            .collect()
    }

    /// Recibo registrado para un callback, si existe.
    pub fn receipt_for(&self, callback_id: Uuid) -> Option<CallbackReceipt> {
        self.receipts.get(callback_id)
    }

    // ---------------------------------------------------------------
    // Avance interno
    // ---------------------------------------------------------------

    fn load(&self, run_id: Uuid, workflow: &Workflow) -> Result<RunInstance, CoreRunError> {
        let events = self.event_store.list(run_id);
        if events.is_empty() {
            return Err(CoreRunError::RunNotFound);
        }
        let instance = self.repository.load(run_id, &events, workflow);
        if instance.workflow_hash != workflow.definition_hash() {
            return Err(CoreRunError::WorkflowMismatch);
        }
        Ok(instance)
    }

    /// Procesa pasos en orden ascendente hasta terminar, quedar suspendido
    /// en un despacho, o agotar pasos por cortocircuito.
    fn advance_until_blocked(&mut self,
                             run_id: Uuid,
                             payload: &PayloadTree,
                             workflow: &Workflow)
                             -> Result<RunProgress, CoreRunError> {
        loop {
            let instance = self.load(run_id, workflow)?;
            if instance.is_terminal() {
                return Ok(RunProgress::Completed(instance.status));
            }
            if let Some(pos) = instance.awaiting_position() {
                let slot = &instance.steps[pos];
                if let Some(callback_id) = slot.callback_id {
                    return Ok(RunProgress::AwaitingCallback { step_index: slot.step_index,
                                                              callback_id });
                }
                return Err(CoreRunError::Internal("awaiting step without callback id".to_string()));
            }
            if instance.cancel_requested || instance.halted(workflow) {
                let reason = if instance.cancel_requested { "run canceled" } else { "prior blocking failure" };
                self.skip_remaining(run_id, &instance, reason);
                self.finish_run(run_id, workflow);
                continue;
            }
            if instance.cursor >= instance.steps.len() {
                self.finish_run(run_id, workflow);
                continue;
            }
            self.process_step(run_id, &instance, instance.cursor, payload, workflow)?;
        }
    }

    /// Ejecuta (o despacha) el paso en la posición `pos`.
    fn process_step(&mut self,
                    run_id: Uuid,
                    instance: &RunInstance,
                    pos: usize,
                    payload: &PayloadTree,
                    workflow: &Workflow)
                    -> Result<(), CoreRunError> {
        let step = workflow.step_at(pos).ok_or(CoreRunError::InvalidStepIndex)?;
        let validator = step.validator();
        let step_index = step.step_index();

        self.event_store.append_kind(run_id,
                                     RunEventKind::StepStarted { step_index,
                                                                 validator_id: validator.id().to_string() });

        // resolver señales de entrada y evaluar la fase previa
        let inputs = resolve_signal_set(validator.signals(), SignalStage::Input, payload);
        let pre = evaluate_phase(SignalStage::Input,
                                 validator.default_assertions(),
                                 step.assertions(),
                                 validator.signals(),
                                 &inputs,
                                 self.config.eval_budget);
        let pre_findings: Vec<Finding> = pre.findings.into_iter().map(|f| f.at_step(step_index)).collect();

        // cortocircuito: con fallo bloqueante previo no se despacha ni
        // ejecuta nada
        if pre.blocking_failure {
            self.append_step_finished(run_id, workflow, step, StepOutcome::Failed, None, pre_findings, Value::Null);
            return Ok(());
        }

        match validator.execution_mode() {
            ExecutionMode::Local => self.run_local_step(run_id, workflow, step, payload, &inputs, pre_findings),
            ExecutionMode::Dispatched => {
                self.dispatch_step(run_id, instance, workflow, step, &inputs, pre_findings);
            }
        }
        Ok(())
    }

    fn run_local_step(&mut self,
                      run_id: Uuid,
                      workflow: &Workflow,
                      step: &WorkflowStep,
                      payload: &PayloadTree,
                      inputs: &ResolvedSignals,
                      mut findings: Vec<Finding>) {
        let validator = step.validator();
        let step_index = step.step_index();
        let request = ExecutionRequest { validator,
                                         payload,
                                         input_signals: inputs };
        match self.executor.execute(&request) {
            Ok(report) => {
                let report_findings: Vec<Finding> =
                    report.findings.into_iter().map(|f| f.at_step(step_index)).collect();
                // un hallazgo ERROR del propio validador falla el paso; los
                // de la fase previa ya pasaron la política de bloqueo
                let executor_failed = report_findings.iter().any(|f| f.severity == Severity::Error);
                findings.extend(report_findings);
                let output_tree = PayloadTree::Tree(report.output_payload);
                let outputs = resolve_signal_set(validator.signals(), SignalStage::Output, &output_tree);
                // post ve entradas + salidas del paso actual, nada de pasos
                // anteriores
                let combined = merge_signals(inputs, &outputs);
                let post = evaluate_phase(SignalStage::Output,
                                          validator.default_assertions(),
                                          step.assertions(),
                                          validator.signals(),
                                          &combined,
                                          self.config.eval_budget);
                findings.extend(post.findings.into_iter().map(|f| f.at_step(step_index)));
                let outcome = if post.blocking_failure || executor_failed {
                    StepOutcome::Failed
                } else {
                    StepOutcome::Passed
                };
                self.append_step_finished(run_id, workflow, step, outcome, None, findings, signals_to_value(&outputs));
            }
            Err(ExecutionError::Crashed(detail)) => {
                findings.push(Finding::error(format!("validator '{}' crashed: {detail}", validator.id()),
                                             format!("step:{step_index}")).at_step(step_index));
                self.append_step_finished(run_id, workflow, step, StepOutcome::Failed,
                                          Some(ErrorCategory::ValidationException), findings, Value::Null);
            }
            Err(ExecutionError::UnsupportedKind(kind)) => {
                findings.push(Finding::error(format!("no local executor for validator kind '{kind}'"),
                                             format!("step:{step_index}")).at_step(step_index));
                self.append_step_finished(run_id, workflow, step, StepOutcome::Failed, Some(ErrorCategory::SystemError),
                                          findings, Value::Null);
            }
        }
    }

    fn dispatch_step(&mut self,
                     run_id: Uuid,
                     instance: &RunInstance,
                     workflow: &Workflow,
                     step: &WorkflowStep,
                     inputs: &ResolvedSignals,
                     mut pre_findings: Vec<Finding>) {
        let validator = step.validator();
        let step_index = step.step_index();
        let callback_id = Uuid::new_v4();
        let deadline = Utc::now() + Duration::seconds(self.config.deadline_secs);
        let input_ref = storage_input_ref(run_id, step_index);
        let output_ref = storage_output_ref(run_id, step_index);

        let envelope = InputEnvelope { envelope_version: ENVELOPE_VERSION,
                                       run_correlation_id: instance.correlation_id.clone(),
                                       callback_id,
                                       step_index,
                                       validator_id: validator.id().to_string(),
                                       signals: inputs.iter()
                                                      .filter_map(|(slug, slot)| match slot {
                                                          Resolved::Value(v) => Some((slug.clone(), v.clone())),
                                                          Resolved::NotFound => None,
                                                      })
                                                      .collect(),
                                       storage_input_ref: input_ref.clone(),
                                       storage_output_ref: output_ref.clone(),
                                       deadline };

        match self.dispatcher.dispatch(&envelope) {
            Ok(_handle) => {
                self.event_store.append_kind(run_id,
                                             RunEventKind::StepDispatched { step_index,
                                                                            validator_id: validator.id().to_string(),
                                                                            callback_id,
                                                                            input_ref,
                                                                            output_ref,
                                                                            deadline,
                                                                            pre_findings });
            }
            Err(e) => {
                // rechazo del sustrato: SYSTEM_ERROR, sin reintento
                // automático; un operador debe re-enviar
                pre_findings.push(Finding::error(format!("dispatch rejected: {e}"), format!("step:{step_index}"))
                                          .at_step(step_index));
                self.append_step_finished(run_id, workflow, step, StepOutcome::Failed,
                                          Some(ErrorCategory::SystemError), pre_findings, Value::Null);
            }
        }
    }

    fn skip_remaining(&mut self, run_id: Uuid, instance: &RunInstance, reason: &str) {
        for slot in instance.steps.iter().filter(|s| !s.state.is_terminal() && !s.awaiting_callback()) {
            self.event_store.append_kind(run_id,
                                         RunEventKind::StepSkipped { step_index: slot.step_index,
                                                                     validator_id: slot.validator_id.clone(),
                                                                     reason: reason.to_string() });
        }
    }

    fn finish_run(&mut self, run_id: Uuid, workflow: &Workflow) {
        let instance = self.repository.load(run_id, &self.event_store.list(run_id), workflow);
        if instance.is_terminal() {
            return;
        }
        let status = instance.derive_final_status();
        let step_digests: Vec<String> = self.event_store
                                            .list(run_id)
                                            .iter()
                                            .filter_map(|e| match &e.kind {
                                                RunEventKind::StepFinished { digest, .. } => Some(digest.clone()),
                                                _ => None,
                                            })
                                            .collect();
        let run_digest = hash_value(&json!({
                                        "core_version": CORE_VERSION,
                                        "workflow_hash": workflow.definition_hash(),
                                        "step_digests": step_digests,
                                    }));
        self.event_store.append_kind(run_id, RunEventKind::RunFinished { status, run_digest });
    }

    fn append_step_finished(&mut self,
                            run_id: Uuid,
                            workflow: &Workflow,
                            step: &WorkflowStep,
                            outcome: StepOutcome,
                            error_category: Option<ErrorCategory>,
                            findings: Vec<Finding>,
                            output_signals: Value) {
        let digest = hash_value(&json!({
                                    "core_version": CORE_VERSION,
                                    "workflow_hash": workflow.definition_hash(),
                                    "step_index": step.step_index(),
                                    "outcome": outcome,
                                    "error_category": error_category,
                                    "output_signals": output_signals,
                                }));
        self.event_store.append_kind(run_id,
                                     RunEventKind::StepFinished { step_index: step.step_index(),
                                                                  validator_id: step.validator().id().to_string(),
                                                                  outcome,
                                                                  error_category,
                                                                  findings,
                                                                  output_signals,
                                                                  digest });
    }
}

/// Une señales de entrada y salida en un solo espacio; ante slug repetido
/// gana la salida.
fn merge_signals(inputs: &ResolvedSignals, outputs: &ResolvedSignals) -> ResolvedSignals {
    let mut combined = inputs.clone();
    for (slug, slot) in outputs {
        combined.insert(slug.clone(), slot.clone());
    }
    combined
}

/// Proyección de señales resueltas a un objeto JSON (sólo las encontradas).
fn signals_to_value(resolved: &ResolvedSignals) -> Value {
    Value::Object(resolved.iter()
                          .filter_map(|(slug, slot)| match slot {
                              Resolved::Value(v) => Some((slug.clone(), v.clone())),
                              Resolved::NotFound => None,
                          })
                          .collect::<Map<String, Value>>())
}
