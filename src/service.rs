//! Servicio de ejecución de runs.
//!
//! `RunService` es el único escritor del estado de runs (la restricción de
//! despliegue es una réplica única del servicio, o elección de líder por
//! fuera). Modelo de concurrencia:
//! - una celda `Mutex` por run: los callbacks de un mismo run se aplican en
//!   serie, protegiendo la agregación "último paso cierra el run";
//! - runs distintos viven en celdas distintas de un `DashMap` y procesan en
//!   paralelo sin estado mutable compartido;
//! - un índice `callback_id -> run_id` enruta sobres de salida a su celda.
//!
//! Los rechazos de callback se loguean con el `run_correlation_id` y no
//! mutan nada.

use dashmap::DashMap;
use log::{info, warn};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use veri_adapters::{parse_submission, IngestError, KindExecutor, QueueDispatcher};
use veri_core::{CallbackDisposition, CoreRunError, EngineConfig, ErrorCategory, Finding, InMemoryEventStore,
                InMemoryReceiptStore, InputEnvelope, OutputEnvelope, PayloadTree, RejectReason, ReplayRunRepository,
                RunEngine, RunEvent, RunStatus, StepState};
use veri_domain::{DomainError, Submission, Workflow};

use crate::substrate::SubstrateClient;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("run not found")]
    RunNotFound,
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Core(#[from] CoreRunError),
}

/// Parámetros del servicio (se propagan al motor de cada run).
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub deadline_secs: i64,
    pub eval_budget: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self { deadline_secs: veri_core::constants::DEFAULT_DEADLINE_SECS,
               eval_budget: veri_core::constants::DEFAULT_EVAL_BUDGET }
    }
}

/// Vista serializable del estado de un run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSnapshot {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub correlation_id: String,
    pub steps: Vec<StepSnapshot>,
    pub findings: Vec<Finding>,
    pub duration_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepSnapshot {
    pub step_index: u32,
    pub validator_id: String,
    pub state: StepState,
    pub error_category: Option<ErrorCategory>,
}

type CellEngine = RunEngine<InMemoryEventStore, ReplayRunRepository, InMemoryReceiptStore>;

/// Estado exclusivo de un run: motor, definición y payload parseado.
struct RunCell {
    engine: CellEngine,
    queue: veri_adapters::EnvelopeQueue,
    workflow: Workflow,
    payload: PayloadTree,
    correlation_id: String,
}

pub struct RunService {
    cells: DashMap<Uuid, Arc<Mutex<RunCell>>>,
    routes: DashMap<Uuid, Uuid>,
    substrate: Arc<dyn SubstrateClient>,
    config: ServiceConfig,
}

impl RunService {
    pub fn new(substrate: Arc<dyn SubstrateClient>, config: ServiceConfig) -> Arc<Self> {
        Arc::new(Self { cells: DashMap::new(),
                        routes: DashMap::new(),
                        substrate,
                        config })
    }

    /// Lanza un run del workflow sobre la entrega. Devuelve el run_id con el
    /// run ya avanzado hasta su primer punto de suspensión (o terminal).
    pub async fn launch_run(&self, submission: &Submission, workflow: Workflow) -> Result<Uuid, ServiceError> {
        let payload = parse_submission(submission)?;

        let mut engine = RunEngine::in_memory();
        engine.set_executor(Box::new(KindExecutor));
        let dispatcher = QueueDispatcher::new();
        let queue = dispatcher.queue();
        engine.set_dispatcher(Box::new(dispatcher));
        engine.set_config(EngineConfig { deadline_secs: self.config.deadline_secs,
                                         eval_budget: self.config.eval_budget });

        let correlation_id = submission.id().simple().to_string();
        let mut cell = RunCell { engine,
                                 queue,
                                 workflow,
                                 payload,
                                 correlation_id: correlation_id.clone() };

        let (run_id, _progress) = cell.engine.launch(&cell.payload, &cell.workflow, Some(correlation_id),
                                                     submission.checksum())?;
        let pending = drain_queue(&cell.queue);
        self.cells.insert(run_id, Arc::new(Mutex::new(cell)));
        self.submit_envelopes(run_id, pending).await;
        info!("launched run {run_id}");
        Ok(run_id)
    }

    pub async fn get_run(&self, run_id: Uuid) -> Result<RunSnapshot, ServiceError> {
        let cell = self.cell(run_id)?;
        let cell = cell.lock().await;
        let instance = cell.engine.snapshot(run_id, &cell.workflow)?;
        Ok(snapshot_from(&instance))
    }

    /// Log de eventos del run (diagnóstico y demo).
    pub async fn event_log(&self, run_id: Uuid) -> Result<Vec<RunEvent>, ServiceError> {
        let cell = self.cell(run_id)?;
        let cell = cell.lock().await;
        Ok(cell.engine.events_for(run_id))
    }

    /// Cancela: inmediato sin despacho en vuelo; con uno, registra la
    /// intención y el siguiente callback o vencimiento finaliza CANCELED.
    pub async fn cancel_run(&self, run_id: Uuid, reason: Option<String>) -> Result<RunStatus, ServiceError> {
        let cell = self.cell(run_id)?;
        let mut cell = cell.lock().await;
        let RunCell { engine,
                      workflow,
                      payload,
                      .. } = &mut *cell;
        Ok(engine.cancel(run_id, payload, workflow, reason)?)
    }

    /// Aplica un sobre de salida. Seguro frente a entregas repetidas y
    /// callbacks tardíos; serializado por run, paralelo entre runs.
    pub async fn handle_callback(&self, envelope: OutputEnvelope) -> CallbackDisposition {
        let run_id = match self.routes.get(&envelope.callback_id) {
            Some(entry) => *entry.value(),
            None => {
                warn!("callback {} has no matching dispatch record", envelope.callback_id);
                return CallbackDisposition::Rejected { reason: RejectReason::UnknownCallback };
            }
        };
        let cell = match self.cell(run_id) {
            Ok(cell) => cell,
            Err(_) => {
                warn!("callback {} routed to unknown run {run_id}", envelope.callback_id);
                return CallbackDisposition::Rejected { reason: RejectReason::UnknownCallback };
            }
        };
        let mut cell = cell.lock().await;
        let RunCell { engine,
                      queue,
                      workflow,
                      payload,
                      correlation_id } = &mut *cell;
        let disposition = match engine.handle_callback(run_id, &envelope, payload, workflow) {
            Ok(disposition) => disposition,
            Err(e) => {
                warn!("callback {} for run {run_id} (correlation {correlation_id}) errored: {e}",
                      envelope.callback_id);
                return CallbackDisposition::Rejected { reason: RejectReason::SchemaInvalid { detail: e.to_string() } };
            }
        };
        match &disposition {
            CallbackDisposition::Accepted => {}
            CallbackDisposition::DuplicateIgnored => {
                info!("duplicate callback {} absorbed (correlation {correlation_id})", envelope.callback_id);
            }
            CallbackDisposition::Rejected { reason } => {
                warn!("callback {} rejected: {reason:?} (correlation {correlation_id})", envelope.callback_id);
            }
        }
        let pending = drain_queue(queue);
        drop(cell);
        self.submit_envelopes(run_id, pending).await;
        disposition
    }

    /// Barrido de deadlines sobre todos los runs vivos.
    pub async fn expire_overdue(&self) -> usize {
        let now = chrono::Utc::now();
        let run_ids: Vec<Uuid> = self.cells.iter().map(|entry| *entry.key()).collect();
        let mut expired = 0;
        for run_id in run_ids {
            let Ok(cell) = self.cell(run_id) else { continue };
            let mut cell = cell.lock().await;
            let RunCell { engine,
                          queue,
                          workflow,
                          payload,
                          .. } = &mut *cell;
            match engine.expire_overdue(run_id, now, payload, workflow) {
                Ok(Some(_)) => expired += 1,
                Ok(None) => {}
                Err(e) => warn!("deadline sweep failed for run {run_id}: {e}"),
            }
            let pending = drain_queue(queue);
            drop(cell);
            self.submit_envelopes(run_id, pending).await;
        }
        expired
    }

    /// Bomba de callbacks: consume el canal del sustrato hasta que se cierre.
    pub fn spawn_callback_pump(self: Arc<Self>, mut rx: mpsc::Receiver<OutputEnvelope>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                let _ = self.handle_callback(envelope).await;
            }
        })
    }

    /// Barrido periódico de deadlines.
    pub fn spawn_deadline_sweeper(self: Arc<Self>, every: std::time::Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                self.expire_overdue().await;
            }
        })
    }

    fn cell(&self, run_id: Uuid) -> Result<Arc<Mutex<RunCell>>, ServiceError> {
        self.cells
            .get(&run_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(ServiceError::RunNotFound)
    }

    /// Registra rutas y entrega los sobres drenados al sustrato. Si la
    /// entrega asíncrona falla no hay vuelta atrás del StepDispatched ya
    /// registrado: el deadline cerrará el paso por TIMEOUT.
    async fn submit_envelopes(&self, run_id: Uuid, envelopes: Vec<InputEnvelope>) {
        for envelope in envelopes {
            self.routes.insert(envelope.callback_id, run_id);
            if let Err(e) = self.substrate.submit(envelope).await {
                warn!("substrate submit failed for run {run_id}: {e}");
            }
        }
    }
}

fn drain_queue(queue: &veri_adapters::EnvelopeQueue) -> Vec<InputEnvelope> {
    match queue.lock() {
        Ok(mut queue) => queue.drain(..).collect(),
        Err(_) => vec![],
    }
}

fn snapshot_from(instance: &veri_core::RunInstance) -> RunSnapshot {
    RunSnapshot { run_id: instance.id,
                  status: instance.status,
                  correlation_id: instance.correlation_id.clone(),
                  steps: instance.steps
                                 .iter()
                                 .map(|s| StepSnapshot { step_index: s.step_index,
                                                         validator_id: s.validator_id.clone(),
                                                         state: s.state,
                                                         error_category: s.error_category })
                                 .collect(),
                  findings: instance.findings.clone(),
                  duration_ms: instance.duration().map(|d| d.num_milliseconds()) }
}
