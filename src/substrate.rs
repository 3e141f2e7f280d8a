//! Cliente del sustrato de cómputo y emulación local asíncrona.
//!
//! `SubstrateClient` es el seam asíncrono del servicio: entregar un sobre de
//! entrada al sustrato que ejecuta validadores en contenedores aislados.
//! `LocalSubstrate` lo implementa en proceso con tareas tokio: simula
//! latencia, materializa el layout de storage y devuelve el sobre de salida
//! por un canal mpsc hacia la bomba de callbacks del servicio. Con entrega
//! duplicada activada reenvía cada sobre dos veces, para ejercitar la
//! semántica at-least-once del receptor.

use async_trait::async_trait;
use log::warn;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};

use veri_adapters::{LocalJobRunner, StorageLayout};
use veri_core::{InputEnvelope, OutputEnvelope};

#[derive(Debug, Error)]
pub enum SubstrateError {
    #[error("substrate rejected the envelope: {0}")]
    Rejected(String),
    #[error("substrate unavailable: {0}")]
    Unavailable(String),
}

/// Entrega asíncrona de sobres al sustrato externo.
#[async_trait]
pub trait SubstrateClient: Send + Sync {
    async fn submit(&self, envelope: InputEnvelope) -> Result<(), SubstrateError>;
}

/// Sustrato local en proceso.
pub struct LocalSubstrate {
    callback_tx: mpsc::Sender<OutputEnvelope>,
    /// Comportamiento por validador; los no listados usan `default_runner`.
    runners: HashMap<String, LocalJobRunner>,
    default_runner: LocalJobRunner,
    storage: Option<StorageLayout>,
    latency: Duration,
    duplicate_delivery: bool,
}

impl LocalSubstrate {
    pub fn new(callback_tx: mpsc::Sender<OutputEnvelope>, default_runner: LocalJobRunner) -> Self {
        Self { callback_tx,
               runners: HashMap::new(),
               default_runner,
               storage: None,
               latency: Duration::from_millis(25),
               duplicate_delivery: false }
    }

    /// Comportamiento específico para un validador.
    pub fn with_runner(mut self, validator_id: impl Into<String>, runner: LocalJobRunner) -> Self {
        self.runners.insert(validator_id.into(), runner);
        self
    }

    /// Materializa input/output bajo el layout de storage dado.
    pub fn with_storage(mut self, storage: StorageLayout) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Reenvía cada sobre de salida dos veces (at-least-once).
    pub fn with_duplicate_delivery(mut self) -> Self {
        self.duplicate_delivery = true;
        self
    }
}

#[async_trait]
impl SubstrateClient for LocalSubstrate {
    async fn submit(&self, envelope: InputEnvelope) -> Result<(), SubstrateError> {
        let runner = self.runners
                         .get(&envelope.validator_id)
                         .unwrap_or(&self.default_runner)
                         .clone();
        let tx = self.callback_tx.clone();
        let storage = self.storage.clone();
        let latency = self.latency;
        let duplicate = self.duplicate_delivery;

        tokio::spawn(async move {
            if let Some(layout) = &storage {
                let signals = serde_json::json!({ "signals": envelope.signals });
                if let Err(e) = layout.write_payload(&envelope.storage_input_ref, &signals) {
                    warn!("substrate: cannot write input payload for {}: {e}", envelope.callback_id);
                }
            }
            sleep(latency).await;
            let Some(out) = runner.run(&envelope) else {
                // job silencioso: el deadline del motor lo cerrará
                return;
            };
            if let Some(layout) = &storage {
                if let Ok(value) = serde_json::to_value(&out) {
                    if let Err(e) = layout.write_payload(&envelope.storage_output_ref, &value) {
                        warn!("substrate: cannot write output payload for {}: {e}", envelope.callback_id);
                    }
                }
            }
            let deliveries = if duplicate { 2 } else { 1 };
            for _ in 0..deliveries {
                if tx.send(out.clone()).await.is_err() {
                    warn!("substrate: callback channel closed, dropping {}", out.callback_id);
                    return;
                }
            }
        });
        Ok(())
    }
}
