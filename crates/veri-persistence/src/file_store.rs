//! Stores durables sobre JSON Lines.
//!
//! Un archivo por run (`runs/{run_id}.jsonl`, un evento por línea, seq
//! ascendente) y un libro de recibos (`receipts.jsonl`). El replay de un
//! log reconstruye el run completo, incluido el estado de espera de
//! callback de un paso despachado: los runs en vuelo sobreviven reinicios
//! del proceso.
//!
//! Política de fallos: igual que el resto de stores, el contrato del trait
//! es infalible; un error de IO irrecuperable se loguea y aborta (no hay
//! estado razonable que devolver a un motor cuyo log no se puede escribir).
//! Una línea corrupta en lectura se loguea y se salta, para que un log
//! dañado parcialmente no inutilice el run entero.

use log::{debug, error, warn};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use chrono::Utc;
use veri_core::{CallbackReceipt, EventStore, ReceiptStore, RunEvent, RunEventKind};

use crate::error::PersistenceError;

/// `EventStore` durable sobre archivos JSONL.
#[derive(Debug)]
pub struct FileEventStore {
    runs_dir: PathBuf,
    /// Próximo seq por run, derivado del archivo al abrir.
    next_seq: HashMap<Uuid, u64>,
}

impl FileEventStore {
    /// Abre (o crea) el backend bajo `data_dir`.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let runs_dir = data_dir.as_ref().join("runs");
        fs::create_dir_all(&runs_dir).map_err(|e| PersistenceError::Io { path: runs_dir.display().to_string(),
                                                                         source: e })?;
        Ok(Self { runs_dir,
                  next_seq: HashMap::new() })
    }

    fn run_path(&self, run_id: Uuid) -> PathBuf {
        self.runs_dir.join(format!("{run_id}.jsonl"))
    }

    /// Ids de runs presentes en el backend (para reanudar tras reinicio).
    pub fn run_ids(&self) -> Vec<Uuid> {
        let entries = match fs::read_dir(&self.runs_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("run_ids: cannot read {}: {e}", self.runs_dir.display());
                return vec![];
            }
        };
        entries.filter_map(|entry| entry.ok())
               .filter_map(|entry| {
                   entry.path()
                        .file_stem()
                        .and_then(|stem| stem.to_str())
                        .and_then(|stem| Uuid::parse_str(stem).ok())
               })
               .collect()
    }

    fn read_events(&self, run_id: Uuid) -> Vec<RunEvent> {
        let path = self.run_path(run_id);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(_) => return vec![], // sin archivo: run desconocido
        };
        let mut events = Vec::new();
        for (lineno, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<RunEvent>(line) {
                Ok(ev) => events.push(ev),
                Err(e) => {
                    // línea dañada: se salta para no inutilizar el run
                    warn!("corrupt event at {}:{}: {e}", path.display(), lineno + 1);
                }
            }
        }
        events
    }

    fn try_append(&mut self, run_id: Uuid, kind: RunEventKind) -> Result<RunEvent, PersistenceError> {
        let seq = match self.next_seq.get(&run_id) {
            Some(seq) => *seq,
            None => self.read_events(run_id).len() as u64,
        };
        let ev = RunEvent { seq,
                            run_id,
                            kind,
                            ts: Utc::now() };
        let path = self.run_path(run_id);
        let mut file = OpenOptions::new().create(true)
                                         .append(true)
                                         .open(&path)
                                         .map_err(|e| PersistenceError::Io { path: path.display().to_string(),
                                                                             source: e })?;
        let mut line = serde_json::to_string(&ev)?;
        line.push('\n');
        file.write_all(line.as_bytes()).map_err(|e| PersistenceError::Io { path: path.display().to_string(),
                                                                           source: e })?;
        self.next_seq.insert(run_id, seq + 1);
        Ok(ev)
    }
}

impl EventStore for FileEventStore {
    fn append_kind(&mut self, run_id: Uuid, kind: RunEventKind) -> RunEvent {
        match self.try_append(run_id, kind) {
            Ok(ev) => {
                debug!("append_kind:done run_id={run_id} seq={}", ev.seq);
                ev
            }
            Err(e) => {
                error!("append_kind: unrecoverable io failure run_id={run_id}: {e}");
                panic!("append event to run log: {e}");
            }
        }
    }

    fn list(&self, run_id: Uuid) -> Vec<RunEvent> {
        self.read_events(run_id)
    }
}

/// `ReceiptStore` durable: un libro JSONL append-only.
#[derive(Debug)]
pub struct FileReceiptStore {
    path: PathBuf,
    seen: HashMap<Uuid, CallbackReceipt>,
}

impl FileReceiptStore {
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let dir = data_dir.as_ref();
        fs::create_dir_all(dir).map_err(|e| PersistenceError::Io { path: dir.display().to_string(),
                                                                   source: e })?;
        let path = dir.join("receipts.jsonl");
        let mut seen = HashMap::new();
        if let Ok(raw) = fs::read_to_string(&path) {
            for (lineno, line) in raw.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<CallbackReceipt>(line) {
                    Ok(receipt) => {
                        seen.insert(receipt.callback_id, receipt);
                    }
                    Err(e) => warn!("corrupt receipt at {}:{}: {e}", path.display(), lineno + 1),
                }
            }
        }
        Ok(Self { path, seen })
    }

    fn persist(&self, receipt: &CallbackReceipt) -> Result<(), PersistenceError> {
        let mut file = OpenOptions::new().create(true)
                                         .append(true)
                                         .open(&self.path)
                                         .map_err(|e| PersistenceError::Io { path: self.path.display().to_string(),
                                                                             source: e })?;
        let mut line = serde_json::to_string(receipt)?;
        line.push('\n');
        file.write_all(line.as_bytes()).map_err(|e| PersistenceError::Io { path: self.path.display().to_string(),
                                                                           source: e })
    }
}

impl ReceiptStore for FileReceiptStore {
    fn try_record(&mut self, receipt: CallbackReceipt) -> bool {
        if self.seen.contains_key(&receipt.callback_id) {
            return false;
        }
        // persistir antes de admitir: la guarda de idempotencia debe
        // sobrevivir a un reinicio entre recibo y aplicación
        if let Err(e) = self.persist(&receipt) {
            error!("try_record: unrecoverable io failure callback_id={}: {e}", receipt.callback_id);
            panic!("append callback receipt: {e}");
        }
        self.seen.insert(receipt.callback_id, receipt);
        true
    }

    fn contains(&self, callback_id: Uuid) -> bool {
        self.seen.contains_key(&callback_id)
    }

    fn get(&self, callback_id: Uuid) -> Option<CallbackReceipt> {
        self.seen.get(&callback_id).cloned()
    }
}
