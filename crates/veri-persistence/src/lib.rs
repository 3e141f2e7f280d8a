//! veri-persistence: backend durable para el log de runs y los recibos.
//!
//! Implementa los traits de almacenamiento de `veri-core` sobre archivos
//! JSON Lines. La arquitectura de replay del core hace el resto: reabrir el
//! backend y re-listar eventos reconstruye cualquier run, incluidos los
//! suspendidos a la espera de callback.

pub mod config;
pub mod error;
pub mod file_store;

pub use config::{init_dotenv, StoreConfig};
pub use error::PersistenceError;
pub use file_store::{FileEventStore, FileReceiptStore};

use veri_core::{ReplayRunRepository, RunEngine};

/// Motor respaldado por archivos bajo `data_dir`.
pub type FileBackedEngine = RunEngine<FileEventStore, ReplayRunRepository, FileReceiptStore>;

/// Construye un motor durable con el layout estándar del backend.
pub fn build_file_engine(config: &StoreConfig) -> Result<FileBackedEngine, PersistenceError> {
    let events = FileEventStore::open(&config.data_dir)?;
    let receipts = FileReceiptStore::open(&config.data_dir)?;
    Ok(RunEngine::new_with_stores(events, ReplayRunRepository::new(), receipts))
}
