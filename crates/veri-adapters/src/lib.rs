//! veri-adapters: ingesta, ejecutores locales y emulación del sustrato.

pub mod executors;
pub mod ingest;
pub mod markup;
pub mod storage;
pub mod substrate;

pub use executors::KindExecutor;
pub use ingest::{parse_submission, IngestError};
pub use markup::{parse_markup, MarkupError};
pub use storage::{StorageError, StorageLayout};
pub use substrate::{EnvelopeQueue, JobBehavior, LocalJobRunner, QueueDispatcher, RejectingDispatcher};
