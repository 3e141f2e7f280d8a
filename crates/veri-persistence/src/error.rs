//! Errores del backend de persistencia.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt record in {path}: {detail}")]
    Corrupt { path: String, detail: String },
    #[error("serialization: {0}")]
    Serde(#[from] serde_json::Error),
}
