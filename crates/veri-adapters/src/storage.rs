//! Layout de almacenamiento con alcance de run.
//!
//! El aprovisionamiento del bucket es de un colaborador externo; este
//! módulo sólo materializa la convención de rutas
//! `runs/{run_id}/{input|output}/{step}/...` sobre un directorio raíz y
//! deja constancia del sha256 de lo escrito, para que el job externo pueda
//! verificar lo que lee.

use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("stored payload is not valid JSON: {0}")]
    Json(String),
}

/// Raíz local del layout de storage.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Ruta absoluta de una referencia de storage del core.
    pub fn resolve_ref(&self, storage_ref: &str) -> PathBuf {
        self.root.join(storage_ref)
    }

    /// Escribe un payload JSON bajo la referencia dada y devuelve el sha256
    /// (hex) de los bytes escritos.
    pub fn write_payload(&self, storage_ref: &str, payload: &serde_json::Value) -> Result<String, StorageError> {
        let path = self.resolve_ref(storage_ref);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| StorageError::Io { path: parent.display().to_string(),
                                                                      source: e })?;
        }
        let bytes = serde_json::to_vec_pretty(payload).map_err(|e| StorageError::Json(e.to_string()))?;
        fs::write(&path, &bytes).map_err(|e| StorageError::Io { path: path.display().to_string(),
                                                                source: e })?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Lee un payload JSON desde la referencia dada.
    pub fn read_payload(&self, storage_ref: &str) -> Result<serde_json::Value, StorageError> {
        let path = self.resolve_ref(storage_ref);
        let bytes = fs::read(&path).map_err(|e| StorageError::Io { path: path.display().to_string(),
                                                                   source: e })?;
        serde_json::from_slice(&bytes).map_err(|e| StorageError::Json(e.to_string()))
    }
}
