//! Carga de configuración de persistencia desde variables de entorno.
//! Usa convención `VERIFLOW_DATA_DIR` para la raíz del log de runs.

use dotenvy::dotenv;
use once_cell::sync::Lazy;
use std::env;
use std::path::PathBuf;

// Carga perezosa del archivo .env una sola vez.
static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenv(); // ignora error si no existe .env
});

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directorio raíz del backend de archivos (logs de eventos y recibos).
    pub data_dir: PathBuf,
}

impl StoreConfig {
    pub fn from_env() -> Self {
        // asegura que .env se haya cargado
        Lazy::force(&DOTENV_LOADED);
        let data_dir = env::var("VERIFLOW_DATA_DIR").map(PathBuf::from)
                                                    .unwrap_or_else(|_| PathBuf::from("./veriflow-data"));
        Self { data_dir }
    }
}

/// Forzar carga temprana de .env desde aplicaciones externas si se desea.
pub fn init_dotenv() {
    Lazy::force(&DOTENV_LOADED);
}
