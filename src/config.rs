//! Configuración central de la aplicación.
//! Carga variables de entorno (.env) y expone una estructura inmutable
//! (`CONFIG`) con los parámetros del servicio: raíz de storage, plazos de
//! despacho y presupuesto de evaluación.
use once_cell::sync::Lazy;
use std::env;
use std::path::PathBuf;

/// Configuración global de la aplicación.
pub struct AppConfig {
    /// Raíz local del layout de storage `runs/{run_id}/...`.
    pub storage_root: PathBuf,
    /// Plazo (segundos) entre despacho y deadline de un job.
    pub deadline_secs: i64,
    /// Presupuesto de pasos de evaluación para expresiones.
    pub eval_budget: u32,
    /// Intervalo (segundos) del barrido de deadlines.
    pub sweep_interval_secs: u64,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Instancia global perezosa de configuración, evaluada una sola vez.
pub static CONFIG: Lazy<AppConfig> = Lazy::new(|| {
    let _ = dotenvy::dotenv();
    AppConfig { storage_root: env::var("VERIFLOW_STORAGE_ROOT").map(PathBuf::from)
                                                               .unwrap_or_else(|_| PathBuf::from("./veriflow-storage")),
                deadline_secs: env_parse("VERIFLOW_DEADLINE_SECS", 900),
                eval_budget: env_parse("VERIFLOW_EVAL_BUDGET", 10_000),
                sweep_interval_secs: env_parse("VERIFLOW_SWEEP_INTERVAL_SECS", 5) }
});
