//! Constantes del núcleo de ejecución.
//!
//! Valores estáticos que participan en el cálculo de digests y en la
//! compatibilidad del contrato de sobres. `CORE_VERSION` entra en el input
//! de hashing de cada paso: un cambio de versión del motor invalida los
//! digests aunque la definición y los datos no cambien.

/// Versión lógica del motor. Mantener estable mientras no haya cambios
/// incompatibles en el cálculo de digests.
pub const CORE_VERSION: &str = "V1.0";

/// Versión del contrato de sobres intercambiados con el sustrato externo.
/// Un sobre de salida con otra versión se rechaza sin mutar estado.
pub const ENVELOPE_VERSION: u32 = 1;

/// Presupuesto por defecto de pasos de evaluación para la forma expresión.
/// Defiende al evaluador de expresiones patológicas; agotarlo produce un
/// resultado ERROR, nunca FAIL.
pub const DEFAULT_EVAL_BUDGET: u32 = 10_000;

/// Plazo por defecto (segundos) entre el despacho de un job y su deadline.
pub const DEFAULT_DEADLINE_SECS: i64 = 900;
