//! VeriFlow Rust Library
//!
//! Este crate actúa como la capa de servicio de VeriFlow:
//! - Expone `config` con la configuración de entorno del proceso.
//! - Expone `service` con el `RunService` (un escritor, celdas por run).
//! - Expone `substrate` con el seam asíncrono hacia el sustrato de cómputo
//!   y su emulación local.
//!
//! El núcleo de ejecución vive en `veri-core`; la configuración autorada en
//! `veri-domain`; los ejecutores e ingesta en `veri-adapters`; el backend
//! durable en `veri-persistence`.

pub mod config;
pub mod service;
pub mod substrate;

pub use service::{RunService, RunSnapshot, ServiceConfig, ServiceError, StepSnapshot};
pub use substrate::{LocalSubstrate, SubstrateClient, SubstrateError};
