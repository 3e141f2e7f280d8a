//! Métricas derivadas de un modelo energético de edificio.
//!
//! Suma los consumos por uso final y deriva la intensidad de uso de
//! energía (EUI) sobre el área de piso. Las métricas salen en el payload
//! de salida para que las señales de etapa Output del validador las
//! resuelvan y las aserciones posteriores las juzguen.

use serde_json::{json, Value};
use veri_core::{resolve, ExecutionReport, Finding, PayloadTree, Resolved};

fn as_number(value: &Value) -> Option<f64> {
    value.as_f64()
}

pub fn energy_model_check(payload: &PayloadTree, area_path: &str, end_use_paths: &[String]) -> ExecutionReport {
    let mut findings = Vec::new();

    let area = match resolve(payload, area_path) {
        Resolved::Value(v) => match as_number(&v) {
            Some(a) if a > 0.0 => Some(a),
            Some(_) => {
                findings.push(Finding::error("floor area must be positive", area_path));
                None
            }
            None => {
                findings.push(Finding::error("floor area is not a number", area_path));
                None
            }
        },
        Resolved::NotFound => {
            findings.push(Finding::error(format!("floor area path '{area_path}' is missing"), area_path));
            None
        }
    };

    let mut total = 0.0;
    for path in end_use_paths {
        match resolve(payload, path) {
            Resolved::Value(v) => match as_number(&v) {
                Some(kwh) => total += kwh,
                None => findings.push(Finding::error(format!("end use '{path}' is not a number"), path.clone())),
            },
            // un uso final ausente no invalida el modelo, pero queda avisado
            Resolved::NotFound => {
                findings.push(Finding::warning(format!("end use '{path}' missing, excluded from total"), path.clone()));
            }
        }
    }

    let mut output = serde_json::Map::new();
    output.insert("total_energy_kwh".to_string(), json!(total));
    if let Some(a) = area {
        output.insert("floor_area_m2".to_string(), json!(a));
        output.insert("site_eui_kwh_m2".to_string(), json!(total / a));
    }

    ExecutionReport { output_payload: Value::Object(output),
                      findings }
}
