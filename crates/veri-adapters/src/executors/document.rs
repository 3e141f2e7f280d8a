//! Verificación estructural de documentos-árbol.

use serde_json::json;
use veri_core::{resolve, ExecutionReport, Finding, PayloadTree};

/// Comprueba presencia de paths requeridos y ausencia de prohibidos.
pub fn document_check(payload: &PayloadTree, required_paths: &[String], forbidden_paths: &[String]) -> ExecutionReport {
    let mut findings = Vec::new();
    let mut missing = Vec::new();
    let mut present_forbidden = Vec::new();

    for path in required_paths {
        if resolve(payload, path).is_not_found() {
            findings.push(Finding::error(format!("required path '{path}' is missing"), path.clone()));
            missing.push(path.clone());
        }
    }
    for path in forbidden_paths {
        if !resolve(payload, path).is_not_found() {
            findings.push(Finding::error(format!("forbidden path '{path}' is present"), path.clone()));
            present_forbidden.push(path.clone());
        }
    }

    ExecutionReport { output_payload: json!({
                          "checked_paths": required_paths.len() + forbidden_paths.len(),
                          "missing": missing,
                          "forbidden_present": present_forbidden,
                      }),
                      findings }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn passes_a_complete_document() {
        let payload = PayloadTree::Tree(json!({"building": {"name": "b1"}, "site_eui_kwh_m2": 120}));
        let report = document_check(&payload,
                                    &["building.name".to_string(), "site_eui_kwh_m2".to_string()],
                                    &["legacy_block".to_string()]);
        assert!(report.findings.is_empty());
    }

    #[test]
    fn reports_missing_and_forbidden() {
        let payload = PayloadTree::Tree(json!({"legacy_block": 1}));
        let report = document_check(&payload, &["building.name".to_string()], &["legacy_block".to_string()]);
        assert_eq!(report.findings.len(), 2);
    }
}
