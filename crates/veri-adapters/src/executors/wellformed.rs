//! Verificación de documentos de marcado.
//!
//! La buena formación la garantiza la ingesta (un documento malformado no
//! llega a ejecutar pasos); aquí se comprueba la presencia de los elementos
//! requeridos por path barra.

use serde_json::json;
use veri_core::{resolve, ExecutionReport, Finding, PayloadTree};

pub fn markup_check(payload: &PayloadTree, required_elements: &[String]) -> ExecutionReport {
    if !matches!(payload, PayloadTree::Markup(_)) {
        return ExecutionReport { output_payload: json!({"checked_elements": 0}),
                                 findings: vec![Finding::error("payload is not a markup document", "/")] };
    }

    let mut findings = Vec::new();
    let mut missing = Vec::new();
    for path in required_elements {
        if resolve(payload, path).is_not_found() {
            findings.push(Finding::error(format!("required element '{path}' is missing"), path.clone()));
            missing.push(path.clone());
        }
    }
    ExecutionReport { output_payload: json!({
                          "checked_elements": required_elements.len(),
                          "missing": missing,
                      }),
                      findings }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::parse_markup;

    #[test]
    fn finds_required_elements() {
        let root = parse_markup("<model><zone id=\"z1\">north</zone></model>").expect("parse");
        let payload = PayloadTree::Markup(root);
        let report = markup_check(&payload, &["zone".to_string(), "zone/@id".to_string()]);
        assert!(report.findings.is_empty());
    }

    #[test]
    fn reports_missing_elements_and_wrong_payload_shape() {
        let root = parse_markup("<model/>").expect("parse");
        let payload = PayloadTree::Markup(root);
        let report = markup_check(&payload, &["zone".to_string()]);
        assert_eq!(report.findings.len(), 1);

        let tree = PayloadTree::Tree(serde_json::json!({}));
        let report = markup_check(&tree, &[]);
        assert_eq!(report.findings.len(), 1);
    }
}
