//! Ingesta de entregas: bytes → árbol de payload neutro.
//!
//! La ingesta es el único lugar donde se interpreta el contenido de una
//! `Submission`: verifica integridad (checksum sha256 de dominio), decide el
//! parser según el tipo de contenido y entrega al motor un `PayloadTree`
//! listo para resolver señales.

use thiserror::Error;
use veri_core::PayloadTree;
use veri_domain::{ContentType, Submission};

use crate::markup::{parse_markup, MarkupError};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("submission checksum does not match its payload bytes")]
    ChecksumMismatch,
    #[error("payload is not valid UTF-8")]
    NotUtf8,
    #[error("invalid JSON payload: {0}")]
    Json(String),
    #[error("invalid markup payload: {0}")]
    Markup(#[from] MarkupError),
}

/// Parsea el payload de una entrega a su árbol neutro.
pub fn parse_submission(submission: &Submission) -> Result<PayloadTree, IngestError> {
    if !submission.verify_integrity() {
        return Err(IngestError::ChecksumMismatch);
    }
    match submission.content_type() {
        ContentType::Json | ContentType::EnergyModelJson | ContentType::CosimDescriptor => {
            let value = serde_json::from_slice(submission.payload()).map_err(|e| IngestError::Json(e.to_string()))?;
            Ok(PayloadTree::Tree(value))
        }
        ContentType::Xml => {
            let text = std::str::from_utf8(submission.payload()).map_err(|_| IngestError::NotUtf8)?;
            Ok(PayloadTree::Markup(parse_markup(text)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use veri_core::Resolved;

    #[test]
    fn json_submission_becomes_tree() {
        let s = Submission::new(br#"{"site_eui_kwh_m2": 120}"#.to_vec(), None).expect("submission");
        let tree = parse_submission(&s).expect("ingest");
        assert_eq!(veri_core::resolve(&tree, "site_eui_kwh_m2"), Resolved::Value(json!(120)));
    }

    #[test]
    fn xml_submission_becomes_markup() {
        let s = Submission::new(b"<model><zone id=\"z1\">north</zone></model>".to_vec(), None).expect("submission");
        let tree = parse_submission(&s).expect("ingest");
        assert_eq!(veri_core::resolve(&tree, "zone/@id"), Resolved::Value(json!("z1")));
    }

    #[test]
    fn malformed_json_is_reported() {
        let s = Submission::new(b"{broken".to_vec(), Some(ContentType::Json)).expect("submission");
        assert!(matches!(parse_submission(&s), Err(IngestError::Json(_))));
    }
}
