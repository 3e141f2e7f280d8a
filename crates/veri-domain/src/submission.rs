// submission.rs
use crate::DomainError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

/// Tipo de contenido de una entrega. El tipo puede venir declarado por el
/// cliente o detectarse a partir de los primeros bytes del payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Json,
    Xml,
    EnergyModelJson,
    CosimDescriptor,
}

impl ContentType {
    /// Detecta el tipo a partir del primer byte no-blanco del payload.
    /// `EnergyModelJson` y `CosimDescriptor` sólo se obtienen por declaración
    /// explícita; la detección los reporta como `Json`.
    pub fn sniff(payload: &[u8]) -> Option<ContentType> {
        let first = payload.iter().find(|b| !b.is_ascii_whitespace())?;
        match first {
            b'{' | b'[' => Some(ContentType::Json),
            b'<' => Some(ContentType::Xml),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Json => "json",
            ContentType::Xml => "xml",
            ContentType::EnergyModelJson => "energy_model_json",
            ContentType::CosimDescriptor => "cosim_descriptor",
        }
    }

    /// Indica si el payload se interpreta como árbol de marcado (XML-like).
    pub fn is_markup(&self) -> bool {
        matches!(self, ContentType::Xml)
    }
}

/// Payload inmutable entregado por el llamador.
///
/// La entrega es de sólo lectura para el núcleo de ejecución: se construye
/// una vez, con checksum sha256 calculado sobre los bytes, y no se vuelve a
/// mutar. Cualquier interpretación del contenido (parseo a árbol) ocurre en
/// la capa de adaptadores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    id: Uuid,
    content_type: ContentType,
    payload: Vec<u8>,
    checksum: String,
    received_at: DateTime<Utc>,
}

impl Submission {
    /// Crea una entrega nueva. Si no se declara tipo, se intenta detectar.
    ///
    /// # Errores
    /// Retorna `DomainError::Validation` si el payload está vacío o si el
    /// tipo no se declaró ni pudo detectarse.
    pub fn new(payload: Vec<u8>, declared: Option<ContentType>) -> Result<Self, DomainError> {
        if payload.is_empty() {
            return Err(DomainError::Validation("El payload de una entrega no puede estar vacío".to_string()));
        }
        let content_type = match declared.or_else(|| ContentType::sniff(&payload)) {
            Some(ct) => ct,
            None => {
                return Err(DomainError::Validation("Tipo de contenido no declarado y no detectable".to_string()));
            }
        };
        let checksum = Self::calculate_checksum(&payload);
        Ok(Submission { id: Uuid::new_v4(),
                        content_type,
                        payload,
                        checksum,
                        received_at: Utc::now() })
    }

    /// Checksum sha256 (hex) sobre los bytes del payload.
    fn calculate_checksum(payload: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(payload);
        format!("{:x}", hasher.finalize())
    }

    /// Verifica la integridad recalculando y comparando el checksum.
    pub fn verify_integrity(&self) -> bool {
        Self::calculate_checksum(&self.payload) == self.checksum
    }

    // Getters
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }
}

impl fmt::Display for Submission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f,
               "Submission(id: {}, type: {}, bytes: {})",
               self.id,
               self.content_type.as_str(),
               self.payload.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submission_sniffs_json() -> Result<(), DomainError> {
        let s = Submission::new(br#"  {"a": 1}"#.to_vec(), None)?;
        assert_eq!(s.content_type(), ContentType::Json);
        assert!(s.verify_integrity());
        Ok(())
    }

    #[test]
    fn test_submission_sniffs_markup() -> Result<(), DomainError> {
        let s = Submission::new(b"<model/>".to_vec(), None)?;
        assert_eq!(s.content_type(), ContentType::Xml);
        Ok(())
    }

    #[test]
    fn test_submission_rejects_empty_payload() {
        assert!(Submission::new(Vec::new(), Some(ContentType::Json)).is_err());
    }

    #[test]
    fn test_submission_rejects_unknown_content() {
        assert!(Submission::new(b"plain text".to_vec(), None).is_err());
    }

    #[test]
    fn test_declared_type_wins_over_sniff() -> Result<(), DomainError> {
        let s = Submission::new(br#"{"building": {}}"#.to_vec(), Some(ContentType::EnergyModelJson))?;
        assert_eq!(s.content_type(), ContentType::EnergyModelJson);
        Ok(())
    }
}
