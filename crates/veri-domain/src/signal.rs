// signal.rs
use crate::DomainError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Etapa en la que se resuelve una señal: contra la entrega (`Input`) o
/// contra el sobre de salida del step (`Output`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalStage {
    Input,
    Output,
}

/// Tipo declarado de una señal. El resolvedor no coacciona tipos; la
/// verificación se hace al evaluar aserciones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    Number,
    String,
    Boolean,
    Timeseries,
    Object,
}

/// Referencia nombrada a un valor dentro de un payload.
///
/// El `data_path` usa notación punto/corchete para árboles JSON
/// (`a.b[0].c`) y notación barra/atributo para árboles de marcado
/// (`a/b/@id`). Cuando no hay path configurado, el slug es el path por
/// defecto (clave de primer nivel).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalSpec {
    slug: String,
    stage: SignalStage,
    data_path: Option<String>,
    signal_type: SignalType,
    required: bool,
}

/// Valida el formato de slug compartido por señales, aserciones y
/// validadores: minúsculas, dígitos y guión bajo, no vacío.
pub(crate) fn validate_slug(slug: &str) -> Result<(), DomainError> {
    if slug.is_empty() {
        return Err(DomainError::Validation("El slug no puede estar vacío".to_string()));
    }
    if !slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_') {
        return Err(DomainError::Validation(format!("Slug inválido: {}", slug)));
    }
    Ok(())
}

impl SignalSpec {
    /// Crea una señal requerida sin path explícito (el slug es el path).
    pub fn new(slug: impl Into<String>, stage: SignalStage, signal_type: SignalType) -> Result<Self, DomainError> {
        let slug = slug.into();
        validate_slug(&slug)?;
        Ok(SignalSpec { slug,
                        stage,
                        data_path: None,
                        signal_type,
                        required: true })
    }

    /// Nueva instancia con path explícito.
    pub fn with_data_path(mut self, data_path: impl Into<String>) -> Self {
        self.data_path = Some(data_path.into());
        self
    }

    /// Nueva instancia marcada como opcional.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Path efectivo de resolución: el configurado, o el slug.
    pub fn effective_path(&self) -> &str {
        self.data_path.as_deref().unwrap_or(&self.slug)
    }

    // Getters
    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn stage(&self) -> SignalStage {
        self.stage
    }

    pub fn signal_type(&self) -> SignalType {
        self.signal_type
    }

    pub fn required(&self) -> bool {
        self.required
    }
}

/// Conjunto de señales de un validador.
///
/// Invariante: slug único dentro del conjunto. El orden de inserción se
/// conserva y es el orden de resolución.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignalSet {
    inner: IndexMap<String, SignalSpec>,
}

impl SignalSet {
    pub fn new() -> Self {
        Self { inner: IndexMap::new() }
    }

    /// Construye el conjunto validando unicidad de slugs.
    pub fn from_specs<I>(specs: I) -> Result<Self, DomainError>
        where I: IntoIterator<Item = SignalSpec>
    {
        let mut set = Self::new();
        for spec in specs {
            set.insert(spec)?;
        }
        Ok(set)
    }

    /// Inserta una señal.
    ///
    /// # Errores
    /// Retorna `DomainError::Validation` si el slug ya existe en el conjunto.
    pub fn insert(&mut self, spec: SignalSpec) -> Result<(), DomainError> {
        if self.inner.contains_key(spec.slug()) {
            return Err(DomainError::Validation(format!("Señal duplicada en el conjunto: {}", spec.slug())));
        }
        self.inner.insert(spec.slug().to_string(), spec);
        Ok(())
    }

    pub fn get(&self, slug: &str) -> Option<&SignalSpec> {
        self.inner.get(slug)
    }

    pub fn contains(&self, slug: &str) -> bool {
        self.inner.contains_key(slug)
    }

    /// Itera en orden de inserción.
    pub fn iter(&self) -> impl Iterator<Item = &SignalSpec> {
        self.inner.values()
    }

    /// Itera sólo las señales de una etapa, en orden de inserción.
    pub fn stage_iter(&self, stage: SignalStage) -> impl Iterator<Item = &SignalSpec> + '_ {
        self.inner.values().filter(move |s| s.stage() == stage)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_default_path_is_slug() -> Result<(), DomainError> {
        let s = SignalSpec::new("site_eui_kwh_m2", SignalStage::Input, SignalType::Number)?;
        assert_eq!(s.effective_path(), "site_eui_kwh_m2");
        Ok(())
    }

    #[test]
    fn test_signal_explicit_path() -> Result<(), DomainError> {
        let s = SignalSpec::new("area", SignalStage::Input, SignalType::Number)?.with_data_path("building.geometry.floor_area");
        assert_eq!(s.effective_path(), "building.geometry.floor_area");
        Ok(())
    }

    #[test]
    fn test_signal_set_rejects_duplicate_slug() -> Result<(), DomainError> {
        let a = SignalSpec::new("x", SignalStage::Input, SignalType::Number)?;
        let b = SignalSpec::new("x", SignalStage::Output, SignalType::Number)?;
        let result = SignalSet::from_specs(vec![a, b]);
        assert!(result.is_err());
        Ok(())
    }

    #[test]
    fn test_signal_set_preserves_insertion_order() -> Result<(), DomainError> {
        let set = SignalSet::from_specs(vec![SignalSpec::new("b", SignalStage::Input, SignalType::Number)?,
                                             SignalSpec::new("a", SignalStage::Input, SignalType::Number)?])?;
        let slugs: Vec<&str> = set.iter().map(|s| s.slug()).collect();
        assert_eq!(slugs, vec!["b", "a"]);
        Ok(())
    }

    #[test]
    fn test_invalid_slug_rejected() {
        assert!(SignalSpec::new("Bad-Slug", SignalStage::Input, SignalType::String).is_err());
        assert!(SignalSpec::new("", SignalStage::Input, SignalType::String).is_err());
    }
}
