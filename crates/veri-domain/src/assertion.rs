// assertion.rs
use crate::signal::{validate_slug, SignalStage};
use crate::DomainError;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Vocabulario cerrado de operadores de aserción.
///
/// Cada operador declara qué parámetros adicionales requiere (ver
/// `required_params`) y cuáles son opcionales (`case_insensitive`,
/// `coerce_types`, `tolerance_mode`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssertionOp {
    // igualdad / orden
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    // longitud / conteo
    LengthEq,
    LengthGt,
    LengthLt,
    // pertenencia a conjuntos
    In,
    NotIn,
    Subset,
    Superset,
    // predicados de texto
    Contains,
    StartsWith,
    EndsWith,
    Matches,
    // nulidad / vacuidad
    IsNull,
    NotNull,
    IsEmpty,
    NotEmpty,
    // igualdad aproximada
    ApproxEq,
    // temporales (instantes RFC3339)
    Before,
    After,
    // cuantificadores sobre colecciones anidadas
    Any,
    All,
    None,
}

/// Modo de tolerancia para `ApproxEq`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToleranceMode {
    Absolute,
    Relative,
}

/// Sub-aserción usada por los cuantificadores `any`/`all`/`none`: se aplica
/// a cada elemento de la colección objetivo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubAssertion {
    pub op: AssertionOp,
    pub params: OperatorParams,
}

/// Parámetros de un operador. `value` es el comparando; el resto son
/// opcionales y cada operador declara cuáles exige.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperatorParams {
    /// Comparando (literal JSON) para operadores binarios.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Tolerancia numérica para `ApproxEq`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<f64>,
    /// Modo de tolerancia; por defecto `Absolute`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerance_mode: Option<ToleranceMode>,
    /// Comparación de texto sin distinguir mayúsculas.
    #[serde(default)]
    pub case_insensitive: bool,
    /// Permite coacción numérica ("21.3" ≈ 21.3) antes de comparar.
    #[serde(default)]
    pub coerce_types: bool,
    /// Path relativo aplicado a cada elemento en cuantificadores.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_path: Option<String>,
    /// Sub-operador de los cuantificadores.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<Box<SubAssertion>>,
}

/// Tabla operador → parámetros requeridos. Es la fuente de verdad usada al
/// construir una aserción; un operador ausente no requiere parámetros.
static REQUIRED_PARAMS: Lazy<HashMap<AssertionOp, &'static [&'static str]>> = Lazy::new(|| {
    use AssertionOp::*;
    let mut m: HashMap<AssertionOp, &'static [&'static str]> = HashMap::new();
    for op in [Eq, Ne, Lt, Le, Gt, Ge, LengthEq, LengthGt, LengthLt, In, NotIn, Subset, Superset, Contains,
               StartsWith, EndsWith, Matches, Before, After]
    {
        m.insert(op, &["value"]);
    }
    m.insert(ApproxEq, &["value", "tolerance"]);
    for op in [Any, All, None] {
        m.insert(op, &["sub"]);
    }
    m
});

/// Parámetros requeridos por un operador (vacío si no requiere ninguno).
pub fn required_params(op: AssertionOp) -> &'static [&'static str] {
    REQUIRED_PARAMS.get(&op).copied().unwrap_or(&[])
}

fn check_required(op: AssertionOp, params: &OperatorParams) -> Result<(), DomainError> {
    for field in required_params(op) {
        let present = match *field {
            "value" => params.value.is_some(),
            "tolerance" => params.tolerance.is_some(),
            "sub" => params.sub.is_some(),
            _ => true,
        };
        if !present {
            return Err(DomainError::Validation(format!("El operador {:?} requiere el parámetro '{}'", op, field)));
        }
    }
    Ok(())
}

/// Cuerpo de una aserción: forma operador (sobre una señal) o forma
/// expresión (booleana, sobre el espacio de señales resueltas).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "form", rename_all = "snake_case")]
pub enum AssertionBody {
    Operator {
        signal: String,
        op: AssertionOp,
        params: OperatorParams,
    },
    Expression {
        source: String,
    },
}

/// Regla declarativa que produce PASS/FAIL/ERROR al evaluarse.
///
/// Dos ámbitos, posicionales: *default* (lista del validador, siempre se
/// evalúa primero) y *step* (lista del paso de workflow). Dentro de cada
/// ámbito el orden de evaluación es el orden de inserción.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssertionSpec {
    slug: String,
    body: AssertionBody,
    stage: SignalStage,
    blocking: bool,
    treat_missing_as_null: bool,
}

impl AssertionSpec {
    /// Aserción en forma operador sobre la señal `signal`.
    ///
    /// La etapa se declara aquí y se verifica contra la etapa de la señal al
    /// componer el validador/paso.
    pub fn operator(slug: impl Into<String>,
                    stage: SignalStage,
                    signal: impl Into<String>,
                    op: AssertionOp,
                    params: OperatorParams)
                    -> Result<Self, DomainError> {
        let slug = slug.into();
        validate_slug(&slug)?;
        check_required(op, &params)?;
        Ok(AssertionSpec { slug,
                           body: AssertionBody::Operator { signal: signal.into(),
                                                           op,
                                                           params },
                           stage,
                           blocking: true,
                           treat_missing_as_null: false })
    }

    /// Aserción en forma expresión. La fuente se compila y sandboxea al
    /// evaluarse; aquí sólo se valida que no esté vacía.
    pub fn expression(slug: impl Into<String>, stage: SignalStage, source: impl Into<String>) -> Result<Self, DomainError> {
        let slug = slug.into();
        validate_slug(&slug)?;
        let source = source.into();
        if source.trim().is_empty() {
            return Err(DomainError::Validation("La expresión de una aserción no puede estar vacía".to_string()));
        }
        Ok(AssertionSpec { slug,
                           body: AssertionBody::Expression { source },
                           stage,
                           blocking: true,
                           treat_missing_as_null: false })
    }

    /// Nueva instancia no bloqueante (fallo → WARNING, no detiene el paso).
    pub fn non_blocking(mut self) -> Self {
        self.blocking = false;
        self
    }

    /// Nueva instancia que evalúa señales ausentes como `null` en lugar de
    /// producir ERROR (sólo aplica a señales no requeridas).
    pub fn missing_as_null(mut self) -> Self {
        self.treat_missing_as_null = true;
        self
    }

    /// Slug de la señal objetivo para la forma operador.
    pub fn target_signal(&self) -> Option<&str> {
        match &self.body {
            AssertionBody::Operator { signal, .. } => Some(signal),
            AssertionBody::Expression { .. } => None,
        }
    }

    // Getters
    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn body(&self) -> &AssertionBody {
        &self.body
    }

    pub fn stage(&self) -> SignalStage {
        self.stage
    }

    pub fn blocking(&self) -> bool {
        self.blocking
    }

    pub fn treat_missing_as_null(&self) -> bool {
        self.treat_missing_as_null
    }
}
