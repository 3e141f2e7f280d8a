//! Árboles de payload neutrales.
//!
//! El motor nunca interpreta la semántica de un payload: lo único que sabe
//! hacer con él es resolver data paths (ver `signal::resolver`). Dos formas
//! de árbol cubren los contenidos soportados:
//! - `Tree`: árbol JSON genérico (`serde_json::Value`), usado por documentos
//!   JSON y modelos energéticos.
//! - `Markup`: árbol de elementos estilo XML, producido por la capa de
//!   ingesta a partir de texto de marcado.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Nodo de un árbol de marcado. Modelo mínimo: nombre, atributos en orden
/// de aparición, texto acumulado e hijos en orden de documento.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkupNode {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<MarkupNode>,
}

impl MarkupNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(),
               attributes: Vec::new(),
               text: String::new(),
               children: Vec::new() }
    }

    /// Valor de un atributo por nombre (sensible a mayúsculas).
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    /// Hijos directos con el nombre dado, en orden de documento.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a MarkupNode> {
        self.children.iter().filter(move |c| c.name == name)
    }
}

/// Payload parseado, neutro para el motor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PayloadTree {
    Tree(Value),
    Markup(MarkupNode),
}

/// Resultado de resolver un data path. `NotFound` es un centinela explícito,
/// distinto de `null`: un path que aterriza en un `null` JSON resuelve a
/// `Value(Value::Null)`.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    Value(Value),
    NotFound,
}

impl Resolved {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Resolved::NotFound)
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Resolved::Value(v) => Some(v),
            Resolved::NotFound => None,
        }
    }
}
