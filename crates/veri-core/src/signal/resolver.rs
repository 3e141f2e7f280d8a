//! Resolvedor de data paths.
//!
//! Contrato: `resolve(tree, path) -> Resolved`. La resolución es pura y
//! determinista; un path ausente devuelve `Resolved::NotFound`, nunca un
//! error. No hay coacción de tipos aquí: eso es una opción del evaluador de
//! aserciones, porque distintas aserciones pueden querer políticas
//! distintas.
//!
//! Dialectos:
//! - Árbol JSON: punto para claves anidadas (`a.b.c`), corchete con índice
//!   base cero para secuencias (`a[0].b`).
//! - Árbol de marcado: barra para elementos hijos (`a/b/c`), `@nombre` para
//!   un atributo del elemento actual, `#text` para el texto del elemento, y
//!   un índice opcional por segmento (`warning[1]`) que selecciona la
//!   n-ésima ocurrencia (base cero) de ese nombre.

use serde_json::Value;

use crate::payload::{MarkupNode, PayloadTree, Resolved};

/// Resuelve un path contra un payload neutro.
pub fn resolve(tree: &PayloadTree, path: &str) -> Resolved {
    match tree {
        PayloadTree::Tree(value) => resolve_tree(value, path),
        PayloadTree::Markup(node) => resolve_markup(node, path),
    }
}

// ---------------------------------------------------------------
// Dialecto punto/corchete sobre Value
// ---------------------------------------------------------------

enum TreeSegment {
    Key(String),
    Index(usize),
}

/// Parsea `a.b[0].c` en segmentos. Devuelve None si el path está mal
/// formado (corchete sin cerrar, índice no numérico, segmento vacío).
fn parse_tree_path(path: &str) -> Option<Vec<TreeSegment>> {
    let mut segments = Vec::new();
    let mut chars = path.chars().peekable();
    let mut current = String::new();
    let mut expects_key = true;

    while let Some(c) = chars.next() {
        match c {
            '.' => {
                if expects_key && current.is_empty() {
                    return None;
                }
                if !current.is_empty() {
                    segments.push(TreeSegment::Key(std::mem::take(&mut current)));
                }
                expects_key = true;
            }
            '[' => {
                if !current.is_empty() {
                    segments.push(TreeSegment::Key(std::mem::take(&mut current)));
                } else if expects_key && segments.is_empty() {
                    // un path no puede empezar con índice
                    return None;
                }
                let mut digits = String::new();
                loop {
                    match chars.next() {
                        Some(']') => break,
                        Some(d) if d.is_ascii_digit() => digits.push(d),
                        _ => return None,
                    }
                }
                let index: usize = digits.parse().ok()?;
                segments.push(TreeSegment::Index(index));
                expects_key = false;
            }
            _ => {
                current.push(c);
                expects_key = false;
            }
        }
    }
    if !current.is_empty() {
        segments.push(TreeSegment::Key(current));
    } else if expects_key {
        return None;
    }
    if segments.is_empty() {
        return None;
    }
    Some(segments)
}

fn resolve_tree(value: &Value, path: &str) -> Resolved {
    let segments = match parse_tree_path(path) {
        Some(s) => s,
        None => return Resolved::NotFound,
    };
    let mut cursor = value;
    for segment in &segments {
        cursor = match segment {
            TreeSegment::Key(key) => match cursor.get(key.as_str()) {
                Some(next) => next,
                None => return Resolved::NotFound,
            },
            TreeSegment::Index(i) => match cursor.get(*i) {
                Some(next) => next,
                None => return Resolved::NotFound,
            },
        };
    }
    Resolved::Value(cursor.clone())
}

// ---------------------------------------------------------------
// Dialecto barra/atributo sobre MarkupNode
// ---------------------------------------------------------------

/// Parsea `name[2]` en (nombre, índice). Sin corchete el índice es 0.
fn parse_markup_segment(segment: &str) -> Option<(&str, usize)> {
    if let Some(open) = segment.find('[') {
        let close = segment.rfind(']')?;
        if close != segment.len() - 1 || close <= open {
            return None;
        }
        let index: usize = segment[open + 1..close].parse().ok()?;
        Some((&segment[..open], index))
    } else {
        Some((segment, 0))
    }
}

fn resolve_markup(root: &MarkupNode, path: &str) -> Resolved {
    if path.is_empty() {
        return Resolved::NotFound;
    }
    let mut cursor = root;
    for segment in path.split('/') {
        if segment.is_empty() {
            return Resolved::NotFound;
        }
        if let Some(attr) = segment.strip_prefix('@') {
            // un atributo cierra el path; segmentos posteriores no tienen
            // sentido y el split ya los habría separado
            return match cursor.attribute(attr) {
                Some(v) => Resolved::Value(Value::String(v.to_string())),
                None => Resolved::NotFound,
            };
        }
        if segment == "#text" {
            return Resolved::Value(Value::String(cursor.text.clone()));
        }
        let (name, index) = match parse_markup_segment(segment) {
            Some(parsed) => parsed,
            None => return Resolved::NotFound,
        };
        cursor = match cursor.children_named(name).nth(index) {
            Some(child) => child,
            None => return Resolved::NotFound,
        };
    }
    // aterrizar en un elemento resuelve a su contenido de texto; la
    // interpretación numérica es cosa del evaluador (`coerce_types`)
    Resolved::Value(Value::String(cursor.text.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_tree() -> PayloadTree {
        PayloadTree::Tree(json!({
            "temperature": 21.3,
            "building": {
                "zones": [
                    {"name": "north", "area_m2": 120.5},
                    {"name": "south", "area_m2": 98.0}
                ]
            },
            "tags": null
        }))
    }

    fn sample_markup() -> PayloadTree {
        let mut root = MarkupNode::new("model");
        let mut zone_a = MarkupNode::new("zone");
        zone_a.attributes.push(("id".to_string(), "z1".to_string()));
        zone_a.text = "north".to_string();
        let mut zone_b = MarkupNode::new("zone");
        zone_b.attributes.push(("id".to_string(), "z2".to_string()));
        zone_b.text = "south".to_string();
        root.children.push(zone_a);
        root.children.push(zone_b);
        PayloadTree::Markup(root)
    }

    #[test]
    fn resolves_top_level_key() {
        assert_eq!(resolve(&sample_tree(), "temperature"), Resolved::Value(json!(21.3)));
    }

    #[test]
    fn resolution_is_pure_and_repeatable() {
        let tree = sample_tree();
        for _ in 0..3 {
            assert_eq!(resolve(&tree, "temperature"), Resolved::Value(json!(21.3)));
        }
    }

    #[test]
    fn resolves_nested_and_indexed() {
        assert_eq!(resolve(&sample_tree(), "building.zones[1].name"), Resolved::Value(json!("south")));
    }

    #[test]
    fn missing_path_is_not_found_not_null() {
        assert_eq!(resolve(&sample_tree(), "building.missing"), Resolved::NotFound);
        // un null real resuelve a Value(Null), no a NotFound
        assert_eq!(resolve(&sample_tree(), "tags"), Resolved::Value(Value::Null));
    }

    #[test]
    fn out_of_range_index_is_not_found() {
        assert_eq!(resolve(&sample_tree(), "building.zones[7].name"), Resolved::NotFound);
    }

    #[test]
    fn malformed_path_is_not_found() {
        assert_eq!(resolve(&sample_tree(), "building.zones[x]"), Resolved::NotFound);
        assert_eq!(resolve(&sample_tree(), ""), Resolved::NotFound);
        assert_eq!(resolve(&sample_tree(), "a..b"), Resolved::NotFound);
    }

    #[test]
    fn resolution_is_case_sensitive() {
        assert_eq!(resolve(&sample_tree(), "Temperature"), Resolved::NotFound);
    }

    #[test]
    fn markup_element_resolves_to_text() {
        assert_eq!(resolve(&sample_markup(), "zone"), Resolved::Value(json!("north")));
        assert_eq!(resolve(&sample_markup(), "zone[1]"), Resolved::Value(json!("south")));
    }

    #[test]
    fn markup_attribute_resolution() {
        assert_eq!(resolve(&sample_markup(), "zone[1]/@id"), Resolved::Value(json!("z2")));
        assert_eq!(resolve(&sample_markup(), "zone/@missing"), Resolved::NotFound);
    }

    #[test]
    fn markup_text_segment() {
        assert_eq!(resolve(&sample_markup(), "zone/#text"), Resolved::Value(json!("north")));
    }

    #[test]
    fn markup_missing_element_is_not_found() {
        assert_eq!(resolve(&sample_markup(), "floor"), Resolved::NotFound);
        assert_eq!(resolve(&sample_markup(), "zone[5]"), Resolved::NotFound);
    }
}
