//! Parser mínimo de marcado a `MarkupNode`.
//!
//! Cubre el subconjunto que las entregas XML de esta plataforma usan:
//! elementos, atributos, texto, elementos auto-cerrados, comentarios,
//! declaraciones `<?...?>` y DOCTYPE (estos dos últimos se ignoran), y las
//! cinco entidades predefinidas. No soporta CDATA ni namespaces; un
//! documento fuera del subconjunto produce un error de parseo, que la
//! ingesta reporta como entrega malformada.

use thiserror::Error;
use veri_core::MarkupNode;

#[derive(Debug, Error, PartialEq)]
pub enum MarkupError {
    #[error("unexpected end of document")]
    UnexpectedEof,
    #[error("malformed markup at byte {0}: {1}")]
    Malformed(usize, String),
    #[error("mismatched closing tag: expected </{expected}>, got </{got}>")]
    MismatchedTag { expected: String, got: String },
    #[error("document has no root element")]
    NoRoot,
}

struct Cursor<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek();
        if b.is_some() {
            self.pos += 1;
        }
        b
    }

    fn starts_with(&self, prefix: &str) -> bool {
        self.input[self.pos..].starts_with(prefix.as_bytes())
    }

    fn skip(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.input.len());
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b) if b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    /// Avanza hasta después de `needle`; error si no aparece.
    fn skip_until(&mut self, needle: &str) -> Result<(), MarkupError> {
        while self.pos < self.input.len() {
            if self.starts_with(needle) {
                self.skip(needle.len());
                return Ok(());
            }
            self.pos += 1;
        }
        Err(MarkupError::UnexpectedEof)
    }

    fn read_name(&mut self) -> Result<String, MarkupError> {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if b.is_ascii_alphanumeric() || b == b'_' || b == b'-' || b == b':' || b == b'.') {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(MarkupError::Malformed(start, "expected a name".to_string()));
        }
        String::from_utf8(self.input[start..self.pos].to_vec())
            .map_err(|_| MarkupError::Malformed(start, "name is not valid UTF-8".to_string()))
    }
}

fn decode_entities(raw: &str) -> String {
    raw.replace("&lt;", "<")
       .replace("&gt;", ">")
       .replace("&quot;", "\"")
       .replace("&apos;", "'")
       .replace("&amp;", "&")
}

/// Parsea un documento y devuelve su elemento raíz.
pub fn parse_markup(input: &str) -> Result<MarkupNode, MarkupError> {
    let mut cursor = Cursor { input: input.as_bytes(),
                              pos: 0 };
    loop {
        cursor.skip_whitespace();
        if cursor.peek().is_none() {
            return Err(MarkupError::NoRoot);
        }
        if cursor.starts_with("<?") {
            cursor.skip_until("?>")?;
            continue;
        }
        if cursor.starts_with("<!--") {
            cursor.skip_until("-->")?;
            continue;
        }
        if cursor.starts_with("<!") {
            cursor.skip_until(">")?;
            continue;
        }
        if cursor.peek() == Some(b'<') {
            let root = parse_element(&mut cursor)?;
            // sólo espacios/comentarios pueden seguir a la raíz
            cursor.skip_whitespace();
            while cursor.starts_with("<!--") {
                cursor.skip_until("-->")?;
                cursor.skip_whitespace();
            }
            if cursor.peek().is_some() {
                return Err(MarkupError::Malformed(cursor.pos, "content after root element".to_string()));
            }
            return Ok(root);
        }
        return Err(MarkupError::Malformed(cursor.pos, "expected '<'".to_string()));
    }
}

fn parse_element(cursor: &mut Cursor<'_>) -> Result<MarkupNode, MarkupError> {
    if cursor.bump() != Some(b'<') {
        return Err(MarkupError::Malformed(cursor.pos, "expected '<'".to_string()));
    }
    let name = cursor.read_name()?;
    let mut node = MarkupNode::new(name.clone());

    // atributos
    loop {
        cursor.skip_whitespace();
        match cursor.peek() {
            Some(b'/') => {
                cursor.bump();
                if cursor.bump() != Some(b'>') {
                    return Err(MarkupError::Malformed(cursor.pos, "expected '>' after '/'".to_string()));
                }
                return Ok(node); // auto-cerrado
            }
            Some(b'>') => {
                cursor.bump();
                break;
            }
            Some(_) => {
                let attr_name = cursor.read_name()?;
                cursor.skip_whitespace();
                if cursor.bump() != Some(b'=') {
                    return Err(MarkupError::Malformed(cursor.pos, format!("attribute '{attr_name}' without value")));
                }
                cursor.skip_whitespace();
                let quote = match cursor.bump() {
                    Some(q @ (b'"' | b'\'')) => q,
                    _ => return Err(MarkupError::Malformed(cursor.pos, "attribute value must be quoted".to_string())),
                };
                let start = cursor.pos;
                while matches!(cursor.peek(), Some(b) if b != quote) {
                    cursor.pos += 1;
                }
                let raw = String::from_utf8(cursor.input[start..cursor.pos].to_vec())
                    .map_err(|_| MarkupError::Malformed(start, "attribute value is not valid UTF-8".to_string()))?;
                if cursor.bump().is_none() {
                    return Err(MarkupError::UnexpectedEof);
                }
                node.attributes.push((attr_name, decode_entities(&raw)));
            }
            None => return Err(MarkupError::UnexpectedEof),
        }
    }

    // contenido: texto, hijos, comentarios, hasta la etiqueta de cierre
    let mut text = String::new();
    loop {
        match cursor.peek() {
            None => return Err(MarkupError::UnexpectedEof),
            Some(b'<') => {
                if cursor.starts_with("<!--") {
                    cursor.skip_until("-->")?;
                    continue;
                }
                if cursor.starts_with("</") {
                    cursor.skip(2);
                    let closing = cursor.read_name()?;
                    cursor.skip_whitespace();
                    if cursor.bump() != Some(b'>') {
                        return Err(MarkupError::Malformed(cursor.pos, "expected '>'".to_string()));
                    }
                    if closing != name {
                        return Err(MarkupError::MismatchedTag { expected: name,
                                                                got: closing });
                    }
                    node.text = decode_entities(text.trim());
                    return Ok(node);
                }
                let child = parse_element(cursor)?;
                node.children.push(child);
            }
            Some(_) => {
                let start = cursor.pos;
                while matches!(cursor.peek(), Some(b) if b != b'<') {
                    cursor.pos += 1;
                }
                let chunk = String::from_utf8(cursor.input[start..cursor.pos].to_vec())
                    .map_err(|_| MarkupError::Malformed(start, "text is not valid UTF-8".to_string()))?;
                text.push_str(&chunk);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_elements_attributes_and_text() {
        let doc = r#"<?xml version="1.0"?>
            <!-- modelo de prueba -->
            <model version="2">
                <zone id="z1">north</zone>
                <zone id="z2">south</zone>
                <note>a &amp; b</note>
            </model>"#;
        let root = parse_markup(doc).expect("parse");
        assert_eq!(root.name, "model");
        assert_eq!(root.attribute("version"), Some("2"));
        assert_eq!(root.children.len(), 3);
        assert_eq!(root.children[0].text, "north");
        assert_eq!(root.children[1].attribute("id"), Some("z2"));
        assert_eq!(root.children[2].text, "a & b");
    }

    #[test]
    fn parses_self_closing_elements() {
        let root = parse_markup(r#"<model><zone id="z1"/><zone id="z2"/></model>"#).expect("parse");
        assert_eq!(root.children.len(), 2);
        assert!(root.children[0].children.is_empty());
    }

    #[test]
    fn rejects_mismatched_tags() {
        let result = parse_markup("<model><zone></model></zone>");
        assert!(matches!(result, Err(MarkupError::MismatchedTag { .. })));
    }

    #[test]
    fn rejects_truncated_document() {
        assert_eq!(parse_markup("<model><zone>"), Err(MarkupError::UnexpectedEof));
    }

    #[test]
    fn rejects_empty_document() {
        assert_eq!(parse_markup("   "), Err(MarkupError::NoRoot));
    }
}
