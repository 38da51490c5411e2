//! Minimal XML reader for scene documents.
//!
//! Produces an element tree annotated with source positions. Only the subset
//! of XML that scene descriptions use is supported: a prolog, comments,
//! processing instructions, a DOCTYPE line, elements and attributes. Text
//! content other than whitespace is rejected since no scene element carries
//! character data.

use thiserror::Error;

use crate::error::{LoadError, Location};

/// Errors produced while tokenizing the document.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message} at {location}")]
pub struct XmlError {
    pub location: Location,
    pub message: String,
}

impl From<XmlError> for LoadError {
    fn from(e: XmlError) -> Self {
        LoadError::Syntax {
            location: e.location,
            message: e.message,
        }
    }
}

/// An XML element with its attributes in document order.
#[derive(Clone, Debug, PartialEq)]
pub struct Element {
    pub tag: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Element>,
    pub location: Location,
}

impl Element {
    /// Look up an attribute value by name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }
}

/// Parse a complete document and return its root element.
pub fn parse_document(source: &str) -> Result<Element, XmlError> {
    let mut reader = Reader::new(source);
    reader.skip_misc()?;
    if reader.at_end() {
        return Err(reader.error("document has no root element"));
    }
    let root = reader.parse_element()?;
    reader.skip_misc()?;
    if !reader.at_end() {
        return Err(reader.error("unexpected content after the root element"));
    }
    Ok(root)
}

struct Reader<'a> {
    src: &'a str,
    pos: usize,
    line: usize,
    column: usize,
}

impl<'a> Reader<'a> {
    fn new(src: &'a str) -> Self {
        // A leading byte order mark is not content
        let src = src.strip_prefix('\u{feff}').unwrap_or(src);
        Self {
            src,
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn location(&self) -> Location {
        Location::new(self.line, self.column)
    }

    fn error(&self, message: impl Into<String>) -> XmlError {
        XmlError {
            location: self.location(),
            message: message.into(),
        }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn starts_with(&self, s: &str) -> bool {
        self.rest().starts_with(s)
    }

    fn expect(&mut self, s: &str) -> Result<(), XmlError> {
        if self.starts_with(s) {
            for _ in s.chars() {
                self.bump();
            }
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", s)))
        }
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    /// Consume input up to and including `terminator`.
    fn skip_past(&mut self, terminator: &str, what: &str) -> Result<(), XmlError> {
        let start = self.location();
        while !self.at_end() {
            if self.starts_with(terminator) {
                return self.expect(terminator);
            }
            self.bump();
        }
        Err(XmlError {
            location: start,
            message: format!("unterminated {}", what),
        })
    }

    /// Skip whitespace, comments, processing instructions and DOCTYPE.
    fn skip_misc(&mut self) -> Result<(), XmlError> {
        loop {
            self.skip_ws();
            if self.starts_with("<!--") {
                self.skip_past("-->", "comment")?;
            } else if self.starts_with("<?") {
                self.skip_past("?>", "processing instruction")?;
            } else if self.starts_with("<!DOCTYPE") {
                self.skip_past(">", "DOCTYPE declaration")?;
            } else {
                return Ok(());
            }
        }
    }

    fn parse_name(&mut self) -> Result<String, XmlError> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'))
        {
            self.bump();
        }
        if self.pos == start {
            return Err(self.error("expected a name"));
        }
        Ok(self.src[start..self.pos].to_string())
    }

    fn parse_element(&mut self) -> Result<Element, XmlError> {
        let location = self.location();
        self.expect("<")?;
        let tag = self.parse_name()?;
        let mut attributes: Vec<(String, String)> = Vec::new();

        loop {
            let had_ws = matches!(self.peek(), Some(c) if c.is_whitespace());
            self.skip_ws();
            match self.peek() {
                Some('/') => {
                    self.expect("/>")?;
                    return Ok(Element {
                        tag,
                        attributes,
                        children: Vec::new(),
                        location,
                    });
                }
                Some('>') => {
                    self.bump();
                    break;
                }
                Some(_) => {
                    if !had_ws {
                        return Err(self.error("expected whitespace before attribute"));
                    }
                    let attr_location = self.location();
                    let name = self.parse_name()?;
                    self.skip_ws();
                    self.expect("=")?;
                    self.skip_ws();
                    let value = self.parse_attr_value()?;
                    if attributes.iter().any(|(k, _)| *k == name) {
                        return Err(XmlError {
                            location: attr_location,
                            message: format!("duplicate attribute '{}'", name),
                        });
                    }
                    attributes.push((name, value));
                }
                None => {
                    return Err(XmlError {
                        location,
                        message: format!("unterminated start tag <{}>", tag),
                    })
                }
            }
        }

        let mut children = Vec::new();
        loop {
            self.skip_misc()?;
            if self.at_end() {
                return Err(XmlError {
                    location,
                    message: format!("element <{}> is never closed", tag),
                });
            }
            if self.starts_with("</") {
                self.expect("</")?;
                let close = self.parse_name()?;
                if close != tag {
                    return Err(self.error(format!(
                        "mismatched closing tag </{}> for <{}>",
                        close, tag
                    )));
                }
                self.skip_ws();
                self.expect(">")?;
                return Ok(Element {
                    tag,
                    attributes,
                    children,
                    location,
                });
            }
            if self.starts_with("<![CDATA[") {
                return Err(self.error("character data is not allowed in scene elements"));
            }
            if self.starts_with("<") {
                children.push(self.parse_element()?);
                continue;
            }
            return Err(self.error(format!("unexpected text inside <{}>", tag)));
        }
    }

    fn parse_attr_value(&mut self) -> Result<String, XmlError> {
        let quote = match self.peek() {
            Some(q @ ('"' | '\'')) => q,
            _ => return Err(self.error("expected a quoted attribute value")),
        };
        self.bump();
        let mut value = String::new();
        loop {
            match self.peek() {
                Some(c) if c == quote => {
                    self.bump();
                    return Ok(value);
                }
                Some('<') => return Err(self.error("'<' is not allowed in attribute values")),
                Some('&') => value.push(self.parse_entity()?),
                Some(c) => {
                    value.push(c);
                    self.bump();
                }
                None => return Err(self.error("unterminated attribute value")),
            }
        }
    }

    fn parse_entity(&mut self) -> Result<char, XmlError> {
        let location = self.location();
        let end = match self.rest().find(';') {
            Some(end) => end,
            None => return Err(self.error("unterminated entity reference")),
        };
        let entity = &self.rest()[1..end];
        let c = match entity {
            "lt" => Some('<'),
            "gt" => Some('>'),
            "amp" => Some('&'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => {
                if let Some(hex) = entity.strip_prefix("#x") {
                    u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
                } else if let Some(dec) = entity.strip_prefix('#') {
                    dec.parse::<u32>().ok().and_then(char::from_u32)
                } else {
                    None
                }
            }
        };
        match c {
            Some(c) => {
                let target = self.pos + end + 1;
                while self.pos < target {
                    self.bump();
                }
                Ok(c)
            }
            None => Err(XmlError {
                location,
                message: format!("unknown entity '&{};'", entity),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_elements() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<!-- exported scene -->
<scene version="2.1.0">
    <default name="spp" value="128"/>
    <bsdf type="diffuse" id='mat'>
        <rgb name="reflectance" value="0.1 0.2 0.3"/>
    </bsdf>
</scene>
"#;
        let root = parse_document(xml).unwrap();
        assert_eq!(root.tag, "scene");
        assert_eq!(root.attr("version"), Some("2.1.0"));
        assert_eq!(root.location, Location::new(3, 1));
        assert_eq!(root.children.len(), 2);

        let bsdf = &root.children[1];
        assert_eq!(bsdf.attr("id"), Some("mat"));
        assert_eq!(bsdf.location, Location::new(5, 5));
        assert_eq!(bsdf.children[0].attr("value"), Some("0.1 0.2 0.3"));
    }

    #[test]
    fn test_entities_are_decoded() {
        let root = parse_document(r#"<a v="&lt;x&gt; &amp; &#65;&#x42;"/>"#).unwrap();
        assert_eq!(root.attr("v"), Some("<x> & AB"));
    }

    #[test]
    fn test_mismatched_close_is_rejected() {
        let err = parse_document("<scene>\n  <bsdf>\n  </shape>\n</scene>").unwrap_err();
        assert!(err.message.contains("mismatched"));
        assert_eq!(err.location.line, 3);
    }

    #[test]
    fn test_unclosed_element_is_rejected() {
        let err = parse_document("<scene>\n<bsdf/>").unwrap_err();
        assert!(err.message.contains("never closed"));
        assert_eq!(err.location, Location::new(1, 1));
    }

    #[test]
    fn test_text_content_is_rejected() {
        assert!(parse_document("<scene>hello</scene>").is_err());
    }

    #[test]
    fn test_duplicate_attribute_is_rejected() {
        let err = parse_document(r#"<a x="1" x="2"/>"#).unwrap_err();
        assert!(err.message.contains("duplicate attribute"));
    }

    #[test]
    fn test_trailing_content_is_rejected() {
        assert!(parse_document("<a/><b/>").is_err());
    }
}
