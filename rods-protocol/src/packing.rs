//! XML packing instructions.
//!
//! Every structured body on the wire is a named, ordered set of fields:
//!
//! ```text
//! <DataObjInp_PI><objPath>/zone/home/a.txt</objPath><createMode>420</createMode>
//! <KeyValPair_PI><ssLen>0</ssLen></KeyValPair_PI></DataObjInp_PI>
//! ```
//!
//! Leaf values are text. Integers are written in decimal and binary fields
//! in base64; repeated fields reuse the same tag. Field order is significant.

use crate::error::ProtocolError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

/// Deepest element nesting accepted when parsing.
pub const MAX_DEPTH: usize = 32;

/// Tag suffix shared by every packing-instruction struct.
const STRUCT_SUFFIX: &str = "_PI";

/// A single field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Text(String),
    Struct(PackedStruct),
}

/// A named, ordered field set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedStruct {
    name: String,
    fields: Vec<(String, Value)>,
}

impl PackedStruct {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[(String, Value)] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn push_str(&mut self, field: &str, value: impl Into<String>) {
        self.fields
            .push((field.to_string(), Value::Text(value.into())));
    }

    pub fn push_int(&mut self, field: &str, value: i64) {
        self.push_str(field, value.to_string());
    }

    pub fn push_bin(&mut self, field: &str, value: &[u8]) {
        self.push_str(field, BASE64.encode(value));
    }

    /// Appends a nested struct; its tag is the struct's own name.
    pub fn push_struct(&mut self, value: PackedStruct) {
        self.fields.push((value.name.clone(), Value::Struct(value)));
    }

    pub fn with_str(mut self, field: &str, value: impl Into<String>) -> Self {
        self.push_str(field, value);
        self
    }

    pub fn with_int(mut self, field: &str, value: i64) -> Self {
        self.push_int(field, value);
        self
    }

    pub fn with_bin(mut self, field: &str, value: &[u8]) -> Self {
        self.push_bin(field, value);
        self
    }

    pub fn with_struct(mut self, value: PackedStruct) -> Self {
        self.push_struct(value);
        self
    }

    fn first(&self, field: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }

    /// Returns the first text value of `field`.
    pub fn str(&self, field: &str) -> Result<&str, ProtocolError> {
        match self.first(field) {
            Some(Value::Text(text)) => Ok(text),
            Some(Value::Struct(_)) => Err(ProtocolError::InvalidField {
                field: field.to_string(),
                value: "<struct>".to_string(),
            }),
            None => Err(ProtocolError::MissingField(field.to_string())),
        }
    }

    /// Returns the first value of `field` parsed as a signed integer.
    pub fn int(&self, field: &str) -> Result<i64, ProtocolError> {
        let text = self.str(field)?;
        text.trim()
            .parse()
            .map_err(|_| ProtocolError::InvalidField {
                field: field.to_string(),
                value: text.to_string(),
            })
    }

    /// Returns the first value of `field` decoded from base64.
    pub fn bin(&self, field: &str) -> Result<Vec<u8>, ProtocolError> {
        Ok(BASE64.decode(self.str(field)?.trim())?)
    }

    /// Returns the first nested struct named `name`.
    pub fn child(&self, name: &str) -> Result<&PackedStruct, ProtocolError> {
        match self.first(name) {
            Some(Value::Struct(child)) => Ok(child),
            Some(Value::Text(text)) => Err(ProtocolError::InvalidField {
                field: name.to_string(),
                value: text.clone(),
            }),
            None => Err(ProtocolError::MissingField(name.to_string())),
        }
    }

    /// Iterates over every text value of a repeated field.
    pub fn strs<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.fields.iter().filter_map(move |(name, value)| match value {
            Value::Text(text) if name == field => Some(text.as_str()),
            _ => None,
        })
    }

    /// Parses every value of a repeated field as an integer.
    pub fn ints(&self, field: &str) -> Result<Vec<i64>, ProtocolError> {
        self.strs(field)
            .map(|text| {
                text.trim().parse().map_err(|_| ProtocolError::InvalidField {
                    field: field.to_string(),
                    value: text.to_string(),
                })
            })
            .collect()
    }

    /// Iterates over every nested struct named `name`.
    pub fn children<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a PackedStruct> + 'a {
        self.fields.iter().filter_map(move |(field, value)| match value {
            Value::Struct(child) if field == name => Some(child),
            _ => None,
        })
    }

    /// Serializes the struct to its XML form.
    pub fn to_xml(&self) -> String {
        let mut out = String::with_capacity(64 + self.fields.len() * 32);
        self.write_xml(&mut out);
        out
    }

    fn write_xml(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        out.push('>');
        for (field, value) in &self.fields {
            match value {
                Value::Text(text) => {
                    out.push('<');
                    out.push_str(field);
                    out.push('>');
                    escape_into(text, out);
                    out.push_str("</");
                    out.push_str(field);
                    out.push('>');
                }
                Value::Struct(child) => child.write_xml(out),
            }
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }

    /// Parses a struct from XML bytes.
    ///
    /// Trailing NUL padding and whitespace are ignored; anything else after
    /// the root element is an error.
    pub fn from_xml(input: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(input).map_err(|_| ProtocolError::InvalidUtf8)?;
        let text = text.trim_end_matches(|c: char| c == '\0' || c.is_whitespace());

        let mut parser = Parser { src: text, pos: 0 };
        let (name, value) = parser.element(1)?;
        parser.skip_ws();
        if parser.pos != text.len() {
            return Err(xml_error(format!(
                "trailing data after </{}> at offset {}",
                name, parser.pos
            )));
        }

        match value {
            Value::Struct(s) => Ok(s),
            // `<Name></Name>` is how a struct without fields is written.
            Value::Text(t) if t.is_empty() => Ok(PackedStruct::new(name)),
            Value::Text(_) => Err(xml_error(format!("root element <{}> holds text", name))),
        }
    }
}

fn xml_error(msg: impl Into<String>) -> ProtocolError {
    ProtocolError::Xml(msg.into())
}

fn escape_into(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
}

fn unescape(text: &str) -> Result<String, ProtocolError> {
    if !text.contains('&') {
        return Ok(text.to_string());
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        rest = &rest[start + 1..];
        let end = rest
            .find(';')
            .ok_or_else(|| xml_error("unterminated entity"))?;
        let entity = &rest[..end];
        let c = match entity {
            "amp" => '&',
            "lt" => '<',
            "gt" => '>',
            "quot" => '"',
            "apos" => '\'',
            _ => {
                let code = if let Some(hex) = entity.strip_prefix("#x") {
                    u32::from_str_radix(hex, 16).ok()
                } else if let Some(dec) = entity.strip_prefix('#') {
                    dec.parse().ok()
                } else {
                    None
                };
                code.and_then(char::from_u32)
                    .ok_or_else(|| xml_error(format!("unknown entity &{};", entity)))?
            }
        };
        out.push(c);
        rest = &rest[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Minimal strict reader for packing-instruction XML (no attributes,
/// no comments, no self-closing tags).
struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.src.len() - trimmed.len();
    }

    fn open_tag(&mut self) -> Result<&'a str, ProtocolError> {
        self.skip_ws();
        let rest = self.rest();
        if !rest.starts_with('<') || rest.starts_with("</") {
            return Err(xml_error(format!("expected opening tag at offset {}", self.pos)));
        }
        let end = rest
            .find('>')
            .ok_or_else(|| xml_error("unterminated tag"))?;
        let name = &rest[1..end];
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(xml_error(format!("invalid tag name {:?}", name)));
        }
        self.pos += end + 1;
        Ok(name)
    }

    fn close_tag(&mut self, name: &str) -> Result<(), ProtocolError> {
        let expected = format!("</{}>", name);
        if self.rest().starts_with(&expected) {
            self.pos += expected.len();
            Ok(())
        } else {
            Err(xml_error(format!(
                "expected {} at offset {}",
                expected, self.pos
            )))
        }
    }

    fn element(&mut self, depth: usize) -> Result<(String, Value), ProtocolError> {
        if depth > MAX_DEPTH {
            return Err(xml_error(format!(
                "nesting deeper than {} at offset {}",
                MAX_DEPTH, self.pos
            )));
        }
        let name = self.open_tag()?;
        let lookahead = self.rest().trim_start();

        if lookahead.starts_with('<') && !lookahead.starts_with("</") {
            let mut fields = Vec::new();
            loop {
                self.skip_ws();
                if self.rest().is_empty() {
                    return Err(xml_error(format!("unterminated element <{}>", name)));
                }
                if self.rest().starts_with("</") {
                    break;
                }
                fields.push(self.element(depth + 1)?);
            }
            self.close_tag(name)?;
            Ok((
                name.to_string(),
                Value::Struct(PackedStruct {
                    name: name.to_string(),
                    fields,
                }),
            ))
        } else {
            let rest = self.rest();
            let end = rest
                .find('<')
                .ok_or_else(|| xml_error(format!("unterminated element <{}>", name)))?;
            let text = unescape(&rest[..end])?;
            self.pos += end;
            self.close_tag(name)?;
            if text.trim().is_empty() && name.ends_with(STRUCT_SUFFIX) {
                return Ok((name.to_string(), Value::Struct(PackedStruct::new(name))));
            }
            Ok((name.to_string(), Value::Text(text)))
        }
    }
}
