//! In-memory XML tree for save files.
//!
//! Elements keep attribute order and every non-element node (text, comments,
//! CDATA, declarations, processing instructions) as raw markup. Attribute
//! values keep their source escaping until they are replaced, so a parse
//! followed by [`Document::to_bytes`] reproduces the input byte for byte.

use std::borrow::Cow;
use std::io::Write;

use quick_xml::escape::escape;
use quick_xml::events::attributes::Attribute as XmlAttribute;
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::name::QName;
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;

use crate::core_api::{CoreError, Stage};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    /// Character data, still escaped as it appeared in the source.
    Text(String),
    CData(String),
    Comment(String),
    Declaration(String),
    ProcessingInstruction(String),
    DocType(String),
}

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub key: String,
    /// Unescaped value.
    pub value: String,
    /// Value as it appeared in the source, still escaped. Dropped once the
    /// value is replaced.
    raw: Option<String>,
}

impl Attribute {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            raw: None,
        }
    }

    fn source_text(&self) -> Cow<'_, str> {
        match &self.raw {
            Some(raw) if !raw.contains('"') => Cow::Borrowed(raw.as_str()),
            _ => escape_value(&self.value),
        }
    }
}

/// Escapes markup characters plus the whitespace a parser would otherwise
/// normalize away inside an attribute value.
fn escape_value(value: &str) -> Cow<'_, str> {
    let escaped = escape(value);
    if !escaped.contains(['\n', '\r', '\t']) {
        return escaped;
    }
    Cow::Owned(
        escaped
            .replace('\n', "&#10;")
            .replace('\r', "&#13;")
            .replace('\t', "&#9;"),
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<Attribute>,
    pub children: Vec<Node>,
    self_closing: bool,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
            self_closing: true,
        }
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.key == key)
            .map(|a| a.value.as_str())
    }

    /// Replaces the value in place, or appends the attribute if it is new.
    pub fn set_attr(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|a| a.key == key) {
            Some(slot) => {
                slot.value = value;
                slot.raw = None;
            }
            None => self.attributes.push(Attribute::new(key, value)),
        }
    }

    pub fn push_child(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.child_elements().find(|e| e.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.children.iter_mut().find_map(|node| match node {
            Node::Element(e) if e.name == name => Some(e),
            _ => None,
        })
    }

    /// Pre-order walk over this element and everything below it.
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants { stack: vec![self] }
    }

    /// Mutable pre-order walk; `visit` sees a parent before its children.
    pub fn walk_mut<F: FnMut(&mut Element)>(&mut self, visit: &mut F) {
        visit(self);
        for node in &mut self.children {
            if let Node::Element(child) = node {
                child.walk_mut(visit);
            }
        }
    }
}

pub struct Descendants<'a> {
    stack: Vec<&'a Element>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Element;

    fn next(&mut self) -> Option<&'a Element> {
        let next = self.stack.pop()?;
        let start = self.stack.len();
        self.stack.extend(next.child_elements());
        self.stack[start..].reverse();
        Some(next)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Whether the source started with a UTF-8 byte order mark.
    pub bom: bool,
    pub nodes: Vec<Node>,
}

impl Document {
    pub fn parse(bytes: &[u8]) -> Result<Self, CoreError> {
        let (bom, body) = match bytes.strip_prefix(UTF8_BOM) {
            Some(rest) => (true, rest),
            None => (false, bytes),
        };
        let mut reader = Reader::from_reader(body);
        let mut stack: Vec<Element> = Vec::new();
        let mut nodes: Vec<Node> = Vec::new();

        loop {
            let event = reader.read_event().map_err(|e| {
                CoreError::format(
                    Stage::Parse,
                    format!("malformed XML at byte {}: {e}", reader.buffer_position()),
                )
            })?;

            match event {
                Event::Start(start) => {
                    let mut element = element_from_start(&start)?;
                    element.self_closing = false;
                    stack.push(element);
                }
                Event::Empty(start) => {
                    let element = element_from_start(&start)?;
                    attach(&mut stack, &mut nodes, Node::Element(element));
                }
                Event::End(end) => {
                    let name = utf8(end.name().as_ref())?;
                    let element = stack.pop().ok_or_else(|| {
                        CoreError::format(Stage::Parse, format!("unexpected closing tag </{name}>"))
                    })?;
                    if element.name != name {
                        return Err(CoreError::format(
                            Stage::Parse,
                            format!("expected </{}>, found </{name}>", element.name),
                        ));
                    }
                    attach(&mut stack, &mut nodes, Node::Element(element));
                }
                Event::Text(text) => attach(&mut stack, &mut nodes, Node::Text(utf8(&text)?)),
                Event::CData(data) => attach(&mut stack, &mut nodes, Node::CData(utf8(&data)?)),
                Event::Comment(text) => {
                    attach(&mut stack, &mut nodes, Node::Comment(utf8(&text)?))
                }
                Event::Decl(decl) => {
                    attach(&mut stack, &mut nodes, Node::Declaration(utf8(&decl)?))
                }
                Event::PI(pi) => {
                    attach(&mut stack, &mut nodes, Node::ProcessingInstruction(utf8(&pi)?))
                }
                Event::DocType(text) => attach(&mut stack, &mut nodes, Node::DocType(utf8(&text)?)),
                Event::Eof => break,
            }
        }

        if let Some(open) = stack.last() {
            return Err(CoreError::format(
                Stage::Parse,
                format!("document ended inside <{}>", open.name),
            ));
        }

        let document = Self { bom, nodes };
        if document.root().is_none() {
            return Err(CoreError::format(Stage::Parse, "document has no root element"));
        }
        Ok(document)
    }

    pub fn root(&self) -> Option<&Element> {
        self.nodes.iter().find_map(|node| match node {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    /// Every element in document order.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.nodes
            .iter()
            .filter_map(|node| match node {
                Node::Element(e) => Some(e),
                _ => None,
            })
            .flat_map(Element::descendants)
    }

    pub fn walk_mut<F: FnMut(&mut Element)>(&mut self, mut visit: F) {
        for node in &mut self.nodes {
            if let Node::Element(e) = node {
                e.walk_mut(&mut visit);
            }
        }
    }

    /// Serializes without adding any indentation or line breaks.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CoreError> {
        let mut out = Vec::new();
        if self.bom {
            out.extend_from_slice(UTF8_BOM);
        }
        let mut writer = Writer::new(out);
        for node in &self.nodes {
            write_node(&mut writer, node)?;
        }
        Ok(writer.into_inner())
    }
}

fn attach(stack: &mut [Element], nodes: &mut Vec<Node>, node: Node) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => nodes.push(node),
    }
}

fn element_from_start(start: &BytesStart<'_>) -> Result<Element, CoreError> {
    let mut element = Element::new(utf8(start.name().as_ref())?);
    for attr in start.attributes() {
        let attr = attr.map_err(|e| {
            CoreError::format(
                Stage::Parse,
                format!("bad attribute on <{}>: {e}", element.name),
            )
        })?;
        let key = utf8(attr.key.as_ref())?;
        let value = attr.unescape_value().map_err(|e| {
            CoreError::format(
                Stage::Parse,
                format!("bad value for {key} on <{}>: {e}", element.name),
            )
        })?;
        let raw = utf8(&attr.value)?;
        element.attributes.push(Attribute {
            key,
            value: value.into_owned(),
            raw: Some(raw),
        });
    }
    Ok(element)
}

fn utf8(bytes: &[u8]) -> Result<String, CoreError> {
    String::from_utf8(bytes.to_vec())
        .map_err(|e| CoreError::format(Stage::Parse, format!("document is not UTF-8: {e}")))
}

fn write_node(writer: &mut Writer<Vec<u8>>, node: &Node) -> Result<(), CoreError> {
    match node {
        Node::Element(element) => write_element(writer, element),
        Node::Text(raw) => write_raw(writer, &["", raw, ""]),
        Node::CData(raw) => write_raw(writer, &["<![CDATA[", raw, "]]>"]),
        Node::Comment(raw) => write_raw(writer, &["<!--", raw, "-->"]),
        Node::Declaration(raw) | Node::ProcessingInstruction(raw) => {
            write_raw(writer, &["<?", raw, "?>"])
        }
        Node::DocType(raw) => write_raw(writer, &["<!DOCTYPE ", raw, ">"]),
    }
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &Element) -> Result<(), CoreError> {
    let mut start = BytesStart::new(element.name.as_str());
    for attr in &element.attributes {
        let text = attr.source_text();
        start.push_attribute(XmlAttribute {
            key: QName(attr.key.as_bytes()),
            value: Cow::Borrowed(text.as_bytes()),
        });
    }

    if element.self_closing && element.children.is_empty() {
        return writer
            .write_event(Event::Empty(start))
            .map_err(|e| serialize_error(&element.name, e));
    }

    writer
        .write_event(Event::Start(start))
        .map_err(|e| serialize_error(&element.name, e))?;
    for child in &element.children {
        write_node(writer, child)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(element.name.as_str())))
        .map_err(|e| serialize_error(&element.name, e))
}

fn write_raw(writer: &mut Writer<Vec<u8>>, parts: &[&str]) -> Result<(), CoreError> {
    let out = writer.get_mut();
    for part in parts {
        out.write_all(part.as_bytes())
            .map_err(|e| CoreError::io(Stage::Serialize, e.to_string()))?;
    }
    Ok(())
}

fn serialize_error(name: &str, err: impl std::fmt::Display) -> CoreError {
    CoreError::io(Stage::Serialize, format!("writing <{name}>: {err}"))
}
