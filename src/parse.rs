//! Template parsing: raw bytes to an owned annotated node tree.
//!
//! html5ever builds the DOM; the rcdom handles are immediately converted to
//! an owned [`AnnotatedNode`] tree so the rest of the compiler never touches
//! reference-counted cells. The tree produced here is a one-shot input per
//! compilation: the translator works on its own copy and the parsed tree is
//! never mutated across compilations.

use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{Handle, NodeData, RcDom};

use crate::encoding::{decode_source, OutputEncoding};

/// A single element attribute with original document order preserved.
#[derive(Debug, Clone, PartialEq)]
pub struct Attr {
    pub name: String,
    pub value: String,
}

/// An element node: tag name, ordered attributes, ordered children.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub tag: String,
    pub attrs: Vec<Attr>,
    pub children: Vec<AnnotatedNode>,
}

impl Element {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
            .map(|a| a.value.as_str())
    }

    /// Replace the value of an attribute, or append it.
    pub fn set_attr(&mut self, name: &str, value: &str) {
        if let Some(a) = self
            .attrs
            .iter_mut()
            .find(|a| a.name.eq_ignore_ascii_case(name))
        {
            a.value = value.to_string();
        } else {
            self.attrs.push(Attr {
                name: name.to_string(),
                value: value.to_string(),
            });
        }
    }

    pub fn remove_attr(&mut self, name: &str) {
        self.attrs.retain(|a| !a.name.eq_ignore_ascii_case(name));
    }
}

/// One node of the annotated source tree.
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotatedNode {
    Element(Element),
    Text(String),
    Comment(String),
    Doctype(String),
}

impl AnnotatedNode {
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            AnnotatedNode::Element(el) => Some(el),
            _ => None,
        }
    }

    /// True for text nodes containing only whitespace and for comments;
    /// such nodes do not break sibling-group contiguity.
    pub fn is_inter_element_space(&self) -> bool {
        match self {
            AnnotatedNode::Text(t) => t.trim().is_empty(),
            AnnotatedNode::Comment(_) => true,
            _ => false,
        }
    }
}

/// The parsed template document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    pub nodes: Vec<AnnotatedNode>,
}

/// Parse raw template bytes into an annotated tree. html5ever normalizes the
/// document structure (synthesizing `html`/`head`/`body` where absent) and
/// lowercases tag and attribute names; both behaviors are relied on by the
/// translator.
///
/// `encoding` is the encoding the bytes were sniffed as; it selects the
/// decoder, so a Latin-1 template keeps its non-ASCII characters instead of
/// being mangled by a UTF-8 read.
pub fn parse_template_bytes(bytes: &[u8], encoding: OutputEncoding) -> Document {
    parse_template_str(&decode_source(bytes, encoding))
}

/// Parse already-decoded template text.
pub fn parse_template_str(text: &str) -> Document {
    let dom = parse_document(RcDom::default(), Default::default()).one(text);
    let mut nodes = Vec::new();
    collect_nodes(&dom.document, &mut nodes);
    Document { nodes }
}

fn collect_nodes(handle: &Handle, out: &mut Vec<AnnotatedNode>) {
    match &handle.data {
        NodeData::Document => {
            for child in handle.children.borrow().iter() {
                collect_nodes(child, out);
            }
        }
        NodeData::Doctype { name, .. } => {
            out.push(AnnotatedNode::Doctype(name.to_string()));
        }
        NodeData::Text { contents } => {
            out.push(AnnotatedNode::Text(contents.borrow().to_string()));
        }
        NodeData::Comment { contents } => {
            out.push(AnnotatedNode::Comment(contents.to_string()));
        }
        NodeData::Element { name, attrs, .. } => {
            let mut element = Element::new(&name.local);
            for attr in attrs.borrow().iter() {
                element.attrs.push(Attr {
                    name: attr.name.local.to_string(),
                    value: attr.value.to_string(),
                });
            }
            for child in handle.children.borrow().iter() {
                collect_nodes(child, &mut element.children);
            }
            out.push(AnnotatedNode::Element(element));
        }
        NodeData::ProcessingInstruction { .. } => {}
    }
}

/// Depth-first search for the first element with the given tag name.
pub fn find_element<'a>(nodes: &'a [AnnotatedNode], tag: &str) -> Option<&'a Element> {
    for node in nodes {
        if let AnnotatedNode::Element(el) = node {
            if el.tag.eq_ignore_ascii_case(tag) {
                return Some(el);
            }
            if let Some(found) = find_element(&el.children, tag) {
                return Some(found);
            }
        }
    }
    None
}

/// Mutable variant of [`find_element`].
pub fn find_element_mut<'a>(nodes: &'a mut [AnnotatedNode], tag: &str) -> Option<&'a mut Element> {
    for node in nodes.iter_mut() {
        if let AnnotatedNode::Element(el) = node {
            if el.tag.eq_ignore_ascii_case(tag) {
                return Some(el);
            }
            if let Some(found) = find_element_mut(&mut el.children, tag) {
                return Some(found);
            }
        }
    }
    None
}
