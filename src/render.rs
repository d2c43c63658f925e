//! Document serialization: transformed tree back to bytes.
//!
//! Output is compact (no synthetic indentation) so byte offsets computed by
//! the model-section locator stay meaningful. Text inside `script` and
//! `style` elements is written raw; everything else is entity-escaped
//! through the encoding-bounded escaper.

use lazy_static::lazy_static;
use std::collections::HashSet;

use crate::encoding::OutputEncoding;
use crate::escape::Escaper;
use crate::parse::{AnnotatedNode, Document};

lazy_static! {
    static ref VOID_ELEMENTS: HashSet<&'static str> = {
        let mut s = HashSet::new();
        for tag in [
            "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
            "source", "track", "wbr",
        ] {
            s.insert(tag);
        }
        s
    };
}

/// Serialize a document for the escaper's target encoding. The escaper
/// guarantees anything outside the target's representable range is already
/// an entity, so encoding is a straight per-character mapping.
pub fn render_document(doc: &Document, escaper: &Escaper) -> Vec<u8> {
    let mut out = String::new();
    for node in &doc.nodes {
        write_node(node, escaper, false, &mut out);
    }
    encode(out, escaper.encoding())
}

fn encode(text: String, encoding: OutputEncoding) -> Vec<u8> {
    match encoding {
        // every remaining char fits in one Latin-1 byte
        OutputEncoding::Latin1 => text
            .chars()
            .map(|c| if (c as u32) < 0x100 { c as u8 } else { b'?' })
            .collect(),
        OutputEncoding::Utf8 | OutputEncoding::Ascii => text.into_bytes(),
    }
}

/// Serialize a single node to a string. Used for error diagnostics dumps.
pub fn render_node(node: &AnnotatedNode, escaper: &Escaper) -> String {
    let mut out = String::new();
    write_node(node, escaper, false, &mut out);
    out
}

fn write_node(node: &AnnotatedNode, escaper: &Escaper, raw_text: bool, out: &mut String) {
    match node {
        AnnotatedNode::Doctype(name) => {
            out.push_str("<!DOCTYPE ");
            out.push_str(name);
            out.push('>');
        }
        AnnotatedNode::Text(text) => {
            if raw_text {
                out.push_str(text);
            } else {
                out.push_str(&escaper.map_entities(text));
            }
        }
        AnnotatedNode::Comment(text) => {
            out.push_str("<!--");
            out.push_str(text);
            out.push_str("-->");
        }
        AnnotatedNode::Element(el) => {
            out.push('<');
            out.push_str(&el.tag);
            for attr in &el.attrs {
                out.push(' ');
                out.push_str(&attr.name);
                out.push_str("=\"");
                out.push_str(&escaper.attr_value(&attr.value));
                out.push('"');
            }
            out.push('>');
            if VOID_ELEMENTS.contains(el.tag.to_ascii_lowercase().as_str()) {
                return;
            }
            let raw = el.tag.eq_ignore_ascii_case("script") || el.tag.eq_ignore_ascii_case("style");
            for child in &el.children {
                write_node(child, escaper, raw, out);
            }
            out.push_str("</");
            out.push_str(&el.tag);
            out.push('>');
        }
    }
}
