//! Text escaping primitives for generated template scripts.
//!
//! Every literal fragment of template markup ends up inside a single-quoted
//! JavaScript string, so two layers of escaping are involved:
//!
//! 1. entity mapping bounded by the target output encoding (markup safety),
//! 2. JavaScript string-literal escaping (script safety).
//!
//! `<script>` subtrees embedded in a template body go the other way: their
//! text was entity-encoded for markup safety but is re-emitted inside a
//! generated script, so the encoding must be reversed first.

use crate::encoding::OutputEncoding;

/// Escape a string for inclusion inside a single-quoted JavaScript string
/// literal. Control characters below U+0020 without a short escape are
/// emitted as `\uXXXX`.
pub fn escape_js(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        match c {
            '"' | '\'' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            '/' => out.push_str("\\/"),
            '\u{0008}' => out.push_str("\\b"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\u{000C}' => out.push_str("\\f"),
            '\r' => out.push_str("\\r"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out
}

/// Reverse the entity encoding applied to markup before it is embedded in a
/// generated script subtree. Line-feed entities become `\n` escapes because
/// the text lands inside a string literal, and a trailing backslash is
/// doubled so it cannot swallow the literal's closing quote.
pub fn unescape_embedded_script(s: &str) -> String {
    let mut out = s
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&#10;", "\\n");
    if out.ends_with('\\') {
        out.push('\\');
    }
    out
}

/// Entity escaper bounded by a target output encoding. Characters the target
/// encoding cannot represent are emitted as numeric character references so
/// the final byte stream stays valid in any supported encoding.
#[derive(Debug, Clone, Copy)]
pub struct Escaper {
    encoding: OutputEncoding,
}

impl Escaper {
    pub fn new(encoding: OutputEncoding) -> Self {
        Self { encoding }
    }

    pub fn encoding(&self) -> OutputEncoding {
        self.encoding
    }

    /// Entity-escape text content.
    pub fn map_entities(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for c in text.chars() {
            match c {
                '&' => out.push_str("&amp;"),
                '<' => out.push_str("&lt;"),
                '>' => out.push_str("&gt;"),
                '\u{00A0}' => out.push_str("&nbsp;"),
                c if !self.encoding.can_represent(c) => {
                    out.push_str(&format!("&#{};", c as u32));
                }
                c => out.push(c),
            }
        }
        out
    }

    /// Entity-escape an attribute value for emission between double quotes.
    pub fn attr_value(&self, value: &str) -> String {
        let mut out = String::with_capacity(value.len());
        for c in value.chars() {
            match c {
                '"' => out.push_str("&quot;"),
                '&' => out.push_str("&amp;"),
                '<' => out.push_str("&lt;"),
                '>' => out.push_str("&gt;"),
                c if !self.encoding.can_represent(c) => {
                    out.push_str(&format!("&#{};", c as u32));
                }
                c => out.push(c),
            }
        }
        out
    }
}
