//! Model-section location and the compiled artifact.
//!
//! A compiled page carries one designated `<script yst="model">...</script>`
//! region whose test data is replaced with live data at serve time. The
//! locator works on raw bytes, not decoded text: it runs before the page
//! encoding is known, and ASCII punctuation bytes are stable across every
//! encoding we emit, so a bytewise scan is both correct and cheap.

use lazy_static::lazy_static;
use regex::bytes::Regex;
use serde::{Deserialize, Serialize};
use tracing::trace;

lazy_static! {
    static ref SCRIPT_OPEN_RE: Regex = Regex::new(r"(?i-u)<script").unwrap();
    static ref MODEL_ATTR_RE: Regex = Regex::new(r#"(?i-u)yst\s*=\s*["']\s*model"#).unwrap();
    static ref SCRIPT_CLOSE_RE: Regex = Regex::new(r"(?i-u)</script>").unwrap();
    static ref NESTED_OPEN_RE: Regex = Regex::new(r"(?i-u)<script>").unwrap();
}

const SCRIPT_CLOSE_LEN: usize = "</script>".len();

/// Byte bounds of the model section. `start` is the opening `<script`;
/// `end` is one past the closing `</script>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpan {
    pub start: usize,
    pub end: usize,
}

/// Scan compiled bytes for the model-section bounds.
///
/// Matching is case-insensitive and tolerates whitespace around `=` and
/// inside the quotes. A candidate whose body contains a nested bare
/// `<script>` before its close tag is ill-formed markup; it is discarded
/// and the scan continues with the next candidate.
pub fn find_model_section(bytes: &[u8]) -> Option<ModelSpan> {
    let mut from = 0;
    while let Some(m) = SCRIPT_OPEN_RE.find(&bytes[from..]) {
        let open = from + m.start();
        let tag_len = match bytes[open..].iter().position(|&b| b == b'>') {
            Some(pos) => pos,
            None => return None, // unterminated tag, nothing useful follows
        };
        if MODEL_ATTR_RE.is_match(&bytes[open..open + tag_len]) {
            let rest = &bytes[open..];
            let close = SCRIPT_CLOSE_RE.find(rest);
            let nested = NESTED_OPEN_RE.find(rest);
            if let Some(c) = close {
                if nested.map_or(true, |n| n.start() > c.start()) {
                    let span = ModelSpan {
                        start: open,
                        end: open + c.start() + SCRIPT_CLOSE_LEN,
                    };
                    trace!(start = span.start, end = span.end, "model section located");
                    return Some(span);
                }
            }
            trace!(at = open, "ill-formed model section candidate skipped");
        }
        from = open + "<script".len();
    }
    None
}

/// The output of one compilation: the full compiled byte sequence plus the
/// model-section bounds within it. A page with no model section is plain
/// HTML and is served verbatim.
#[derive(Debug, Clone)]
pub struct CompiledArtifact {
    content: Vec<u8>,
    span: Option<ModelSpan>,
}

impl CompiledArtifact {
    /// Wrap freshly compiled bytes, locating the model section.
    pub fn new(content: Vec<u8>) -> Self {
        let span = find_model_section(&content);
        Self { content, span }
    }

    /// Wrap bytes reloaded from a snapshot, reusing previously recorded
    /// bounds instead of rescanning.
    pub fn with_span(content: Vec<u8>, span: Option<ModelSpan>) -> Self {
        Self { content, span }
    }

    /// The full compiled bytes, designer test data included.
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn span(&self) -> Option<ModelSpan> {
        self.span
    }

    /// False when the page carries no model section and is plain HTML.
    pub fn is_template(&self) -> bool {
        self.span.is_some()
    }

    /// Serve-time splice: replace the model section with `model_script`.
    /// Plain HTML is returned unchanged.
    pub fn splice_model(&self, model_script: &[u8]) -> Vec<u8> {
        match self.span {
            Some(span) => {
                let mut out =
                    Vec::with_capacity(self.content.len() + model_script.len());
                out.extend_from_slice(&self.content[..span.start]);
                out.extend_from_slice(model_script);
                out.extend_from_slice(&self.content[span.end..]);
                out
            }
            None => self.content.clone(),
        }
    }
}
