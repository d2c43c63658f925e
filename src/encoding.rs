//! Template character-encoding detection.
//!
//! The charset has to be sniffed from the raw bytes before any decoding
//! happens, so the scan is bytewise: ASCII punctuation bytes are stable
//! across all supported ASCII-compatible encodings. The declared label is
//! taken from a `<meta ... charset=...>` declaration and validated against
//! a known-labels table; anything unrecognized falls back to the configured
//! default encoding.

use lazy_static::lazy_static;
use regex::bytes::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Target output encoding class. The compiler works in UTF-8 internally;
/// for non-UTF-8 targets the escaper entity-escapes everything outside the
/// representable range, so emitted bytes are valid in the declared charset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputEncoding {
    Utf8,
    Latin1,
    /// ASCII-safe fallback class, also used for multi-byte encodings such as
    /// Big5 or EUC-JP: all non-ASCII scalar values become numeric entities.
    Ascii,
}

lazy_static! {
    static ref ENCODING_LABELS: HashMap<&'static str, OutputEncoding> = {
        let mut m = HashMap::new();
        m.insert("utf-8", OutputEncoding::Utf8);
        m.insert("utf8", OutputEncoding::Utf8);
        m.insert("iso-8859-1", OutputEncoding::Latin1);
        m.insert("iso8859-1", OutputEncoding::Latin1);
        m.insert("latin1", OutputEncoding::Latin1);
        m.insert("l1", OutputEncoding::Latin1);
        m.insert("windows-1252", OutputEncoding::Latin1);
        m.insert("cp1252", OutputEncoding::Latin1);
        m.insert("us-ascii", OutputEncoding::Ascii);
        m.insert("ascii", OutputEncoding::Ascii);
        m.insert("iso-8859-15", OutputEncoding::Ascii);
        m.insert("big5", OutputEncoding::Ascii);
        m.insert("euc-jp", OutputEncoding::Ascii);
        m.insert("euc-kr", OutputEncoding::Ascii);
        m.insert("shift_jis", OutputEncoding::Ascii);
        m.insert("gb2312", OutputEncoding::Ascii);
        m.insert("gbk", OutputEncoding::Ascii);
        m
    };

    /// charset declaration inside a <meta> tag; covers both the
    /// http-equiv="Content-Type" form and the HTML5 charset attribute.
    static ref META_CHARSET_RE: Regex =
        Regex::new(r#"(?i-u)<meta[^>]*charset\s*=\s*["']?\s*([a-zA-Z0-9._:\-]+)"#).unwrap();
}

impl OutputEncoding {
    /// Look up an encoding by its declared label, case-insensitively.
    pub fn for_label(label: &str) -> Option<OutputEncoding> {
        ENCODING_LABELS
            .get(label.trim().to_ascii_lowercase().as_str())
            .copied()
    }

    /// Canonical label for this encoding class.
    pub fn label(self) -> &'static str {
        match self {
            OutputEncoding::Utf8 => "UTF-8",
            OutputEncoding::Latin1 => "ISO-8859-1",
            OutputEncoding::Ascii => "US-ASCII",
        }
    }

    pub fn can_represent(self, c: char) -> bool {
        match self {
            OutputEncoding::Utf8 => true,
            OutputEncoding::Latin1 => (c as u32) < 0x100,
            OutputEncoding::Ascii => c.is_ascii(),
        }
    }
}

impl Default for OutputEncoding {
    fn default() -> Self {
        OutputEncoding::Utf8
    }
}

/// Scan raw template bytes for a declared charset label.
/// Returns `None` if no meta declaration is found.
pub fn guess_charset(content: &[u8]) -> Option<String> {
    let caps = META_CHARSET_RE.captures(content)?;
    let label = String::from_utf8_lossy(caps.get(1)?.as_bytes())
        .trim()
        .to_string();
    if label.is_empty() {
        return None;
    }
    debug!(charset = %label, "detected template encoding declaration");
    Some(label)
}

/// Decode raw template bytes under the resolved encoding. Latin-1 is a
/// straight per-byte widening, so it never fails. The ASCII class covers
/// multi-byte charsets whose non-ASCII sequences are opaque to the
/// directive syntax; those decode as UTF-8, lossily, with a warning when
/// replacement actually happened.
pub fn decode_source(bytes: &[u8], encoding: OutputEncoding) -> String {
    match encoding {
        OutputEncoding::Latin1 => bytes.iter().map(|&b| b as char).collect(),
        OutputEncoding::Utf8 | OutputEncoding::Ascii => {
            match String::from_utf8_lossy(bytes) {
                std::borrow::Cow::Borrowed(text) => text.to_string(),
                std::borrow::Cow::Owned(text) => {
                    warn!(
                        encoding = encoding.label(),
                        "template contains byte sequences invalid in its declared encoding"
                    );
                    text
                }
            }
        }
    }
}

/// Resolve a sniffed label (if any) to an output encoding, falling back to
/// the configured default and finally to UTF-8. Unrecognized labels are
/// never fatal.
pub fn resolve_encoding(label: Option<&str>, default_label: &str) -> OutputEncoding {
    if let Some(label) = label {
        if let Some(enc) = OutputEncoding::for_label(label) {
            return enc;
        }
        warn!(charset = %label, "unrecognized template encoding, using default");
    }
    OutputEncoding::for_label(default_label).unwrap_or_else(|| {
        warn!(charset = %default_label, "unrecognized default encoding, using UTF-8");
        OutputEncoding::Utf8
    })
}
