//! Directive resolution: reading the `yst` annotation vocabulary off a node.
//!
//! A node carries at most one directive, named by its `yst` attribute and
//! parameterized by the `yst*` companion attributes. Directive names match
//! case-insensitively; an absent or empty `yst` attribute means the node
//! carries no directive. Unknown names are reported by the resolver as
//! `None` from [`DirectiveKind::parse`] and turned into a hard compilation
//! error by the translator.

use crate::parse::Element;

/// The directive vocabulary. `ajax` and `live` are two spellings of the same
/// directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveKind {
    Ignore,
    Value,
    If,
    Apply,
    CompApply,
    Declare,
    Include,
    Live,
    Literal,
}

impl DirectiveKind {
    pub fn parse(name: &str) -> Option<DirectiveKind> {
        match name.trim().to_ascii_lowercase().as_str() {
            "ignore" => Some(DirectiveKind::Ignore),
            "value" => Some(DirectiveKind::Value),
            "if" => Some(DirectiveKind::If),
            "apply" => Some(DirectiveKind::Apply),
            "compapply" => Some(DirectiveKind::CompApply),
            "declare" => Some(DirectiveKind::Declare),
            "include" => Some(DirectiveKind::Include),
            "ajax" | "live" => Some(DirectiveKind::Live),
            "literal" => Some(DirectiveKind::Literal),
            _ => None,
        }
    }
}

/// Attribute names owned by the directive vocabulary.
const YST_ATTRS: [&str; 8] = [
    "yst", "ysttest", "ystset", "ystidref", "ystparams", "ystupto", "ystaux", "ystbool",
];

pub fn is_yst_attr(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    YST_ATTRS.iter().any(|a| *a == name)
}

/// The directive name carried by an element, or `None` when the `yst`
/// attribute is absent or empty.
pub fn directive_name(el: &Element) -> Option<&str> {
    el.attr("yst").map(str::trim).filter(|v| !v.is_empty())
}

/// The boolean test expression (`ysttest`), defaulting to `true`.
pub fn test_expr(el: &Element) -> &str {
    el.attr("ysttest")
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("true")
}

/// The target-set name: `ystset`, falling back to `ystupto`, then empty.
pub fn set_name(el: &Element) -> &str {
    el.attr("ystset")
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| el.attr("ystupto").map(str::trim).filter(|v| !v.is_empty()))
        .unwrap_or("")
}

/// The auxiliary expression (`ystaux`), `None` when absent or blank. The raw
/// (untrimmed) value is returned for emission.
pub fn aux_expr(el: &Element) -> Option<&str> {
    el.attr("ystaux").filter(|v| !v.trim().is_empty())
}

/// The referenced template id (`ystidref`) with embedded spaces replaced by
/// underscores.
pub fn id_ref(el: &Element) -> String {
    el.attr("ystidref").unwrap_or("").trim().replace(' ', "_")
}

/// The include parameter string (`ystparams`), empty when absent.
pub fn include_params(el: &Element) -> &str {
    el.attr("ystparams").unwrap_or("")
}

/// The node's `id` attribute shaped into a function name: trimmed, spaces
/// replaced by underscores. `None` when absent or empty.
pub fn node_id(el: &Element) -> Option<String> {
    el.attr("id")
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| v.replace(' ', "_"))
}
