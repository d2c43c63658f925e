//! The template translator: annotated tree to a self-rendering document.
//!
//! The walk copies plain markup through untouched and replaces every
//! directive-bearing element with a generated `<script>` that rebuilds the
//! element's content on the client. Each directive compiles in one of two
//! shapes:
//!
//! - **top-level**: the directive stands in plain markup, so the generated
//!   expression is wrapped in `document.write(...)`;
//! - **nested**: the directive sits inside the literal body of an enclosing
//!   directive, so the expression is spliced into the surrounding string
//!   literal as an argument break.
//!
//! `declare` bodies compile in a third shape where the rendering context
//! (`contextValues`, `contextI`, `params`) is threaded through as variables
//! so the hoisted function can be re-invoked with live iteration state.
//!
//! Multi-branch `compapply` siblings are grouped by a pre-partition over the
//! child list (consumed-index set) rather than by rewriting sibling
//! attributes mid-walk; the parsed tree is never mutated.

use std::collections::HashSet;
use std::fmt;

use tracing::debug;

use crate::directive::{self, is_yst_attr, DirectiveKind};
use crate::encoding::OutputEncoding;
use crate::escape::{escape_js, unescape_embedded_script, Escaper};
use crate::parse::{find_element_mut, AnnotatedNode, Document, Element};
use crate::render::render_node;

pub(crate) const VALUE_F: &str = "YST.Txt.value";
pub(crate) const IF_F: &str = "YST.Txt.iff";
pub(crate) const APPLY_F: &str = "YST.Txt.apply";
pub(crate) const COMPAPPLY_F: &str = "YST.Txt.select";
pub(crate) const INCLUDE_F: &str = "YST.Txt.include";
pub(crate) const LITERAL_F: &str = "YST.Txt.literal";
pub(crate) const YSTBOOL_F: &str = "YST.Txt.ystBool";
const DW_F: &str = "document.write";

const PROCESSED_MARK: &str =
    "if (typeof YST != 'undefined') {YST.txtProcessing=true;YST.finishProcessing();}";

/// Errors raised while translating a template. A translation error aborts
/// the whole compilation; there is no partial output.
#[derive(Debug)]
pub enum TranslateError {
    /// The `yst` attribute named a directive outside the vocabulary.
    IllegalDirective { action: String, node: String },
    /// Cache-split translation requires a `<body>` element.
    MissingBody,
}

impl fmt::Display for TranslateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranslateError::IllegalDirective { action, node } => {
                write!(
                    f,
                    "illegal yst attribute value: {}
-------
{}
-------",
                    action, node
                )
            }
            TranslateError::MissingBody => {
                write!(f, "cache-split translation requires a <body> element")
            }
        }
    }
}

impl std::error::Error for TranslateError {}

/// Code-generation shape for a directive (see module docs).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Form {
    TopLevel,
    Nested,
    Declare,
}

impl Form {
    fn first_params(self) -> &'static str {
        match self {
            Form::Declare => "(contextValues,contextI,params,",
            _ => "([], 0, {},",
        }
    }
}

/// A function hoisted into the document head by a `declare` or `live` node.
#[derive(Debug, Clone)]
pub(crate) struct HoistedFunction {
    pub name: String,
    pub code: String,
}

/// The translator. One instance may compile many templates; hoisting state
/// is reset per translation.
pub struct Translator {
    hide_yst_attrs: bool,
    escaper: Escaper,
    pub(crate) hoisted: Vec<HoistedFunction>,
    /// Set by the cache-split variant: declare/live subtrees were already
    /// extracted in a pre-pass, so the walk must not hoist them again.
    pub(crate) pre_extracted: bool,
}

impl Translator {
    pub fn new(hide_yst_attrs: bool, encoding: OutputEncoding) -> Self {
        Self {
            hide_yst_attrs,
            escaper: Escaper::new(encoding),
            hoisted: Vec::new(),
            pre_extracted: false,
        }
    }

    pub fn escaper(&self) -> &Escaper {
        &self.escaper
    }

    /// Translate a parsed template into the self-rendering document. The
    /// input tree is left untouched; the result is a new tree.
    pub fn translate(&mut self, source: &Document) -> Result<Document, TranslateError> {
        self.hoisted.clear();
        let mut doc = source.clone();
        move_head_directives(&mut doc, "title");
        move_head_directives(&mut doc, "meta");
        let translated = self.translate_nodes(&doc.nodes)?;
        doc.nodes = translated;
        self.append_hoisted(&mut doc);
        append_processed_mark(&mut doc);
        Ok(doc)
    }

    /// Walk a sibling list, copying plain nodes and replacing directive
    /// elements with generated scripts. `compapply` groups are captured by
    /// index before any code is generated.
    pub(crate) fn translate_nodes(
        &mut self,
        nodes: &[AnnotatedNode],
    ) -> Result<Vec<AnnotatedNode>, TranslateError> {
        let mut out = Vec::with_capacity(nodes.len());
        let mut consumed = HashSet::new();
        for (i, node) in nodes.iter().enumerate() {
            if consumed.contains(&i) {
                continue; // captured into an earlier select group
            }
            let is_directive = node
                .as_element()
                .map(|el| {
                    !el.tag.eq_ignore_ascii_case("script")
                        && directive::directive_name(el).is_some()
                })
                .unwrap_or(false);
            if is_directive {
                if let Some(expr) = self.generate_directive(nodes, i, &mut consumed, Form::TopLevel)?
                {
                    out.push(script_node(&format!("{}({})", DW_F, expr)));
                }
                // the directive element itself never survives translation
            } else if let AnnotatedNode::Element(el) = node {
                out.push(AnnotatedNode::Element(Element {
                    tag: el.tag.clone(),
                    attrs: el.attrs.clone(),
                    children: self.translate_nodes(&el.children)?,
                }));
            } else {
                out.push(node.clone());
            }
        }
        Ok(out)
    }

    /// Generate the expression for the directive at `siblings[i]`. Returns
    /// `None` for directives that contribute nothing inline (`ignore`,
    /// `declare`). For `compapply`, captures the whole sibling group and
    /// marks the captured indices consumed.
    pub(crate) fn generate_directive(
        &mut self,
        siblings: &[AnnotatedNode],
        i: usize,
        consumed: &mut HashSet<usize>,
        form: Form,
    ) -> Result<Option<String>, TranslateError> {
        let node = &siblings[i];
        let el = match node.as_element() {
            Some(el) => el,
            None => return Ok(None),
        };
        let action = match directive::directive_name(el) {
            Some(a) => a,
            None => return Ok(None),
        };
        let kind = DirectiveKind::parse(action).ok_or_else(|| TranslateError::IllegalDirective {
            action: action.to_string(),
            node: render_node(node, &self.escaper),
        })?;
        debug!(tag = %el.tag, directive = %action, "translating node");

        let aux = self.aux_arg(el);
        let first = form.first_params();
        let expr = match kind {
            DirectiveKind::Ignore => return Ok(None),
            DirectiveKind::Value => self.simple_call(VALUE_F, node, &aux, form)?,
            DirectiveKind::Literal => self.simple_call(LITERAL_F, node, &aux, form)?,
            DirectiveKind::If => {
                let test = escape_js(directive::test_expr(el));
                let body = self.template_from_node(node, false, false)?;
                match form {
                    Form::Nested => format!("{},[{}'{}',['{}']]", IF_F, aux, test, body),
                    _ => format!("{}{}{}'{}',['{}'])", IF_F, first, aux, test, body),
                }
            }
            DirectiveKind::Apply => {
                let set = directive::set_name(el);
                let body = self.template_from_node(node, false, false)?;
                match form {
                    Form::Nested => format!("{},[{}'{}',['{}']]", APPLY_F, aux, set, body),
                    _ => format!("{}{}{}'{}',['{}'])", APPLY_F, first, aux, set, body),
                }
            }
            DirectiveKind::CompApply => {
                let members = capture_compapply_group(siblings, i, consumed);
                let set = directive::set_name(el);
                let mut expr = match form {
                    Form::Nested => format!("{}, ['{}'", COMPAPPLY_F, set),
                    _ => format!("{}{}'{}'", COMPAPPLY_F, first, set),
                };
                for idx in members {
                    let member = &siblings[idx];
                    let member_el = match member.as_element() {
                        Some(el) => el,
                        None => continue,
                    };
                    let test = escape_js(directive::test_expr(member_el));
                    let member_aux = self.aux_arg(member_el);
                    let body = self.template_from_node(member, false, false)?;
                    expr.push_str(&format!(",'{}',{}['{}']", test, member_aux, body));
                }
                expr.push_str(match form {
                    Form::Nested => "]",
                    _ => ")",
                });
                expr
            }
            DirectiveKind::Declare => {
                if !self.pre_extracted {
                    self.make_template_function(node, el)?;
                }
                return Ok(None);
            }
            DirectiveKind::Include => {
                let id_ref = directive::id_ref(el);
                let params = escape_js(directive::include_params(el));
                match form {
                    Form::Nested => format!("{},[{}'{}','{}']", INCLUDE_F, aux, id_ref, params),
                    _ => format!("{}{}{}'{}','{}')", INCLUDE_F, first, aux, id_ref, params),
                }
            }
            DirectiveKind::Live => {
                let func_name = if self.pre_extracted {
                    directive::node_id(el)
                } else {
                    self.make_template_function(node, el)?
                };
                let func_ref = match func_name {
                    Some(name) => format!("{},[]", name),
                    None => "''".to_string(),
                };
                // always the call form: the generated placeholder must be a
                // statement that writes the structural markup immediately
                format!(
                    "{}{}{}['{}',{},'</{}>'])",
                    VALUE_F,
                    first,
                    aux,
                    self.element_open_literal(el),
                    func_ref,
                    el.tag.to_ascii_lowercase()
                )
            }
        };
        Ok(Some(expr))
    }

    /// `value`/`literal` share one shape: the call carries only the aux
    /// expression and the literal body.
    fn simple_call(
        &mut self,
        func: &str,
        node: &AnnotatedNode,
        aux: &str,
        form: Form,
    ) -> Result<String, TranslateError> {
        let body = self.template_from_node(node, false, false)?;
        Ok(match form {
            Form::Nested => format!("{},[{}['{}']]", func, aux, body),
            f => format!("{}{}{}['{}'])", func, f.first_params(), aux, body),
        })
    }

    /// The aux argument slot: a quoted escaped expression or `null`, always
    /// followed by the separating comma.
    fn aux_arg(&self, el: &Element) -> String {
        match directive::aux_expr(el) {
            Some(v) => format!("'{}',", escape_js(v)),
            None => "null,".to_string(),
        }
    }

    /// Hoist a node's body into a named head function. Returns the function
    /// name, or `None` when the node has no usable `id` (which disables
    /// hoisting for that node).
    pub(crate) fn make_template_function(
        &mut self,
        node: &AnnotatedNode,
        el: &Element,
    ) -> Result<Option<String>, TranslateError> {
        let name = match directive::node_id(el) {
            Some(name) => name,
            None => return Ok(None),
        };
        let body = self.template_from_node(node, true, true)?;
        let code = format!(
            "function {}(contextValues, contextI, params) {{\nvar result = '{}';\nreturn result;\n}}\n",
            name, body
        );
        self.hoisted.push(HoistedFunction {
            name: name.clone(),
            code,
        });
        Ok(Some(name))
    }

    /// Compile a node's literal template text. `declare_mode` selects the
    /// statement-splice shape used inside hoisted function bodies;
    /// `only_inner` drops the node's own open/close tags (used for the
    /// declare body itself).
    pub(crate) fn template_from_node(
        &mut self,
        node: &AnnotatedNode,
        declare_mode: bool,
        only_inner: bool,
    ) -> Result<String, TranslateError> {
        if let AnnotatedNode::Comment(_) = node {
            return Ok(String::new());
        }
        let mut result = String::new();
        if !only_inner {
            result.push_str(&self.node_to_literal(node));
        }
        if let AnnotatedNode::Element(el) = node {
            let is_script = el.tag.eq_ignore_ascii_case("script");
            let mut consumed = HashSet::new();
            for (i, child) in el.children.iter().enumerate() {
                if consumed.contains(&i) {
                    continue;
                }
                let child_is_directive = child
                    .as_element()
                    .map(|c| directive::directive_name(c).is_some())
                    .unwrap_or(false);
                if child_is_directive && !is_script {
                    if declare_mode {
                        if let Some(code) =
                            self.generate_directive(&el.children, i, &mut consumed, Form::Declare)?
                        {
                            result.push_str(&format!("';\nresult += {};\nresult += '", code));
                        }
                    } else if let Some(code) =
                        self.generate_directive(&el.children, i, &mut consumed, Form::Nested)?
                    {
                        result.push_str(&format!("',{},'", code));
                    }
                } else {
                    let child_text = self.template_from_node(child, declare_mode, false)?;
                    if is_script {
                        result.push_str(&unescape_embedded_script(&child_text));
                    } else {
                        result.push_str(&child_text);
                    }
                }
            }
            if !only_inner && !el.tag.eq_ignore_ascii_case("br") {
                if is_script {
                    // split the close tag so the wrapper script survives
                    result.push_str(&format!("</'+'{}>", el.tag));
                } else {
                    result.push_str(&format!("</{}>", el.tag));
                }
            }
        }
        Ok(result)
    }

    /// The literal text of one node without its children: escaped text,
    /// escaped open tag (with `ystbool` rewritten into a runtime coercion
    /// call), or escaped doctype. Comments contribute nothing.
    fn node_to_literal(&self, node: &AnnotatedNode) -> String {
        match node {
            AnnotatedNode::Text(text) => escape_js(&self.escaper.map_entities(text)),
            AnnotatedNode::Element(el) => self.element_open_literal(el),
            AnnotatedNode::Doctype(name) => escape_js(&format!("<!DOCTYPE {}>", name)),
            AnnotatedNode::Comment(_) => String::new(),
        }
    }

    /// The escaped open-tag text of an element. A `ystbool` attribute is
    /// rewritten into a boolean-coercion call break instead of a literal
    /// value.
    pub(crate) fn element_open_literal(&self, el: &Element) -> String {
        let mut ystbool = None;
        let mut text = format!("<{}", el.tag);
        for attr in &el.attrs {
            if attr.name.eq_ignore_ascii_case("ystbool") {
                ystbool = Some(format!(
                    " ',{},['{}'],'",
                    YSTBOOL_F,
                    escape_js(&attr.value)
                ));
            }
            if self.hide_yst_attrs && is_yst_attr(&attr.name) {
                continue;
            }
            text.push_str(&format!(
                " {}=\"{}\"",
                attr.name,
                self.escaper.attr_value(&attr.value)
            ));
        }
        let mut text = escape_js(&text);
        if let Some(b) = ystbool {
            text.push_str(&b);
        }
        text.push('>');
        text
    }

    /// Append the functions hoisted during the walk as head scripts, marked
    /// so the cache-split extractor can recognize them.
    pub(crate) fn append_hoisted(&mut self, doc: &mut Document) {
        if self.hoisted.is_empty() {
            return;
        }
        if let Some(head) = find_element_mut(&mut doc.nodes, "head") {
            for func in self.hoisted.drain(..) {
                let mut script = Element::new("script");
                script.set_attr("type", "text/javascript");
                script.set_attr("yst", "declare");
                script.children.push(AnnotatedNode::Text(func.code));
                head.children.push(AnnotatedNode::Element(script));
            }
        }
    }
}

/// Capture the contiguous run of `compapply` siblings starting at `start`,
/// tolerating interleaved whitespace and comments, and mark every member
/// after the first as consumed so the walk emits nothing for it.
fn capture_compapply_group(
    siblings: &[AnnotatedNode],
    start: usize,
    consumed: &mut HashSet<usize>,
) -> Vec<usize> {
    let mut members = vec![start];
    for (j, node) in siblings.iter().enumerate().skip(start + 1) {
        if node.is_inter_element_space() {
            continue;
        }
        let is_compapply = node
            .as_element()
            .and_then(directive::directive_name)
            .and_then(DirectiveKind::parse)
            == Some(DirectiveKind::CompApply);
        if !is_compapply {
            break;
        }
        consumed.insert(j);
        members.push(j);
    }
    members
}

/// Generated scripts are plain `type="text/javascript"` elements.
fn script_node(text: &str) -> AnnotatedNode {
    let mut el = Element::new("script");
    el.set_attr("type", "text/javascript");
    el.children.push(AnnotatedNode::Text(text.to_string()));
    AnnotatedNode::Element(el)
}

/// Move directive-bearing `title`/`meta` elements to the end of `head` so
/// the generated engine scripts precede them in document order.
pub(crate) fn move_head_directives(doc: &mut Document, tag: &str) {
    if let Some(head) = find_element_mut(&mut doc.nodes, "head") {
        let mut kept = Vec::with_capacity(head.children.len());
        let mut moved = Vec::new();
        for child in head.children.drain(..) {
            let is_target = child
                .as_element()
                .map(|el| {
                    el.tag.eq_ignore_ascii_case(tag) && directive::directive_name(el).is_some()
                })
                .unwrap_or(false);
            if is_target {
                moved.push(child);
            } else {
                kept.push(child);
            }
        }
        kept.extend(moved);
        head.children = kept;
    }
}

/// Append the end-of-processing mark to the body.
pub(crate) fn append_processed_mark(doc: &mut Document) {
    if let Some(body) = find_element_mut(&mut doc.nodes, "body") {
        body.children.push(script_node(PROCESSED_MARK));
    }
}
