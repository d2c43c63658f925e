//! Cache-split translation.
//!
//! The inline translator leaves the rendered body inside the page, so every
//! request re-sends the full generated markup. The split variant compiles
//! the whole `<body>` into one hoisted function and moves it, together with
//! every hoisted `declare`/`live` function, into a separate script artifact.
//! The page that remains carries a stub body whose only child is a loader
//! script pointing at that artifact, so the heavy generated code is fetched
//! once and cached by the browser.
//!
//! Hoisting runs as a post-order pre-pass over the body subtree; the main
//! walk then runs with pre-extraction enabled, so `declare` subtrees vanish
//! without re-hoisting and `live` placeholders reference their function by
//! the node id.

use tracing::debug;

use crate::directive::{self, DirectiveKind};
use crate::encoding::OutputEncoding;
use crate::escape::Escaper;
use crate::parse::{find_element, find_element_mut, AnnotatedNode, Document, Element};
use crate::translate::{append_processed_mark, move_head_directives, TranslateError, Translator};

/// Function name given to the body when the template's `<body>` has no id.
pub const DEFAULT_BODY_FUNCTION: &str = "__TemplateBody";

/// The two halves produced by a split translation.
pub struct SplitDocument {
    /// The stub page: original markup outside the body, plus a body whose
    /// only content is the loader script.
    pub page: Document,
    /// The script artifact: every hoisted function plus the final
    /// `document.write` that renders the body.
    pub body_script: String,
}

pub struct SplitTranslator {
    inner: Translator,
}

impl SplitTranslator {
    pub fn new(hide_yst_attrs: bool, encoding: OutputEncoding) -> Self {
        let mut inner = Translator::new(hide_yst_attrs, encoding);
        inner.pre_extracted = true;
        Self { inner }
    }

    pub fn escaper(&self) -> &Escaper {
        self.inner.escaper()
    }

    /// Translate `source` into a stub page and a body script. `body_file`
    /// becomes the `src` of the loader script in the stub body.
    pub fn translate(
        &mut self,
        source: &Document,
        body_file: &str,
    ) -> Result<SplitDocument, TranslateError> {
        self.inner.hoisted.clear();
        let mut doc = source.clone();
        move_head_directives(&mut doc, "title");
        move_head_directives(&mut doc, "meta");

        let body_el = find_element(&doc.nodes, "body")
            .cloned()
            .ok_or(TranslateError::MissingBody)?;

        // hoist declare/live subtrees, innermost first
        self.pre_extract(&AnnotatedNode::Element(body_el.clone()))?;

        let body_fn_name = body_function_name(&body_el);
        debug!(function = %body_fn_name, "hoisting template body");
        let mut named_body = body_el;
        named_body.set_attr("id", &body_fn_name);
        let body_node = AnnotatedNode::Element(named_body);
        if let AnnotatedNode::Element(ref el) = body_node {
            self.inner.make_template_function(&body_node, el)?;
        }

        // the page keeps only a stub body that loads the script artifact
        if let Some(body) = find_element_mut(&mut doc.nodes, "body") {
            body.remove_attr("yst");
            body.set_attr("id", &body_fn_name);
            let mut loader = Element::new("script");
            loader.set_attr("type", "text/javascript");
            loader.set_attr("src", body_file);
            body.children = vec![AnnotatedNode::Element(loader)];
        }

        let translated = self.inner.translate_nodes(&doc.nodes)?;
        doc.nodes = translated;
        append_processed_mark(&mut doc);

        let mut body_script = String::new();
        for func in self.inner.hoisted.drain(..).rev() {
            body_script.push('\n');
            body_script.push_str(func.code.trim());
        }
        body_script.push_str(&format!(
            "\ndocument.write({}([], 0, {{}}));",
            body_fn_name
        ));

        Ok(SplitDocument {
            page: doc,
            body_script,
        })
    }

    /// Post-order walk hoisting every `declare` and `live` subtree. Children
    /// hoist before their ancestors so an outer function body can reference
    /// an inner one that already exists.
    fn pre_extract(&mut self, node: &AnnotatedNode) -> Result<(), TranslateError> {
        let el = match node.as_element() {
            Some(el) => el,
            None => return Ok(()),
        };
        for child in &el.children {
            self.pre_extract(child)?;
        }
        match directive::directive_name(el).and_then(DirectiveKind::parse) {
            Some(DirectiveKind::Declare) | Some(DirectiveKind::Live) => {
                self.inner.make_template_function(node, el)?;
            }
            _ => {}
        }
        Ok(())
    }
}

fn body_function_name(body: &Element) -> String {
    match body.attr("id").map(str::trim).filter(|s| !s.is_empty()) {
        Some(id) => id.replace(' ', "_"),
        None => DEFAULT_BODY_FUNCTION.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_template_str;
    use crate::render::render_document;

    fn split_str(src: &str) -> (String, String) {
        let doc = parse_template_str(src);
        let mut tr = SplitTranslator::new(true, OutputEncoding::Utf8);
        let out = tr.translate(&doc, "page.body.js").expect("translation");
        let page = String::from_utf8(render_document(&out.page, tr.escaper())).unwrap();
        (page, out.body_script)
    }

    #[test]
    fn test_body_moves_into_script_artifact() {
        let (page, body) = split_str(
            "<html><head><title>t</title></head><body><p>content</p>\
             <span yst=\"value\" ystaux=\"m.x\">x</span></body></html>",
        );
        assert!(!page.contains("content"));
        assert!(page.contains("<script type=\"text/javascript\" src=\"page.body.js\">"));
        assert!(page.contains("id=\"__TemplateBody\""));
        assert!(body.contains("function __TemplateBody(contextValues, contextI, params)"));
        assert!(body.contains("<p>content</p>"));
        assert!(body.ends_with("\ndocument.write(__TemplateBody([], 0, {}));"));
    }

    #[test]
    fn test_body_id_names_the_function() {
        let (page, body) = split_str(
            "<html><head></head><body id=\"Main Page\"><p>x</p></body></html>",
        );
        assert!(page.contains("id=\"Main_Page\""));
        assert!(body.contains("function Main_Page(contextValues, contextI, params)"));
        assert!(body.ends_with("document.write(Main_Page([], 0, {}));"));
    }

    #[test]
    fn test_declares_extracted_not_left_in_page() {
        let (page, body) = split_str(
            "<html><head></head><body>\
             <div yst=\"declare\" id=\"Row\"><li>r</li></div>\
             <p>p</p></body></html>",
        );
        assert!(body.contains("function Row(contextValues, contextI, params)"));
        assert!(!page.contains("function Row"));
        assert!(!page.contains("yst=\"declare\""));
    }

    #[test]
    fn test_body_function_precedes_declares_in_artifact() {
        let (_, body) = split_str(
            "<html><head></head><body>\
             <div yst=\"declare\" id=\"Row\"><li>r</li></div>\
             </body></html>",
        );
        let body_pos = body.find("function __TemplateBody").unwrap();
        let row_pos = body.find("function Row").unwrap();
        assert!(body_pos < row_pos);
    }

    #[test]
    fn test_live_placeholder_references_extracted_function() {
        let (_, body) = split_str(
            "<html><head></head><body><div yst=\"live\" id=\"Region\">z</div></body></html>",
        );
        assert!(body.contains("function Region(contextValues, contextI, params)"));
        assert!(body.contains(",Region,[],"));
    }

    #[test]
    fn test_body_attrs_survive_on_stub() {
        let (page, _) =
            split_str("<html><head></head><body class=\"dark\"><p>x</p></body></html>");
        assert!(page.contains("class=\"dark\""));
    }

    #[test]
    fn test_head_directives_still_compile_in_page() {
        let (page, _) = split_str(
            "<html><head><title yst=\"value\" ystaux=\"m.t\">T</title></head>\
             <body><p>x</p></body></html>",
        );
        assert!(page.contains("document.write(YST.Txt.value([], 0, {},'m.t',"));
    }

    #[test]
    fn test_missing_body_is_error() {
        let doc = Document { nodes: vec![] };
        let mut tr = SplitTranslator::new(true, OutputEncoding::Utf8);
        match tr.translate(&doc, "x.js") {
            Err(TranslateError::MissingBody) => {}
            other => panic!("expected MissingBody, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_processed_mark_in_stub_body() {
        let (page, _) = split_str("<html><head></head><body><p>x</p></body></html>");
        assert!(page.contains("YST.finishProcessing()"));
    }
}
