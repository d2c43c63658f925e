//! End-to-end tests over the public pipeline: store/cache entry points,
//! full translation, model-section splicing, and snapshot survival.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use crate::cache::{CacheEntry, CacheMode};
use crate::config::CompilerConfig;
use crate::encoding::OutputEncoding;
use crate::source::{FileSource, MemorySource, TemplateSource};
use crate::store::FileTemplateStore;

const SHOP_TEMPLATE: &str = "<html><head>\
    <title>Shop</title>\
    <script yst=\"model\">var cart = {total: 3};</script>\
    </head><body>\
    <p>Total: <span yst=\"value\" ystaux=\"cart.total\">3</span></p>\
    <div yst=\"declare\" id=\"Row\"><li yst=\"apply\" ystset=\"cart.items\">item</li></div>\
    </body></html>";

fn temp_root(tag: &str) -> PathBuf {
    let root = std::env::temp_dir().join(format!(
        "yeast-e2e-{}-{}",
        tag,
        std::process::id()
    ));
    fs::remove_dir_all(&root).ok();
    root
}

fn store_with(tag: &str, split: bool, templates: &[(&str, &str)]) -> (PathBuf, FileTemplateStore) {
    let root = temp_root(tag);
    fs::create_dir_all(&root).unwrap();
    for (name, content) in templates {
        fs::write(root.join(name), content).unwrap();
    }
    let mut config = CompilerConfig::default();
    config.translate_templates = true;
    config.browser_side_cache = split;
    config.template_dir = root.clone();
    config.snapshot_dir = root.join(".snapshots");
    (root.clone(), FileTemplateStore::new(config))
}

#[test]
fn test_inline_pipeline_serves_spliced_model() {
    let (root, store) = store_with("inline", false, &[("shop.html", SHOP_TEMPLATE)]);
    let artifact = store.get_content("/shop.html").unwrap();
    assert!(artifact.is_template());

    let served = artifact.splice_model(b"<script yst=\"model\">var cart = {total: 42};</script>");
    let served = String::from_utf8(served).unwrap();
    assert!(served.contains("var cart = {total: 42};"));
    assert!(!served.contains("{total: 3}"));
    assert!(served.contains("YST.Txt.value([], 0, {},'cart.total',"));
    assert!(served.contains("function Row(contextValues, contextI, params)"));
    assert!(served.contains("YST.finishProcessing()"));
    fs::remove_dir_all(&root).ok();
}

#[test]
fn test_directive_free_template_only_gains_processed_mark() {
    let plain = "<html><head><title>t</title></head><body><p>hi</p></body></html>";
    let (root, store) = store_with("plain", false, &[("plain.html", plain)]);
    let artifact = store.get_content("/plain.html").unwrap();
    assert!(!artifact.is_template());
    let text = String::from_utf8(artifact.content().to_vec()).unwrap();
    assert!(text.contains("<p>hi</p>"));
    assert!(!text.contains("document.write"));
    assert_eq!(text.matches("<script").count(), 1); // the processed mark
    fs::remove_dir_all(&root).ok();
}

#[test]
fn test_split_pipeline_survives_eviction_and_source_loss() {
    let (root, store) = store_with("split", true, &[("shop.html", SHOP_TEMPLATE)]);
    let entry = store.entry("/shop.html").unwrap();

    let page = entry.get_content().unwrap();
    let body = entry.get_body().unwrap().expect("body script");
    let page_text = String::from_utf8(page.content().to_vec()).unwrap();
    let body_text = String::from_utf8(body.to_vec()).unwrap();
    // the model section stays in the stub page, spliceable as usual
    assert!(page.is_template());
    assert!(!page_text.contains("Total:"));
    assert!(body_text.contains("Total:"));
    assert!(body_text.contains("function Row(contextValues, contextI, params)"));
    assert!(body_text.ends_with("document.write(__TemplateBody([], 0, {}));"));

    entry.evict_artifact();
    fs::remove_file(root.join("shop.html")).unwrap();
    let reloaded_page = entry.get_content().unwrap();
    let reloaded_body = entry.get_body().unwrap().expect("body script");
    assert_eq!(page.content(), reloaded_page.content());
    assert_eq!(*body, *reloaded_body);
    fs::remove_dir_all(&root).ok();
}

#[test]
fn test_declared_charset_bounds_the_output() {
    let template = "<html><head>\
        <meta http-equiv=\"Content-Type\" content=\"text/html; charset=us-ascii\">\
        </head><body><p>caf\u{e9} \u{2014} open</p></body></html>";
    let (root, store) = store_with("charset", false, &[("cafe.html", template)]);
    let entry = store.entry("/cafe.html").unwrap();
    let artifact = entry.get_content().unwrap();
    assert_eq!(entry.encoding(), OutputEncoding::Ascii);
    let text = String::from_utf8(artifact.content().to_vec()).unwrap();
    assert!(text.contains("caf&#233;"));
    assert!(text.contains("&#8212;"));
    assert!(text.is_ascii());
    fs::remove_dir_all(&root).ok();
}

#[test]
fn test_latin1_source_bytes_survive_compilation() {
    let mut template = b"<html><head>\
        <meta http-equiv=\"Content-Type\" content=\"text/html; charset=ISO-8859-1\">\
        </head><body><p>caf"
        .to_vec();
    template.push(0xE9);
    template.extend_from_slice(b"</p></body></html>");
    let root = temp_root("latin1");
    fs::create_dir_all(&root).unwrap();
    fs::write(root.join("cafe.html"), &template).unwrap();
    let mut config = CompilerConfig::default();
    config.translate_templates = true;
    config.template_dir = root.clone();
    config.snapshot_dir = root.join(".snapshots");
    let store = FileTemplateStore::new(config);

    let entry = store.entry("/cafe.html").unwrap();
    let artifact = entry.get_content().unwrap();
    assert_eq!(entry.encoding(), OutputEncoding::Latin1);
    // the 0xE9 byte decodes as U+00E9 and is re-emitted as the same byte
    let content = artifact.content();
    let pos = content.windows(3).position(|w| w == b"caf").unwrap();
    assert_eq!(content[pos + 3], 0xE9);
    assert!(!String::from_utf8_lossy(content).contains('\u{fffd}'));
    fs::remove_dir_all(&root).ok();
}

#[test]
fn test_nested_select_uses_expression_shape() {
    let template = "<html><head></head><body><div yst=\"value\">\
        <p yst=\"compapply\" ystset=\"s\" ysttest=\"a\">A</p>\
        <p yst=\"compapply\" ysttest=\"b\">B</p>\
        </div></body></html>";
    let (root, store) = store_with("nested", false, &[("n.html", template)]);
    let artifact = store.get_content("/n.html").unwrap();
    let text = String::from_utf8(artifact.content().to_vec()).unwrap();
    assert!(text.contains("',YST.Txt.select, ['s','a',null,['<p>A</p>'],'b',null,['<p>B</p>']],'"));
    fs::remove_dir_all(&root).ok();
}

#[test]
fn test_script_inside_directive_body_gets_split_close_tag() {
    let template = "<html><head></head><body><div yst=\"value\">\
        <script>if (a &lt; b) go();</script>\
        </div></body></html>";
    let (root, store) = store_with("scriptbody", false, &[("s.html", template)]);
    let artifact = store.get_content("/s.html").unwrap();
    let text = String::from_utf8(artifact.content().to_vec()).unwrap();
    assert!(text.contains("if (a < b) go();"));
    assert!(text.contains("</'+'script>"));
    fs::remove_dir_all(&root).ok();
}

#[test]
fn test_concurrent_requests_share_one_artifact() {
    let source: Arc<dyn TemplateSource> = Arc::new(MemorySource::new(
        "concurrent",
        SHOP_TEMPLATE.as_bytes().to_vec(),
    ));
    let entry = Arc::new(CacheEntry::new(
        "/concurrent.html",
        CacheMode::Inline,
        source,
        true,
        "UTF-8",
        None,
    ));
    let first = entry.get_content().unwrap();
    std::thread::scope(|scope| {
        for _ in 0..8 {
            let entry = Arc::clone(&entry);
            let first = Arc::clone(&first);
            scope.spawn(move || {
                let artifact = entry.get_content().unwrap();
                assert!(Arc::ptr_eq(&artifact, &first));
            });
        }
    });
}

#[test]
fn test_edited_template_served_fresh_on_next_request() {
    let (root, store) = store_with("edit", false, &[("page.html", SHOP_TEMPLATE)]);
    let entry = store.entry("/page.html").unwrap();
    let first = entry.get_content().unwrap();

    // FileSource staleness needs an mtime newer than the recorded load
    let edited = SHOP_TEMPLATE.replace("Total", "Sum");
    fs::write(root.join("page.html"), &edited).unwrap();
    let path = root.join("page.html");
    let future = std::time::SystemTime::now() + std::time::Duration::from_secs(2);
    let file = fs::File::options().append(true).open(&path).unwrap();
    file.set_modified(future).unwrap();
    drop(file);

    let second = entry.get_content().unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    let text = String::from_utf8(second.content().to_vec()).unwrap();
    assert!(text.contains("Sum:"));
    fs::remove_dir_all(&root).ok();
}

#[test]
fn test_basic_mode_store_serves_pretranslated_pages() {
    let root = temp_root("basic");
    fs::create_dir_all(&root).unwrap();
    let pretranslated = "<html><body>\
        <script yst=\"model\">var m = 0;</script>\
        <script type=\"text/javascript\">document.write(YST.Txt.value([], 0, {},null,['<p>x</p>']))</script>\
        </body></html>";
    fs::write(root.join("done.html"), pretranslated).unwrap();
    let mut config = CompilerConfig::default();
    config.template_dir = root.clone();
    let store = FileTemplateStore::new(config);

    let artifact = store.get_content("/done.html").unwrap();
    assert_eq!(artifact.content(), pretranslated.as_bytes());
    assert!(artifact.is_template());
    fs::remove_dir_all(&root).ok();
}

#[test]
fn test_file_source_round_trip_matches_memory_source() {
    let root = temp_root("sources");
    fs::create_dir_all(&root).unwrap();
    fs::write(root.join("t.html"), SHOP_TEMPLATE).unwrap();
    let file_entry = CacheEntry::new(
        "/t.html",
        CacheMode::Inline,
        Arc::new(FileSource::new(root.join("t.html"))),
        true,
        "UTF-8",
        None,
    );
    let mem_entry = CacheEntry::new(
        "/t.html",
        CacheMode::Inline,
        Arc::new(MemorySource::new("t", SHOP_TEMPLATE.as_bytes().to_vec())),
        true,
        "UTF-8",
        None,
    );
    assert_eq!(
        file_entry.get_content().unwrap().content(),
        mem_entry.get_content().unwrap().content()
    );
    fs::remove_dir_all(&root).ok();
}
