//! The file-system template store.
//!
//! Templates are addressed by store-relative ids like `/shop/cart.html`.
//! The store maps ids to files under its root, hands them to the cache, and
//! can warm the whole cache up front by discovering and compiling every
//! template in parallel.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::cache::{CacheEntry, CompileError, TemplateCache};
use crate::config::CompilerConfig;
use crate::model::CompiledArtifact;
use crate::source::FileSource;

const TEMPLATE_EXTENSIONS: &[&str] = &["html", "htm", "yst"];

pub struct FileTemplateStore {
    root: PathBuf,
    cache: TemplateCache,
}

impl FileTemplateStore {
    /// Open the store rooted at `config.template_dir`.
    pub fn new(config: CompilerConfig) -> Self {
        let root = config.template_dir.clone();
        Self {
            root,
            cache: TemplateCache::new(config),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cache(&self) -> &TemplateCache {
        &self.cache
    }

    /// The cache entry for a template id.
    pub fn entry(&self, id: &str) -> Result<Arc<CacheEntry>, CompileError> {
        let id = normalize_id(id)?;
        let path = self.root.join(&id[1..]);
        Ok(self.cache.entry(&id, Arc::new(FileSource::new(path))))
    }

    /// Compiled content for a template id; the usual request entry point.
    pub fn get_content(&self, id: &str) -> Result<Arc<CompiledArtifact>, CompileError> {
        self.entry(id)?.get_content()
    }

    /// Walk the store root and collect every template id, sorted. Hidden
    /// directories are skipped; the snapshot directory may live under the
    /// root without its artifacts being rediscovered as templates.
    pub fn discover(&self) -> Vec<String> {
        let mut ids: Vec<String> = WalkDir::new(&self.root)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e))
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                e.path()
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| TEMPLATE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .filter_map(|e| {
                e.path()
                    .strip_prefix(&self.root)
                    .ok()
                    .map(|rel| format!("/{}", rel.to_string_lossy().replace('\\', "/")))
            })
            .collect();
        ids.sort();
        ids
    }

    /// Compile every discovered template, in parallel. Returns the ids that
    /// failed together with their errors; an empty result means a fully
    /// warmed cache.
    pub fn precompile(&self) -> Vec<(String, CompileError)> {
        let ids = self.discover();
        info!(root = %self.root.display(), count = ids.len(), "precompiling template store");
        let failures: Vec<(String, CompileError)> = ids
            .par_iter()
            .filter_map(|id| match self.get_content(id) {
                Ok(_) => None,
                Err(e) => {
                    warn!(id = %id, error = %e, "precompilation failed");
                    Some((id.clone(), e))
                }
            })
            .collect();
        failures
    }
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

/// Canonical form of a template id: leading slash, forward slashes, no
/// parent-directory escapes.
fn normalize_id(id: &str) -> Result<String, CompileError> {
    let trimmed = id.trim().replace('\\', "/");
    let with_slash = if trimmed.starts_with('/') {
        trimmed
    } else {
        format!("/{}", trimmed)
    };
    let escapes = with_slash
        .split('/')
        .any(|part| part == "..");
    if escapes || with_slash == "/" {
        return Err(CompileError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid template id: {}", id),
        )));
    }
    Ok(with_slash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const TEMPLATE: &str = "<html><head></head><body>\
        <script yst=\"model\">var x = 1;</script>\
        <span yst=\"value\" ystaux=\"x\">1</span></body></html>";

    fn store_fixture(tag: &str) -> (PathBuf, FileTemplateStore) {
        let root = std::env::temp_dir().join(format!(
            "yeast-store-test-{}-{}",
            tag,
            std::process::id()
        ));
        fs::remove_dir_all(&root).ok();
        fs::create_dir_all(root.join("shop")).unwrap();
        fs::write(root.join("index.html"), TEMPLATE).unwrap();
        fs::write(root.join("shop/cart.html"), TEMPLATE).unwrap();
        fs::write(root.join("notes.txt"), "not a template").unwrap();
        let mut config = CompilerConfig::default();
        config.translate_templates = true;
        config.template_dir = root.clone();
        config.snapshot_dir = root.join(".snapshots");
        (root.clone(), FileTemplateStore::new(config))
    }

    #[test]
    fn test_discover_finds_templates_only() {
        let (root, store) = store_fixture("discover");
        fs::create_dir_all(root.join(".snapshots")).unwrap();
        fs::write(root.join(".snapshots/page-abc.html"), "snapshot").unwrap();
        assert_eq!(store.discover(), vec!["/index.html", "/shop/cart.html"]);
        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_get_content_compiles_by_id() {
        let (root, store) = store_fixture("get");
        let artifact = store.get_content("/shop/cart.html").unwrap();
        assert!(artifact.is_template());
        let text = String::from_utf8(artifact.content().to_vec()).unwrap();
        assert!(text.contains("YST.Txt.value"));
        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_id_without_leading_slash_is_normalized() {
        let (root, store) = store_fixture("slash");
        let a = store.entry("index.html").unwrap();
        let b = store.entry("/index.html").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_traversal_ids_rejected() {
        let (root, store) = store_fixture("traversal");
        assert!(store.entry("/../secret.html").is_err());
        assert!(store.entry("..").is_err());
        assert!(store.entry("/").is_err());
        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_precompile_warms_every_template() {
        let (root, store) = store_fixture("warm");
        let failures = store.precompile();
        assert!(failures.is_empty());
        assert_eq!(store.cache().len(), 2);
        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_precompile_reports_failures() {
        let (root, store) = store_fixture("fail");
        fs::write(
            root.join("broken.html"),
            "<html><body><div yst=\"bogus\">x</div></body></html>",
        )
        .unwrap();
        let failures = store.precompile();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "/broken.html");
        fs::remove_dir_all(&root).ok();
    }
}
