//! The compiled-artifact cache.
//!
//! One `CacheEntry` per logical template. The entry owns the compiled
//! artifact behind an evictable handle, the last-load timestamp of the
//! source, and (for translating modes) an on-disk snapshot of the compiled
//! bytes. Lifecycle:
//!
//! - first access compiles the source and publishes artifact + timestamp
//!   together;
//! - a source modification time newer than the last load discards the entry
//!   state and recompiles;
//! - an evicted in-memory artifact is rebuilt from the snapshot using the
//!   bounds recorded at compile time, falling back to full recompilation
//!   when the snapshot cannot be read.
//!
//! Every read-check-publish sequence for one entry runs under that entry's
//! lock, so concurrent requests for the same template never compile twice.
//! Snapshot files are process-scoped temporaries; writing them is
//! best-effort and failure only costs a later recompilation.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::config::CompilerConfig;
use crate::encoding::{guess_charset, resolve_encoding, OutputEncoding};
use crate::model::{CompiledArtifact, ModelSpan};
use crate::parse::parse_template_bytes;
use crate::render::render_document;
use crate::source::TemplateSource;
use crate::split::SplitTranslator;
use crate::translate::{TranslateError, Translator};

/// What compilation does to a template before caching it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    /// Serve the source as-is; only locate the model section.
    Basic,
    /// Translate; the rendered body stays inline in the page.
    Inline,
    /// Translate; the body moves into a separately served script.
    Split,
}

#[derive(Debug)]
pub enum CompileError {
    Io(io::Error),
    Translate(TranslateError),
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Io(e) => write!(f, "cannot read template: {}", e),
            CompileError::Translate(e) => write!(f, "cannot translate template: {}", e),
        }
    }
}

impl std::error::Error for CompileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CompileError::Io(e) => Some(e),
            CompileError::Translate(e) => Some(e),
        }
    }
}

impl From<io::Error> for CompileError {
    fn from(e: io::Error) -> Self {
        CompileError::Io(e)
    }
}

impl From<TranslateError> for CompileError {
    fn from(e: TranslateError) -> Self {
        CompileError::Translate(e)
    }
}

struct SnapshotPaths {
    page: PathBuf,
    body: PathBuf,
    meta: PathBuf,
}

/// Sidecar written next to the page snapshot so a reload does not rescan
/// for model bounds or re-sniff the encoding.
#[derive(Serialize, Deserialize)]
struct SnapshotMeta {
    span: Option<ModelSpan>,
    encoding: OutputEncoding,
}

struct EntryState {
    last_load: Option<SystemTime>,
    artifact: Option<Arc<CompiledArtifact>>,
    body: Option<Arc<Vec<u8>>>,
    /// Model bounds of the last compiled artifact, kept so a snapshot
    /// reload does not rescan.
    span: Option<ModelSpan>,
    encoding: OutputEncoding,
}

/// One cached template. All mutation happens under the internal lock; the
/// published artifact is always consistent with `last_load` at the instant
/// it was produced.
pub struct CacheEntry {
    id: String,
    mode: CacheMode,
    source: Arc<dyn TemplateSource>,
    hide_yst_attrs: bool,
    default_encoding: String,
    snapshot: Option<SnapshotPaths>,
    /// File name of the body artifact in split mode.
    body_file_name: String,
    /// `src` of the stub body's loader script: resolver prefix + file name.
    body_src: String,
    state: Mutex<EntryState>,
}

impl CacheEntry {
    pub fn new(
        id: impl Into<String>,
        mode: CacheMode,
        source: Arc<dyn TemplateSource>,
        hide_yst_attrs: bool,
        default_encoding: impl Into<String>,
        snapshot_dir: Option<&Path>,
    ) -> Self {
        let id = id.into();
        let stem = snapshot_stem(&id);
        let body_file_name = format!("{}.body.js", stem);
        // basic mode serves the source directly; a snapshot would only
        // duplicate it
        let snapshot = match (mode, snapshot_dir) {
            (CacheMode::Basic, _) | (_, None) => None,
            (_, Some(dir)) => Some(SnapshotPaths {
                page: dir.join(format!("{}.html", stem)),
                body: dir.join(&body_file_name),
                meta: dir.join(format!("{}.meta.json", stem)),
            }),
        };
        Self {
            id,
            mode,
            source,
            hide_yst_attrs,
            default_encoding: default_encoding.into(),
            snapshot,
            body_src: body_file_name.clone(),
            body_file_name,
            state: Mutex::new(EntryState {
                last_load: None,
                artifact: None,
                body: None,
                span: None,
                encoding: OutputEncoding::default(),
            }),
        }
    }

    /// Prefix the loader-script `src` with a resolver URL.
    pub fn with_body_prefix(mut self, prefix: &str) -> Self {
        self.body_src = format!("{}{}", prefix, self.body_file_name);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn mode(&self) -> CacheMode {
        self.mode
    }

    /// The output encoding detected at the last compilation.
    pub fn encoding(&self) -> OutputEncoding {
        self.lock().encoding
    }

    /// The compiled page artifact, compiling or reloading as needed.
    pub fn get_content(&self) -> Result<Arc<CompiledArtifact>, CompileError> {
        let mut state = self.lock();
        self.ensure_current(&mut state)?;
        match &state.artifact {
            Some(artifact) => Ok(Arc::clone(artifact)),
            // ensure_current always publishes an artifact on success
            None => Err(CompileError::Io(io::Error::new(
                io::ErrorKind::Other,
                "artifact unavailable after compilation",
            ))),
        }
    }

    /// The separately served body script. `None` outside split mode.
    pub fn get_body(&self) -> Result<Option<Arc<Vec<u8>>>, CompileError> {
        let mut state = self.lock();
        self.ensure_current(&mut state)?;
        Ok(state.body.as_ref().map(Arc::clone))
    }

    /// Drop the in-memory artifact, as a memory-pressure hook. The next
    /// access reloads from the snapshot or recompiles.
    pub fn evict_artifact(&self) {
        let mut state = self.lock();
        state.artifact = None;
        state.body = None;
    }

    fn lock(&self) -> MutexGuard<'_, EntryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn ensure_current(&self, state: &mut EntryState) -> Result<(), CompileError> {
        if self.has_new_version(state) {
            info!(id = %self.id, source = %self.source.describe(), "new template version, recompiling");
            self.compile(state)?;
        } else if state.last_load.is_none() {
            self.compile(state)?;
        } else if state.artifact.is_none() {
            if let Err(e) = self.reload_snapshot(state) {
                warn!(id = %self.id, error = %e, "snapshot reload failed, recompiling");
                self.compile(state)?;
            }
        }
        Ok(())
    }

    /// A loaded entry is stale when the source has changed since the load.
    /// An unreadable modification time never invalidates a loaded entry.
    fn has_new_version(&self, state: &EntryState) -> bool {
        match (state.last_load, self.source.last_modified()) {
            (Some(last), Ok(modified)) => last < modified,
            (Some(_), Err(e)) => {
                warn!(id = %self.id, error = %e, "cannot stat template source");
                false
            }
            (None, _) => false,
        }
    }

    fn compile(&self, state: &mut EntryState) -> Result<(), CompileError> {
        let loaded_at = self
            .source
            .last_modified()
            .unwrap_or_else(|_| SystemTime::now());
        let raw = self.source.read()?;
        let encoding = resolve_encoding(guess_charset(&raw).as_deref(), &self.default_encoding);
        debug!(id = %self.id, mode = ?self.mode, encoding = encoding.label(), "compiling template");

        let (page, body) = match self.mode {
            CacheMode::Basic => (raw, None),
            CacheMode::Inline => {
                let doc = parse_template_bytes(&raw, encoding);
                let mut translator = Translator::new(self.hide_yst_attrs, encoding);
                let out = translator.translate(&doc)?;
                (render_document(&out, translator.escaper()), None)
            }
            CacheMode::Split => {
                let doc = parse_template_bytes(&raw, encoding);
                let mut translator = SplitTranslator::new(self.hide_yst_attrs, encoding);
                let out = translator.translate(&doc, &self.body_src)?;
                (
                    render_document(&out.page, translator.escaper()),
                    Some(out.body_script.into_bytes()),
                )
            }
        };

        let artifact = Arc::new(CompiledArtifact::new(page));
        if let Some(snapshot) = &self.snapshot {
            self.write_snapshot(snapshot, &artifact, encoding, body.as_deref());
        }

        state.last_load = Some(loaded_at);
        state.span = artifact.span();
        state.artifact = Some(artifact);
        state.body = body.map(Arc::new);
        state.encoding = encoding;
        Ok(())
    }

    fn write_snapshot(
        &self,
        snapshot: &SnapshotPaths,
        artifact: &CompiledArtifact,
        encoding: OutputEncoding,
        body: Option<&[u8]>,
    ) {
        if let Some(dir) = snapshot.page.parent() {
            if let Err(e) = fs::create_dir_all(dir) {
                warn!(id = %self.id, error = %e, "cannot create snapshot directory");
                return;
            }
        }
        if let Err(e) = fs::write(&snapshot.page, artifact.content()) {
            warn!(id = %self.id, path = %snapshot.page.display(), error = %e, "snapshot write failed");
        }
        let meta = SnapshotMeta {
            span: artifact.span(),
            encoding,
        };
        if let Ok(data) = serde_json::to_string(&meta) {
            if let Err(e) = fs::write(&snapshot.meta, data) {
                warn!(id = %self.id, path = %snapshot.meta.display(), error = %e, "snapshot metadata write failed");
            }
        }
        if let Some(body) = body {
            if let Err(e) = fs::write(&snapshot.body, body) {
                warn!(id = %self.id, path = %snapshot.body.display(), error = %e, "body snapshot write failed");
            }
        }
    }

    /// Rebuild the artifact from the snapshot, reusing the model bounds
    /// recorded when the snapshot was written. The metadata sidecar is
    /// preferred; failing that, the bounds still held in the entry state.
    fn reload_snapshot(&self, state: &mut EntryState) -> Result<(), io::Error> {
        let snapshot = self.snapshot.as_ref().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "no snapshot configured")
        })?;
        let page = fs::read(&snapshot.page)?;
        let body = match self.mode {
            CacheMode::Split => Some(Arc::new(fs::read(&snapshot.body)?)),
            _ => None,
        };
        let meta: Option<SnapshotMeta> = fs::read_to_string(&snapshot.meta)
            .ok()
            .and_then(|data| serde_json::from_str(&data).ok());
        let span = match &meta {
            Some(meta) => meta.span,
            None => state.span,
        };
        info!(id = %self.id, path = %snapshot.page.display(), "artifact reloaded from snapshot");
        state.artifact = Some(Arc::new(CompiledArtifact::with_span(page, span)));
        state.body = body;
        if let Some(meta) = meta {
            state.encoding = meta.encoding;
        }
        Ok(())
    }
}

/// Deterministic snapshot file stem for a template id.
fn snapshot_stem(id: &str) -> String {
    let safe: String = id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let mut hasher = Sha256::new();
    hasher.update(id.as_bytes());
    let hash = format!("{:x}", hasher.finalize());
    format!("{}-{}", safe.trim_matches('_'), &hash[..16])
}

/// The cache itself: one entry per template id, created lazily.
pub struct TemplateCache {
    config: CompilerConfig,
    entries: Mutex<HashMap<String, Arc<CacheEntry>>>,
}

impl TemplateCache {
    pub fn new(config: CompilerConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// The entry for `id`, creating it from `source` on first request.
    pub fn entry(&self, id: &str, source: Arc<dyn TemplateSource>) -> Arc<CacheEntry> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(entries.entry(id.to_string()).or_insert_with(|| {
            Arc::new(
                CacheEntry::new(
                    id,
                    self.config.cache_mode(),
                    source,
                    self.config.hide_yst_attrs,
                    self.config.default_encoding.clone(),
                    Some(self.config.snapshot_dir.as_path()),
                )
                .with_body_prefix(&self.config.body_resolver_prefix),
            )
        }))
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every in-memory artifact, keeping the entries and their
    /// snapshots. A memory-pressure hook.
    pub fn evict_artifacts(&self) {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        for entry in entries.values() {
            entry.evict_artifact();
        }
    }
}
