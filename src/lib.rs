//! # Yeast template compiler
//!
//! Compiles designer-authored HTML templates, annotated with `yst`
//! directives, into self-rendering pages, and caches the compiled artifacts
//! so an unchanged template is never recompiled per request.
//!
//! ## Compilation Invariants
//!
//! 1. **One directive per element**: the `yst` attribute selects exactly one
//!    directive from `{ignore, value, if, apply, compapply, declare,
//!    include, live, literal}`; anything else aborts the compilation.
//!
//! 2. **Input tree is read-only**: a translation never mutates the parsed
//!    tree it was given. Sibling grouping for `compapply` is computed over
//!    indices, not by rewriting attributes.
//!
//! 3. **Byte-stable model bounds**: the model-section locator runs on raw
//!    bytes before any encoding decision, so the recorded bounds stay valid
//!    for the exact byte sequence that is cached and served.
//!
//! 4. **Artifact/timestamp atomicity**: a cache entry publishes a new
//!    artifact only together with the source timestamp it was compiled
//!    from, under the entry's lock.
//!
//! 5. **Snapshots are disposable**: an unreadable or missing on-disk
//!    snapshot only costs a recompilation, never an error.

mod cache;
mod config;
mod directive;
mod encoding;
mod escape;
mod model;
mod parse;
mod render;
mod source;
mod split;
mod store;
mod translate;

#[cfg(test)]
mod compile_tests;

pub use cache::{CacheEntry, CacheMode, CompileError, TemplateCache};
pub use config::{CompilerConfig, ConfigError};
pub use directive::DirectiveKind;
pub use encoding::{decode_source, guess_charset, resolve_encoding, OutputEncoding};
pub use escape::{escape_js, Escaper};
pub use model::{find_model_section, CompiledArtifact, ModelSpan};
pub use parse::{parse_template_bytes, parse_template_str, AnnotatedNode, Attr, Document, Element};
pub use render::render_document;
pub use source::{FileSource, MemorySource, TemplateSource};
pub use split::{SplitDocument, SplitTranslator, DEFAULT_BODY_FUNCTION};
pub use store::FileTemplateStore;
pub use translate::{TranslateError, Translator};
