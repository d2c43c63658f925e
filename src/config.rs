//! Compiler configuration.
//!
//! All knobs have working defaults; a JSON file can override any subset.
//! The pair `translate_templates` / `browser_side_cache` selects the cache
//! mode: serve pre-translated pages as-is, translate inline per request, or
//! translate with the body split into a browser-cacheable script.

use std::env;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cache::CacheMode;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Run the translator over templates. When false, templates are assumed
    /// already translated and are only located, cached, and served.
    pub translate_templates: bool,
    /// Split the translated body into a separate script the browser can
    /// cache. Only meaningful when `translate_templates` is set.
    pub browser_side_cache: bool,
    /// Strip `yst*` attributes from the generated literal markup.
    pub hide_yst_attrs: bool,
    /// Output encoding used when a template declares none.
    pub default_encoding: String,
    /// URL prefix prepended to the body script name in split-mode stub
    /// pages, pointing at whatever serves the body artifacts.
    pub body_resolver_prefix: String,
    /// Root directory of the template store.
    pub template_dir: PathBuf,
    /// Directory for on-disk artifact snapshots.
    pub snapshot_dir: PathBuf,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            translate_templates: false,
            browser_side_cache: false,
            hide_yst_attrs: true,
            default_encoding: "UTF-8".to_string(),
            body_resolver_prefix: String::new(),
            template_dir: PathBuf::from("yst"),
            snapshot_dir: env::temp_dir().join("yeast-templates"),
        }
    }
}

impl CompilerConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)?;
        let config: CompilerConfig = serde_json::from_str(&data)?;
        info!(
            path = %path.display(),
            mode = ?config.cache_mode(),
            "configuration loaded"
        );
        Ok(config)
    }

    pub fn cache_mode(&self) -> CacheMode {
        if !self.translate_templates {
            CacheMode::Basic
        } else if self.browser_side_cache {
            CacheMode::Split
        } else {
            CacheMode::Inline
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(io::Error),
    Parse(serde_json::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "cannot read configuration: {}", e),
            ConfigError::Parse(e) => write!(f, "invalid configuration: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
        }
    }
}

impl From<io::Error> for ConfigError {
    fn from(e: io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Parse(e)
    }
}
