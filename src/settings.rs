//! Layered key/value settings store.
//!
//! Holds the per-key defaults, the flag and env bindings, and the config file
//! layer. Effective values are computed on demand from a [`ResolveInput`], so
//! the store itself never reads the process environment.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use toml::{Table, Value};
use tracing::{debug, info};

use crate::error::CharmError;
use crate::file;
use crate::merge::{get_dotted, insert_dotted};
use crate::resolve::{self, Layer, ResolveInput, Resolved};
use crate::types::{ConfigFormat, FieldKind};

/// How one settings key is wired to flags and env vars.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct KeyBinding {
    pub kind: FieldKind,
    pub flag: Option<String>,
    pub env: Option<String>,
}

/// Where to look for the config file.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ConfigSource {
    None,
    /// Search `dir` for `<base_name>.<ext>`.
    Search { dir: PathBuf, base_name: String },
    /// Exactly this file.
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct Settings {
    defaults: Table,
    bindings: BTreeMap<String, KeyBinding>,
    source: ConfigSource,
    config_type: Option<ConfigFormat>,
    file_layer: Table,
    file_used: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}

impl Settings {
    pub fn new() -> Self {
        Self {
            defaults: Table::new(),
            bindings: BTreeMap::new(),
            source: ConfigSource::None,
            config_type: None,
            file_layer: Table::new(),
            file_used: None,
        }
    }

    pub fn set_default(&mut self, key: &str, value: Value) {
        insert_dotted(&mut self.defaults, key, value);
    }

    /// Compiled-in defaults as a nested table.
    pub fn defaults(&self) -> &Table {
        &self.defaults
    }

    pub(crate) fn bind_flag(&mut self, key: &str, kind: FieldKind, flag: &str) {
        self.binding_mut(key, kind).flag = Some(flag.to_string());
    }

    pub(crate) fn bind_env(&mut self, key: &str, kind: FieldKind, var: &str) {
        self.binding_mut(key, kind).env = Some(var.to_string());
    }

    fn binding_mut(&mut self, key: &str, kind: FieldKind) -> &mut KeyBinding {
        self.bindings
            .entry(key.to_string())
            .or_insert_with(|| KeyBinding {
                kind,
                flag: None,
                env: None,
            })
    }

    /// Env var bound to `key`, if any.
    pub fn env_binding(&self, key: &str) -> Option<&str> {
        self.bindings.get(key)?.env.as_deref()
    }

    /// Flag id bound to `key`, if any.
    pub fn flag_binding(&self, key: &str) -> Option<&str> {
        self.bindings.get(key)?.flag.as_deref()
    }

    /// Bound keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    /// Search `dir` for `<base_name>.<ext>` on the next read. The format
    /// always follows the found file's extension.
    pub fn search_config_in(&mut self, dir: impl Into<PathBuf>, base_name: &str) {
        self.source = ConfigSource::Search {
            dir: dir.into(),
            base_name: base_name.to_string(),
        };
        self.config_type = None;
    }

    /// Read exactly `path` on the next read. Clears any forced format; call
    /// [`set_config_type`](Self::set_config_type) afterwards to force one.
    pub fn set_config_file(&mut self, path: impl Into<PathBuf>) {
        self.source = ConfigSource::File(path.into());
        self.config_type = None;
    }

    /// Force the format of an exact config file.
    pub fn set_config_type(&mut self, format: ConfigFormat) {
        self.config_type = Some(format);
    }

    /// Forget the config source and drop the file layer.
    pub fn clear_config(&mut self) {
        self.source = ConfigSource::None;
        self.config_type = None;
        self.file_layer = Table::new();
        self.file_used = None;
    }

    /// Locate, read and parse the configured file, replacing the previous
    /// file layer. On error the file layer is left empty.
    pub fn read_in_config(&mut self) -> Result<(), CharmError> {
        self.file_layer = Table::new();
        self.file_used = None;

        let (path, format) = match &self.source {
            ConfigSource::None => return Ok(()),
            ConfigSource::Search { dir, base_name } => file::search_dir(dir, base_name)?,
            ConfigSource::File(path) => {
                let format = self
                    .config_type
                    .or_else(|| ConfigFormat::from_path(path))
                    .ok_or_else(|| {
                        CharmError::UnsupportedConfigType(
                            path.extension()
                                .map(|e| e.to_string_lossy().into_owned())
                                .unwrap_or_default(),
                        )
                    })?;
                (path.clone(), format)
            }
        };

        debug!(path = %path.display(), %format, "reading config file");
        let table = file::load(&path, format)?;
        info!(path = %path.display(), keys = table.len(), "merged config file");
        self.file_layer = table;
        self.file_used = Some(path);
        Ok(())
    }

    /// The file merged by the last successful [`read_in_config`](Self::read_in_config).
    pub fn config_file_used(&self) -> Option<&Path> {
        self.file_used.as_deref()
    }

    /// The raw config file layer.
    pub fn file_layer(&self) -> &Table {
        &self.file_layer
    }

    /// Effective settings for every key, plus where each bound key came from.
    pub fn resolve(&self, input: &ResolveInput<'_>) -> Result<Resolved, CharmError> {
        resolve::resolve(&self.defaults, &self.file_layer, &self.bindings, input)
    }

    /// Effective settings as a nested table.
    pub fn all_settings(&self, input: &ResolveInput<'_>) -> Result<Table, CharmError> {
        Ok(self.resolve(input)?.table)
    }

    /// Effective value of one dotted key.
    pub fn get(&self, key: &str, input: &ResolveInput<'_>) -> Result<Option<Value>, CharmError> {
        let table = self.all_settings(input)?;
        Ok(get_dotted(&table, key).cloned())
    }

    /// Which layer supplies `key`. `None` for keys that are not bound.
    pub fn source_of(&self, key: &str, input: &ResolveInput<'_>) -> Result<Option<Layer>, CharmError> {
        Ok(self.resolve(input)?.sources.remove(key))
    }
}
