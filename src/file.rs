//! Config file classification, discovery and loading.
//!
//! # Classification
//!
//! A configured path is stat'ed once and sorted into one of:
//!
//! - a **directory**: search it for `<base name>.<ext>`, trying
//!   [`ConfigFormat::SEARCH_EXTENSIONS`] in order; the found file's extension
//!   picks the format.
//! - a **file with a known extension**: the extension picks the format.
//! - a **file with no or an unknown extension**: the configured file type
//!   picks the format. An unknown extension is not an error.
//!
//! A path that does not exist is [`ConfigPathNotFound`](CharmError::ConfigPathNotFound).
//! Any other stat failure is [`ConfigPathIndeterminate`](CharmError::ConfigPathIndeterminate):
//! the file may well exist, we just cannot tell.
//!
//! # Loading
//!
//! Every format is parsed straight into a `toml::Table`, the common currency
//! of the settings layers.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use toml::Table;
use tracing::debug;

use crate::error::CharmError;
use crate::types::ConfigFormat;

/// What a configured path turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Classified {
    Directory(PathBuf),
    File {
        path: PathBuf,
        /// Format implied by the extension, when the extension is known.
        inferred: Option<ConfigFormat>,
    },
}

/// Expand a leading `~` or `$HOME` to the user's home directory.
///
/// Left untouched when no home directory can be determined.
pub(crate) fn expand_home(raw: &str) -> PathBuf {
    let rest = if raw == "~" || raw == "$HOME" {
        Some("")
    } else {
        raw.strip_prefix("~/")
            .or_else(|| raw.strip_prefix("$HOME/"))
    };
    match (rest, directories::UserDirs::new()) {
        (Some(rest), Some(user)) => user.home_dir().join(rest),
        _ => PathBuf::from(raw),
    }
}

/// Stat `raw` and classify it.
pub(crate) fn classify(raw: &str) -> Result<Classified, CharmError> {
    let path = expand_home(raw);
    let meta = match std::fs::metadata(&path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(CharmError::ConfigPathNotFound { path });
        }
        Err(source) => {
            return Err(CharmError::ConfigPathIndeterminate { path, source });
        }
    };

    if meta.is_dir() {
        debug!(path = %path.display(), "config path is a directory");
        return Ok(Classified::Directory(path));
    }
    let inferred = ConfigFormat::from_path(&path);
    debug!(path = %path.display(), inferred = ?inferred, "config path is a file");
    Ok(Classified::File { path, inferred })
}

/// Find `<base_name>.<ext>` in `dir`, trying each supported extension in
/// order.
pub(crate) fn search_dir(dir: &Path, base_name: &str) -> Result<(PathBuf, ConfigFormat), CharmError> {
    for ext in ConfigFormat::SEARCH_EXTENSIONS {
        let candidate = dir.join(format!("{base_name}.{ext}"));
        if candidate.is_file()
            && let Some(format) = ConfigFormat::from_extension(ext)
        {
            return Ok((candidate, format));
        }
    }
    Err(CharmError::ConfigFileNotFound {
        dir: dir.to_path_buf(),
        name: base_name.to_string(),
    })
}

/// Read and parse a config file.
pub(crate) fn load(path: &Path, format: ConfigFormat) -> Result<Table, CharmError> {
    let content = std::fs::read_to_string(path).map_err(|source| CharmError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&content, format).map_err(|reason| CharmError::ConfigParse {
        path: path.to_path_buf(),
        format,
        reason,
    })
}

/// Parse config text in `format` into a table. The top level must be a
/// mapping; an empty YAML document is an empty table.
pub(crate) fn parse(content: &str, format: ConfigFormat) -> Result<Table, String> {
    match format {
        ConfigFormat::Toml => toml::from_str::<Table>(content).map_err(|e| e.to_string()),
        ConfigFormat::Json => serde_json::from_str::<Table>(content).map_err(|e| e.to_string()),
        ConfigFormat::Yaml => {
            if content.trim().is_empty() {
                return Ok(Table::new());
            }
            serde_yaml::from_str::<Table>(content).map_err(|e| e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn path_str(p: &Path) -> &str {
        p.to_str().unwrap()
    }

    #[test]
    fn directory_is_classified() {
        let dir = TempDir::new().unwrap();
        assert_eq!(
            classify(path_str(dir.path())).unwrap(),
            Classified::Directory(dir.path().to_path_buf())
        );
    }

    #[test]
    fn known_extension_is_inferred() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("x.json");
        fs::write(&path, "{}").unwrap();
        assert_eq!(
            classify(path_str(&path)).unwrap(),
            Classified::File {
                path: path.clone(),
                inferred: Some(ConfigFormat::Json)
            }
        );
    }

    #[test]
    fn unknown_or_missing_extension_is_not_inferred() {
        let dir = TempDir::new().unwrap();
        for name in ["x.xyz", "test-config"] {
            let path = dir.path().join(name);
            fs::write(&path, "").unwrap();
            assert!(matches!(
                classify(path_str(&path)).unwrap(),
                Classified::File { inferred: None, .. }
            ));
        }
    }

    #[test]
    fn missing_path_is_not_found() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nope.yaml");
        assert!(matches!(
            classify(path_str(&path)),
            Err(CharmError::ConfigPathNotFound { .. })
        ));
    }

    #[test]
    fn path_through_a_file_is_indeterminate() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("plain");
        fs::write(&file, "").unwrap();
        let path = file.join("config.yaml");
        assert!(matches!(
            classify(path_str(&path)),
            Err(CharmError::ConfigPathIndeterminate { .. })
        ));
    }

    #[test]
    fn home_prefix_is_expanded() {
        let Some(user) = directories::UserDirs::new() else {
            return;
        };
        assert_eq!(expand_home("~/x.toml"), user.home_dir().join("x.toml"));
        assert_eq!(expand_home("$HOME/x.toml"), user.home_dir().join("x.toml"));
        assert_eq!(expand_home("/etc/x.toml"), PathBuf::from("/etc/x.toml"));
        assert_eq!(expand_home("~other/x"), PathBuf::from("~other/x"));
    }

    #[test]
    fn search_prefers_extension_order() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("config.yaml"), "a: 1").unwrap();
        fs::write(dir.path().join("config.toml"), "a = 2").unwrap();
        let (path, format) = search_dir(dir.path(), "config").unwrap();
        assert_eq!(path, dir.path().join("config.toml"));
        assert_eq!(format, ConfigFormat::Toml);
    }

    #[test]
    fn search_finds_yml() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("app.yml"), "a: 1").unwrap();
        let (_, format) = search_dir(dir.path(), "app").unwrap();
        assert_eq!(format, ConfigFormat::Yaml);
    }

    #[test]
    fn search_ignores_directories_and_other_names() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("config.json")).unwrap();
        fs::write(dir.path().join("other.json"), "{}").unwrap();
        assert!(matches!(
            search_dir(dir.path(), "config"),
            Err(CharmError::ConfigFileNotFound { .. })
        ));
    }

    #[test]
    fn all_formats_parse_to_the_same_table() {
        let toml = parse("workers = 4\n[log]\nlevel = \"debug\"\n", ConfigFormat::Toml).unwrap();
        let json = parse(r#"{"workers": 4, "log": {"level": "debug"}}"#, ConfigFormat::Json).unwrap();
        let yaml = parse("workers: 4\nlog:\n  level: debug\n", ConfigFormat::Yaml).unwrap();
        assert_eq!(toml, json);
        assert_eq!(toml, yaml);
    }

    #[test]
    fn empty_yaml_is_empty_table() {
        assert!(parse("", ConfigFormat::Yaml).unwrap().is_empty());
    }

    #[test]
    fn parse_errors_carry_path_and_format() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{ not json").unwrap();
        match load(&path, ConfigFormat::Json) {
            Err(CharmError::ConfigParse { path: p, format, .. }) => {
                assert_eq!(p, path);
                assert_eq!(format, ConfigFormat::Json);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn non_mapping_yaml_is_a_parse_error() {
        assert!(parse("- a\n- b\n", ConfigFormat::Yaml).is_err());
    }
}
