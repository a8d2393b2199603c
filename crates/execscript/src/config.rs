//! Configuration for execscript.
//!
//! Loads config from:
//! 1. Global: ~/.config/execscript/config.toml
//! 2. Per-project: .execscript/config.toml (overrides global)
//!
//! Example config.toml:
//! ```toml
//! [debug]
//! file = "out/debug.s"
//!
//! [encoding]
//! legacy = "windows-1252"
//!
//! [keys]
//! substitute = "_"
//!
//! [keys.table]
//! ":" = "-"
//!
//! [ignore]
//! start = "// ignore start"
//! end = "// ignore end"
//! ```

use crate::assemble::IgnoreMarkers;
use crate::error::{Error, Result};
use crate::escape::{KeyPolicy, NonPrintableCodec};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

// =============================================================================
// Sections
// =============================================================================

/// Debug-mode output.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// File written by debug runs without an explicit target.
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct EncodingConfig {
    /// Legacy encoding label for non-printable tokens.
    pub legacy: Option<String>,
}

/// Handling of mapping keys with forbidden characters.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct KeysConfig {
    /// Replace every forbidden character with this string.
    pub substitute: Option<String>,
    /// Per-character replacements; takes precedence over `substitute`.
    pub table: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct IgnoreConfig {
    pub start: Option<String>,
    pub end: Option<String>,
}

// =============================================================================
// Root
// =============================================================================

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct ExecConfig {
    pub debug: DebugConfig,
    pub encoding: EncodingConfig,
    pub keys: KeysConfig,
    pub ignore: IgnoreConfig,
}

impl ExecConfig {
    /// Load configuration for a project directory.
    ///
    /// Unreadable or malformed files are skipped with a warning.
    pub fn load(root: &Path) -> Self {
        Self::load_from(Self::global_config_path().as_deref(), root)
    }

    /// Like [`load`](Self::load) with an explicit global config path.
    pub fn load_from(global: Option<&Path>, root: &Path) -> Self {
        let mut config = Self::default();

        if let Some(global) = global.and_then(Self::load_file) {
            config = config.merge(global);
        }

        let project_path = root.join(".execscript").join("config.toml");
        if let Some(project) = Self::load_file(&project_path) {
            config = config.merge(project);
        }

        config
    }

    /// Parse a config document.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    fn global_config_path() -> Option<PathBuf> {
        let config_home = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .ok()
            .or_else(|| dirs::home_dir().map(|h| h.join(".config")))?;
        Some(config_home.join("execscript").join("config.toml"))
    }

    fn load_file(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        match Self::from_toml(&content) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring config file");
                None
            }
        }
    }

    /// Merge another config into this one; values set in `other` win.
    pub fn merge(self, other: Self) -> Self {
        Self {
            debug: DebugConfig {
                file: other.debug.file.or(self.debug.file),
            },
            encoding: EncodingConfig {
                legacy: other.encoding.legacy.or(self.encoding.legacy),
            },
            keys: KeysConfig {
                substitute: other.keys.substitute.or(self.keys.substitute),
                table: other.keys.table.or(self.keys.table),
            },
            ignore: IgnoreConfig {
                start: other.ignore.start.or(self.ignore.start),
                end: other.ignore.end.or(self.ignore.end),
            },
        }
    }

    pub fn debug_file(&self) -> Option<&Path> {
        self.debug.file.as_deref()
    }

    pub fn codec(&self) -> Result<NonPrintableCodec> {
        match &self.encoding.legacy {
            Some(label) => NonPrintableCodec::new(label),
            None => Ok(NonPrintableCodec::default()),
        }
    }

    pub fn key_policy(&self) -> Result<KeyPolicy> {
        if let Some(table) = &self.keys.table {
            let mut chars = HashMap::with_capacity(table.len());
            for (from, to) in table {
                let mut it = from.chars();
                match (it.next(), it.next()) {
                    (Some(c), None) => {
                        chars.insert(c, to.clone());
                    }
                    _ => {
                        return Err(Error::Config(format!(
                            "key table entries must be single characters, got '{from}'"
                        )));
                    }
                }
            }
            return Ok(KeyPolicy::Table(chars));
        }
        Ok(match &self.keys.substitute {
            Some(with) => KeyPolicy::Substitute(with.clone()),
            None => KeyPolicy::Reject,
        })
    }

    pub fn ignore_markers(&self) -> IgnoreMarkers {
        let defaults = IgnoreMarkers::default();
        IgnoreMarkers {
            start: self.ignore.start.clone().unwrap_or(defaults.start),
            end: self.ignore.end.clone().unwrap_or(defaults.end),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_config(dir: &Path, content: &str) -> PathBuf {
        std::fs::create_dir_all(dir).unwrap();
        let path = dir.join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "{content}").unwrap();
        path
    }

    #[test]
    fn test_default_config() {
        let config = ExecConfig::default();
        assert_eq!(config.debug_file(), None);
        assert!(matches!(config.key_policy().unwrap(), KeyPolicy::Reject));
        assert_eq!(config.codec().unwrap().encoding().name(), "windows-1252");
        assert_eq!(config.ignore_markers(), IgnoreMarkers::default());
    }

    #[test]
    fn test_project_overrides_global() {
        let dir = TempDir::new().unwrap();
        let global = write_config(
            &dir.path().join("global"),
            r#"
[debug]
file = "global.s"

[keys]
substitute = "_"
"#,
        );
        let project = dir.path().join("project");
        write_config(
            &project.join(".execscript"),
            r#"
[debug]
file = "project.s"

[ignore]
start = "// skip"
"#,
        );

        let config = ExecConfig::load_from(Some(global.as_path()), &project);
        assert_eq!(config.debug_file(), Some(Path::new("project.s")));
        assert!(matches!(config.key_policy().unwrap(), KeyPolicy::Substitute(s) if s == "_"));
        let markers = config.ignore_markers();
        assert_eq!(markers.start, "// skip");
        assert_eq!(markers.end, IgnoreMarkers::default().end);
    }

    #[test]
    fn test_malformed_file_is_skipped() {
        let dir = TempDir::new().unwrap();
        write_config(&dir.path().join(".execscript"), "[debug\nfile = ");
        assert_eq!(ExecConfig::load_from(None, dir.path()), ExecConfig::default());
    }

    #[test]
    fn test_key_table() {
        let config = ExecConfig::from_toml("[keys.table]\n\":\" = \"-\"\n").unwrap();
        assert_eq!(config.key_policy().unwrap().apply("a:b").unwrap(), "a-b");

        let bad = ExecConfig::from_toml("[keys.table]\n\"ab\" = \"-\"\n").unwrap();
        assert!(matches!(bad.key_policy(), Err(Error::Config(_))));
    }

    #[test]
    fn test_encoding_label() {
        let config = ExecConfig::from_toml("[encoding]\nlegacy = \"utf-8\"\n").unwrap();
        assert_eq!(config.codec().unwrap().encoding().name(), "UTF-8");
        let bad = ExecConfig::from_toml("[encoding]\nlegacy = \"klingon\"\n").unwrap();
        assert!(matches!(bad.codec(), Err(Error::Config(_))));
    }
}
