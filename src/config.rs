// Persisted key/value configuration: the email, the session token and the
// last selected workspace survive between runs.

use crate::error::{BackupError, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Keys kept in the configuration store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigKey {
    Email,
    Token,
    SpaceId,
}

impl ConfigKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigKey::Email => "email",
            ConfigKey::Token => "token",
            ConfigKey::SpaceId => "space_id",
        }
    }
}

/// A process-wide store that persists across invocations.
pub trait ConfigStore {
    fn get(&self, key: ConfigKey) -> Option<String>;
    fn set(&mut self, key: ConfigKey, value: &str) -> Result<()>;
}

/// In-memory store, used by tests and by callers that manage
/// persistence themselves.
#[derive(Debug, Clone, Default)]
pub struct MemoryConfigStore {
    values: BTreeMap<ConfigKey, String>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: ConfigKey, value: impl Into<String>) -> Self {
        self.values.insert(key, value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl ConfigStore for MemoryConfigStore {
    fn get(&self, key: ConfigKey) -> Option<String> {
        self.values.get(&key).cloned()
    }

    fn set(&mut self, key: ConfigKey, value: &str) -> Result<()> {
        self.values.insert(key, value.to_string());
        Ok(())
    }
}

/// Store backed by a flat TOML table of strings.
///
/// A missing file reads as an empty store. Each `set` rewrites the whole
/// file; keys this crate does not know about are kept as they are.
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
    values: toml::Table,
}

impl FileConfigStore {
    /// `<config dir>/notion-backup/config.toml`, e.g.
    /// `~/.config/notion-backup/config.toml` on Linux.
    pub fn default_path() -> PathBuf {
        let dir = dirs::config_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."));
        dir.join("notion-backup").join("config.toml")
    }

    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = match fs::read_to_string(&path) {
            Ok(text) => text
                .parse::<toml::Table>()
                .map_err(|e| BackupError::ConfigFormat {
                    path: path.clone(),
                    message: e.to_string(),
                })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => toml::Table::new(),
            Err(source) => return Err(BackupError::ConfigFile { path, source }),
        };
        tracing::debug!(path = %path.display(), keys = values.len(), "loaded configuration");
        Ok(Self { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self) -> Result<()> {
        let file_error = |source| BackupError::ConfigFile {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(file_error)?;
        }
        let text = toml::to_string(&self.values).map_err(|e| BackupError::ConfigFormat {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        fs::write(&self.path, text).map_err(file_error)?;
        restrict_permissions(&self.path).map_err(file_error)?;
        Ok(())
    }
}

// The file holds the session token.
#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

impl ConfigStore for FileConfigStore {
    fn get(&self, key: ConfigKey) -> Option<String> {
        self.values
            .get(key.as_str())
            .and_then(|v| v.as_str())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    fn set(&mut self, key: ConfigKey, value: &str) -> Result<()> {
        self.values
            .insert(key.as_str().to_string(), toml::Value::String(value.to_string()));
        self.save()
    }
}
