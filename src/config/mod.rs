//! Configuration management for `threadkeep`.
//!
//! Layers, lowest to highest precedence:
//! 1. Built-in defaults
//! 2. User config (`$XDG_CONFIG_HOME/threadkeep/config.yaml`, or `~/.config/threadkeep/config.yaml`)
//! 3. Environment variables (`TK_*`)
//! 4. CLI flags
//!
//! Keys are compared in a canonical form: lowercase with `_` and `.` folded
//! to `-`, so `import.streaming_threshold`, `import-streaming-threshold` and
//! `TK_IMPORT_STREAMING_THRESHOLD` all name the same setting.

use std::collections::HashMap;
use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, ThreadkeepError};
use crate::import::ImportConfig;
use crate::import::parser::DEFAULT_STREAMING_THRESHOLD;
use crate::storage::SqliteStorage;

const APP_DIR: &str = "threadkeep";
const DEFAULT_DB_FILENAME: &str = "archive.db";
const ENV_PREFIX: &str = "TK_";

pub const KEY_DB: &str = "db";
pub const KEY_LOCK_TIMEOUT: &str = "lock-timeout";
pub const KEY_STREAMING_THRESHOLD: &str = "import-streaming-threshold";
pub const KEY_FORCE: &str = "import-force";

/// One configuration source, flattened to canonical keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigLayer {
    pub values: HashMap<String, String>,
}

impl ConfigLayer {
    /// Set a key, canonicalizing it first.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(canonical_key(key), value.into());
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(&canonical_key(key)).map(String::as_str)
    }

    /// Merge another layer on top of this one (higher precedence wins).
    pub fn merge_from(&mut self, other: &Self) {
        for (key, value) in &other.values {
            self.values.insert(key.clone(), value.clone());
        }
    }

    /// Merge multiple layers in precedence order (lowest to highest).
    #[must_use]
    pub fn merge_layers(layers: &[Self]) -> Self {
        let mut merged = Self::default();
        for layer in layers {
            merged.merge_from(layer);
        }
        merged
    }

    /// Build a layer from a YAML file path. Missing files return empty config.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn from_yaml(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)?;
        let value: serde_yaml::Value = serde_yaml::from_str(&contents)?;
        let mut flat = HashMap::new();
        flatten_yaml(&value, "", &mut flat);

        let mut layer = Self::default();
        for (key, value) in flat {
            layer.set(&key, value);
        }
        Ok(layer)
    }

    /// Build a layer from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_env_vars(env::vars())
    }

    /// Build a layer from `TK_*` variables; other variables are ignored.
    #[must_use]
    pub fn from_env_vars<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut layer = Self::default();
        for (key, value) in vars {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                layer.set(stripped, value);
            }
        }
        layer
    }
}

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub db: Option<PathBuf>,
    pub lock_timeout: Option<u64>,
    pub streaming_threshold: Option<u64>,
    /// Only `Some(true)` is meaningful; an absent flag must not mask config.
    pub force: Option<bool>,
}

impl CliOverrides {
    #[must_use]
    pub fn as_layer(&self) -> ConfigLayer {
        let mut layer = ConfigLayer::default();

        if let Some(path) = &self.db {
            layer.set(KEY_DB, path.to_string_lossy());
        }
        if let Some(timeout) = self.lock_timeout {
            layer.set(KEY_LOCK_TIMEOUT, timeout.to_string());
        }
        if let Some(threshold) = self.streaming_threshold {
            layer.set(KEY_STREAMING_THRESHOLD, threshold.to_string());
        }
        if let Some(force) = self.force {
            layer.set(KEY_FORCE, force.to_string());
        }

        layer
    }
}

/// Settings after all layers are applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub db_path: PathBuf,
    pub lock_timeout: Option<u64>,
    pub import: ImportConfig,
}

impl ResolvedConfig {
    /// Interpret a merged layer.
    ///
    /// # Errors
    ///
    /// Returns a validation error for values that do not parse.
    pub fn from_layer(layer: &ConfigLayer) -> Result<Self> {
        let db_path = layer
            .get(KEY_DB)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map_or_else(default_db_path, PathBuf::from);

        let lock_timeout = layer
            .get(KEY_LOCK_TIMEOUT)
            .map(|value| parse_u64(KEY_LOCK_TIMEOUT, value))
            .transpose()?;

        let streaming_threshold = layer
            .get(KEY_STREAMING_THRESHOLD)
            .map(|value| parse_u64(KEY_STREAMING_THRESHOLD, value))
            .transpose()?
            .unwrap_or(DEFAULT_STREAMING_THRESHOLD);

        let force = match layer.get(KEY_FORCE) {
            Some(value) => parse_bool(value).ok_or_else(|| {
                ThreadkeepError::validation(KEY_FORCE, format!("expected a boolean, got '{value}'"))
            })?,
            None => false,
        };

        Ok(Self {
            db_path,
            lock_timeout,
            import: ImportConfig {
                streaming_threshold,
                force,
            },
        })
    }

    /// Open the configured database, creating it on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open_storage(&self) -> Result<SqliteStorage> {
        tracing::debug!(db = %self.db_path.display(), lock_timeout = ?self.lock_timeout, "Opening database");
        SqliteStorage::open_with_timeout(&self.db_path, self.lock_timeout)
    }
}

/// Path of the user config file, if a home can be determined.
#[must_use]
pub fn user_config_path() -> Option<PathBuf> {
    user_config_path_from(env::var_os("XDG_CONFIG_HOME"), env::var_os("HOME"))
}

fn user_config_path_from(xdg: Option<OsString>, home: Option<OsString>) -> Option<PathBuf> {
    let base = xdg
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .or_else(|| home.map(|home| Path::new(&home).join(".config")))?;
    Some(base.join(APP_DIR).join("config.yaml"))
}

/// Load user config.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_user_config() -> Result<ConfigLayer> {
    match user_config_path() {
        Some(path) => ConfigLayer::from_yaml(&path),
        None => Ok(ConfigLayer::default()),
    }
}

/// Default database location: `$XDG_DATA_HOME/threadkeep/archive.db`,
/// `~/.local/share/threadkeep/archive.db`, or `./archive.db` without a home.
#[must_use]
pub fn default_db_path() -> PathBuf {
    default_db_path_from(env::var_os("XDG_DATA_HOME"), env::var_os("HOME"))
}

fn default_db_path_from(xdg: Option<OsString>, home: Option<OsString>) -> PathBuf {
    xdg.filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .or_else(|| home.map(|home| Path::new(&home).join(".local").join("share")))
        .map_or_else(
            || PathBuf::from(DEFAULT_DB_FILENAME),
            |base| base.join(APP_DIR).join(DEFAULT_DB_FILENAME),
        )
}

/// Default config layer (lowest precedence).
#[must_use]
pub fn default_config_layer() -> ConfigLayer {
    let mut layer = ConfigLayer::default();
    layer.set(KEY_STREAMING_THRESHOLD, DEFAULT_STREAMING_THRESHOLD.to_string());
    layer.set(KEY_FORCE, "false");
    layer
}

/// Load and resolve configuration with the full precedence chain.
///
/// # Errors
///
/// Returns an error if the user config cannot be read or a value is invalid.
pub fn load_config(cli: &CliOverrides) -> Result<ResolvedConfig> {
    let merged = ConfigLayer::merge_layers(&[
        default_config_layer(),
        load_user_config()?,
        ConfigLayer::from_env(),
        cli.as_layer(),
    ]);
    ResolvedConfig::from_layer(&merged)
}

fn canonical_key(key: &str) -> String {
    key.trim().to_lowercase().replace(['_', '.'], "-")
}

fn parse_u64(key: &str, value: &str) -> Result<u64> {
    value.trim().parse::<u64>().map_err(|_| {
        ThreadkeepError::validation(key, format!("expected a non-negative integer, got '{value}'"))
    })
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

fn flatten_yaml(value: &serde_yaml::Value, prefix: &str, out: &mut HashMap<String, String>) {
    match value {
        serde_yaml::Value::Mapping(map) => {
            for (key, value) in map {
                let Some(key_str) = key.as_str() else {
                    continue;
                };
                let next_prefix = if prefix.is_empty() {
                    key_str.to_string()
                } else {
                    format!("{prefix}.{key_str}")
                };
                flatten_yaml(value, &next_prefix, out);
            }
        }
        _ => {
            if let Some(value) = yaml_scalar_to_string(value) {
                out.insert(prefix.to_string(), value);
            }
        }
    }
}

fn yaml_scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::Bool(v) => Some(v.to_string()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Null
        | serde_yaml::Value::Sequence(_)
        | serde_yaml::Value::Mapping(_) => None,
        serde_yaml::Value::Tagged(tagged) => yaml_scalar_to_string(&tagged.value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn layer(pairs: &[(&str, &str)]) -> ConfigLayer {
        let mut layer = ConfigLayer::default();
        for (key, value) in pairs {
            layer.set(key, *value);
        }
        layer
    }

    #[test]
    fn yaml_nested_keys_flatten_to_canonical() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        fs::write(
            &path,
            "db: /data/chats.db\nlock_timeout: 250\nimport:\n  streaming_threshold: 1024\n  force: yes\n",
        )
        .unwrap();

        let layer = ConfigLayer::from_yaml(&path).unwrap();
        assert_eq!(layer.get("db"), Some("/data/chats.db"));
        assert_eq!(layer.get(KEY_LOCK_TIMEOUT), Some("250"));
        assert_eq!(layer.get("import.streaming-threshold"), Some("1024"));
        assert_eq!(layer.get("import.force"), Some("yes"));
    }

    #[test]
    fn missing_yaml_is_empty() {
        let temp = TempDir::new().unwrap();
        let layer = ConfigLayer::from_yaml(&temp.path().join("absent.yaml")).unwrap();
        assert!(layer.values.is_empty());
    }

    #[test]
    fn env_layer_only_reads_prefixed_vars() {
        let layer = ConfigLayer::from_env_vars(vec![
            ("TK_IMPORT_STREAMING_THRESHOLD".to_string(), "42".to_string()),
            ("TK_DB".to_string(), "/tmp/a.db".to_string()),
            ("PATH".to_string(), "/usr/bin".to_string()),
        ]);
        assert_eq!(layer.get(KEY_STREAMING_THRESHOLD), Some("42"));
        assert_eq!(layer.get(KEY_DB), Some("/tmp/a.db"));
        assert_eq!(layer.values.len(), 2);
    }

    #[test]
    fn precedence_cli_over_env_over_yaml_over_default() {
        let defaults = default_config_layer();
        let yaml = layer(&[(KEY_STREAMING_THRESHOLD, "10"), (KEY_LOCK_TIMEOUT, "100")]);
        let env_layer = layer(&[(KEY_STREAMING_THRESHOLD, "20")]);
        let cli = CliOverrides {
            lock_timeout: Some(300),
            ..CliOverrides::default()
        }
        .as_layer();

        let merged = ConfigLayer::merge_layers(&[defaults, yaml, env_layer, cli]);
        let resolved = ResolvedConfig::from_layer(&merged).unwrap();
        assert_eq!(resolved.import.streaming_threshold, 20);
        assert_eq!(resolved.lock_timeout, Some(300));
        assert!(!resolved.import.force);
    }

    #[test]
    fn defaults_resolve_without_any_source() {
        let resolved = ResolvedConfig::from_layer(&default_config_layer()).unwrap();
        assert_eq!(resolved.import, ImportConfig::default());
        assert_eq!(resolved.lock_timeout, None);
        assert!(resolved.db_path.ends_with(DEFAULT_DB_FILENAME));
    }

    #[test]
    fn invalid_values_are_reported() {
        let err = ResolvedConfig::from_layer(&layer(&[(KEY_LOCK_TIMEOUT, "soon")])).unwrap_err();
        assert!(err.to_string().contains(KEY_LOCK_TIMEOUT));

        let err = ResolvedConfig::from_layer(&layer(&[(KEY_FORCE, "maybe")])).unwrap_err();
        assert!(matches!(err, ThreadkeepError::Validation { .. }));
    }

    #[test]
    fn user_config_path_prefers_xdg() {
        assert_eq!(
            user_config_path_from(Some("/xdg".into()), Some("/home/u".into())),
            Some(PathBuf::from("/xdg/threadkeep/config.yaml"))
        );
        assert_eq!(
            user_config_path_from(Some(OsString::new()), Some("/home/u".into())),
            Some(PathBuf::from("/home/u/.config/threadkeep/config.yaml"))
        );
        assert_eq!(user_config_path_from(None, None), None);
    }

    #[test]
    fn default_db_path_falls_back_to_cwd() {
        assert_eq!(
            default_db_path_from(None, Some("/home/u".into())),
            PathBuf::from("/home/u/.local/share/threadkeep/archive.db")
        );
        assert_eq!(default_db_path_from(None, None), PathBuf::from("archive.db"));
    }

    #[test]
    fn open_storage_creates_database() {
        let temp = TempDir::new().unwrap();
        let cli = CliOverrides {
            db: Some(temp.path().join("nested").join("tk.db")),
            ..CliOverrides::default()
        };
        let resolved = ResolvedConfig::from_layer(&cli.as_layer()).unwrap();
        let storage = resolved.open_storage().unwrap();
        assert_eq!(storage.count_conversations().unwrap(), 0);
        assert!(resolved.db_path.exists());
    }
}
