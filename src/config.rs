//! Configuration store for the publishing workflow.
//!
//! The primary format is a flat `key=value` file:
//!
//! ```text
//! # Channel
//! rssTitle = "Weekly Rustacean"
//! rssAuthor = Jane Doe
//! xmlFilepath = /srv/podcast/feed.xml
//! rssBackupDir = /srv/podcast/backups
//! ```
//!
//! A file with a `.toml` extension is read as a flat TOML table instead.
//! Only `xmlFilepath` and `rssBackupDir` are structurally required; every
//! other key is best-effort and its absence is reported by whoever reads it.
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Required config key '{0}' is missing or empty")]
    Missing(&'static str),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Key Names
// ============================================================================

/// Config keys understood by the feed engine.
pub mod keys {
    pub const RSS_TITLE: &str = "rssTitle";
    pub const RSS_AUTHOR: &str = "rssAuthor";
    pub const RSS_DESCRIPTION: &str = "rssDescription";
    pub const RSS_SUBTITLE: &str = "rssSubtitle";
    pub const WEBSITE_LINK: &str = "websiteLink";
    pub const LANGUAGE: &str = "language";
    pub const ITUNES_EXPLICIT: &str = "itunesExplicit";
    pub const ITUNES_KEYWORDS: &str = "itunesKeywords";
    pub const ITUNES_CATEGORY: &str = "itunesCategory";
    pub const MANAGING_EDITOR: &str = "managingEditor";
    pub const RSS_IMAGE: &str = "rssImage";
    pub const EPISODE_AUTHOR: &str = "episodeAuthor";
    pub const EPISODE_EXPLICIT: &str = "episodeExplicit";
    pub const EPISODE_IMAGE: &str = "episodeImage";
    pub const EPISODE_DIR: &str = "episodeDir";
    pub const XML_FILEPATH: &str = "xmlFilepath";
    pub const RSS_DIR: &str = "rssDir";
    pub const RSS_BACKUP_DIR: &str = "rssBackupDir";
}

// ============================================================================
// ConfigStore
// ============================================================================

/// Flat string key/value configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigStore {
    values: HashMap<String, String>,
}

impl ConfigStore {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from disk.
    ///
    /// - Missing or unreadable file → `Err(ConfigError::Unreadable)`
    /// - `.toml` extension → parsed as a flat TOML table
    /// - anything else → parsed as `key=value` lines
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let unreadable = |source| ConfigError::Unreadable {
            path: path.to_path_buf(),
            source,
        };

        // SEC-014: Check file size before reading to prevent memory exhaustion
        let meta = std::fs::metadata(path).map_err(unreadable)?;
        if meta.len() > Self::MAX_FILE_SIZE {
            return Err(ConfigError::TooLarge(format!(
                "Config file is {} bytes (max {} bytes)",
                meta.len(),
                Self::MAX_FILE_SIZE
            )));
        }

        let content = std::fs::read_to_string(path).map_err(unreadable)?;

        let is_toml = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("toml"))
            .unwrap_or(false);
        let store = if is_toml {
            Self::from_toml(&content)?
        } else {
            Self::parse(&content)
        };

        tracing::info!(path = %path.display(), keys = store.len(), "Loaded configuration");
        Ok(store)
    }

    /// Parse `key=value` lines.
    ///
    /// Keys and values are trimmed, and one layer of surrounding double quotes
    /// is stripped from the value. Blank lines and `#` comments are skipped, as
    /// are lines with no `=` (with a warning). Later duplicates win.
    pub fn parse(content: &str) -> Self {
        let mut values = HashMap::new();

        for (index, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                tracing::warn!(line = index + 1, key = %line, "Config line has no value, ignoring");
                continue;
            };

            let key = key.trim();
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);

            values.insert(key.to_string(), value.to_string());
        }

        Self { values }
    }

    /// Parse a flat TOML table. Scalars become strings; nested tables and
    /// arrays are not meaningful here and are skipped with a warning.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let table: toml::Table = content.parse()?;
        let mut values = HashMap::new();

        for (key, value) in table {
            let text = match value {
                toml::Value::String(s) => s,
                toml::Value::Integer(i) => i.to_string(),
                toml::Value::Float(f) => f.to_string(),
                toml::Value::Boolean(b) => b.to_string(),
                toml::Value::Datetime(d) => d.to_string(),
                toml::Value::Array(_) | toml::Value::Table(_) => {
                    tracing::warn!(key = %key, "Nested config values are not supported, ignoring");
                    continue;
                }
            };
            values.insert(key, text);
        }

        Ok(Self { values })
    }

    /// Look up a key. A present-but-blank value counts as missing.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// Look up a key that the run cannot proceed without.
    pub fn require(&self, key: &'static str) -> Result<&str, ConfigError> {
        self.get(key).ok_or(ConfigError::Missing(key))
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for ConfigStore
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

// ============================================================================
// FeedSettings
// ============================================================================

/// Resolved settings for one publishing run.
///
/// The feed path and backup directory are checked up front because nothing
/// can be written safely without them. Channel and item metadata stay in the
/// store and are read lazily, so a missing one degrades the feed instead of
/// aborting it.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub feed_path: PathBuf,
    pub backup_dir: PathBuf,
    store: ConfigStore,
}

impl FeedSettings {
    pub fn from_store(store: ConfigStore) -> Result<Self, ConfigError> {
        let feed_path = PathBuf::from(store.require(keys::XML_FILEPATH)?);
        let backup_dir = PathBuf::from(store.require(keys::RSS_BACKUP_DIR)?);
        Ok(Self {
            feed_path,
            backup_dir,
            store,
        })
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }
}

// ============================================================================
// Tests
// ============================================================================
