use anyhow::{anyhow, bail, Context};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
pub const DEFAULT_BACKUP_FILE: &str = "jellyfin-backup.json";

pub const ENV_SERVER: &str = "JELLYFIN_SERVER";
pub const ENV_API_KEY: &str = "JELLYFIN_API_KEY";
pub const ENV_USER: &str = "JELLYFIN_USER";
pub const ENV_TVDB_API_KEY: &str = "TVDB_API_KEY";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Configuration {
    #[serde(default)]
    pub jellyfin: JellyfinConfig,
    pub tvdb: Option<TvdbConfig>,
    pub backup: Option<BackupConfig>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct JellyfinConfig {
    #[serde(rename = "serverUrl")]
    pub server_url: Option<String>,
    #[serde(rename = "apikey")]
    pub api_key: Option<String>,
    pub user: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TvdbConfig {
    #[serde(rename = "apikey")]
    pub api_key: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackupConfig {
    pub file: String,
}

/// Fully resolved Jellyfin connection settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    pub server_url: String,
    pub api_key: String,
    pub user_name: String,
}

/// Values given on the command line; these override everything else.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub server_url: Option<String>,
    pub api_key: Option<String>,
    pub user: Option<String>,
    pub tvdb_api_key: Option<String>,
    pub backup_file: Option<String>,
}

impl Configuration {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading configuration file {}", path))?;
        let config: Configuration = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Reads `path` when it exists, otherwise starts from an empty
    /// configuration.
    pub fn load_default(path: &str) -> anyhow::Result<Self> {
        if Path::new(path).exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Fills unset values from the environment.
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let jf = &mut self.jellyfin;
        jf.server_url = jf.server_url.take().or_else(|| non_empty(ENV_SERVER));
        jf.api_key = jf.api_key.take().or_else(|| non_empty(ENV_API_KEY));
        jf.user = jf.user.take().or_else(|| non_empty(ENV_USER));

        if self.tvdb.is_none() {
            self.tvdb = non_empty(ENV_TVDB_API_KEY).map(|api_key| TvdbConfig { api_key });
        }
        self
    }

    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        let jf = &mut self.jellyfin;
        jf.server_url = overrides.server_url.or(jf.server_url.take());
        jf.api_key = overrides.api_key.or(jf.api_key.take());
        jf.user = overrides.user.or(jf.user.take());

        if let Some(api_key) = overrides.tvdb_api_key {
            self.tvdb = Some(TvdbConfig { api_key });
        }
        if let Some(file) = overrides.backup_file {
            self.backup = Some(BackupConfig { file });
        }
        self
    }

    pub fn connection(&self) -> anyhow::Result<Connection> {
        let jf = &self.jellyfin;
        let (Some(server_url), Some(api_key), Some(user_name)) =
            (&jf.server_url, &jf.api_key, &jf.user)
        else {
            bail!(
                "Missing required configuration: server URL, API key and user are required \
                 (use --server/--api-key/--user or set {}, {}, {})",
                ENV_SERVER,
                ENV_API_KEY,
                ENV_USER
            );
        };

        url::Url::parse(server_url)
            .map_err(|e| anyhow!("Invalid server URL '{}': {}", server_url, e))?;

        Ok(Connection {
            server_url: server_url.trim_end_matches('/').to_string(),
            api_key: api_key.clone(),
            user_name: user_name.clone(),
        })
    }

    pub fn tvdb_api_key(&self) -> anyhow::Result<&str> {
        self.tvdb
            .as_ref()
            .map(|t| t.api_key.as_str())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                anyhow!(
                    "TVDB API key required for finding missing episodes \
                     (use --tvdb-api-key or set {})",
                    ENV_TVDB_API_KEY
                )
            })
    }

    pub fn backup_file(&self) -> &str {
        self.backup
            .as_ref()
            .map(|b| b.file.as_str())
            .unwrap_or(DEFAULT_BACKUP_FILE)
    }
}
